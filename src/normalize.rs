//! Canonical image references and normalization of raw provider output.
//!
//! Providers disagree on what they hand back: a direct URL, a `data:` URI,
//! or a bare base64 blob with no prefix at all. Everything downstream of the
//! router sees a [`CanonicalImageResult`] instead.

use std::fmt;

use serde::{Serialize, Serializer};

/// Shortest string still treated as a bare base64 image payload.
const MIN_BASE64_LEN: usize = 100;

/// How many leading characters [`looks_like_base64`] inspects.
const BASE64_SCAN_PREFIX: usize = 256;

/// Mime type assumed for bare base64 payloads.
const DEFAULT_INLINE_MIME: &str = "image/png";

/// A provider-agnostic reference to a generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalImageResult {
    /// An image hosted elsewhere.
    RemoteUrl(String),
    /// An image carried inline as base64.
    InlineData {
        /// Mime type, e.g. `image/png`.
        mime_type: String,
        /// Standard base64 payload.
        data: String,
    },
}

impl CanonicalImageResult {
    /// Shorthand for an inline result.
    #[must_use]
    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::InlineData { mime_type: mime_type.into(), data: data.into() }
    }
}

impl fmt::Display for CanonicalImageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteUrl(url) => f.write_str(url),
            Self::InlineData { mime_type, data } => write!(f, "data:{mime_type};base64,{data}"),
        }
    }
}

impl Serialize for CanonicalImageResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Normalize raw provider output into a canonical result.
///
/// Returns `None` for empty output, which the router treats as no result.
#[must_use]
pub fn normalize(raw: &str) -> Option<CanonicalImageResult> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(rest) = raw.strip_prefix("http://") {
        return Some(CanonicalImageResult::RemoteUrl(format!("https://{rest}")));
    }
    if raw.starts_with("https://") {
        return Some(CanonicalImageResult::RemoteUrl(raw.to_string()));
    }
    if raw.starts_with("data:image/") {
        if let Some(inline) = parse_data_uri(raw) {
            return Some(inline);
        }
    } else if looks_like_base64(raw) {
        return Some(CanonicalImageResult::inline(DEFAULT_INLINE_MIME, raw));
    }

    Some(CanonicalImageResult::RemoteUrl(raw.to_string()))
}

/// Heuristic: is `raw` a bare base64 payload rather than a URL or text?
///
/// Only the first [`BASE64_SCAN_PREFIX`] characters are checked, so a long
/// blob costs the same as a short one.
#[must_use]
pub fn looks_like_base64(raw: &str) -> bool {
    raw.len() >= MIN_BASE64_LEN
        && raw
            .bytes()
            .take(BASE64_SCAN_PREFIX)
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

/// Split `data:<mime>;base64,<payload>` into its parts.
fn parse_data_uri(raw: &str) -> Option<CanonicalImageResult> {
    let rest = raw.strip_prefix("data:")?;
    let (mime_type, data) = rest.split_once(";base64,")?;
    if mime_type.is_empty() || data.is_empty() {
        return None;
    }
    Some(CanonicalImageResult::inline(mime_type, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base64_blob(len: usize) -> String {
        "iVBORw0KGgoAAAANSUhEUgAA+/=".chars().cycle().take(len).collect()
    }

    #[test]
    fn empty_is_none() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("   \n"), None);
    }

    #[test]
    fn http_upgraded_to_https() {
        assert_eq!(
            normalize("http://x/y.png"),
            Some(CanonicalImageResult::RemoteUrl("https://x/y.png".into()))
        );
    }

    #[test]
    fn https_passthrough() {
        assert_eq!(
            normalize("https://img.example/a.png"),
            Some(CanonicalImageResult::RemoteUrl("https://img.example/a.png".into()))
        );
    }

    #[test]
    fn data_uri_parsed() {
        let result = normalize("data:image/jpeg;base64,AQID").unwrap();
        assert_eq!(result, CanonicalImageResult::inline("image/jpeg", "AQID"));
    }

    #[test]
    fn canonical_strings_are_fixed_points() {
        for raw in ["https://img.example/a.png", "data:image/webp;base64,AAAA"] {
            let once = normalize(raw).unwrap();
            assert_eq!(once.to_string(), raw);
            let twice = normalize(&once.to_string()).unwrap();
            assert_eq!(twice, once);
        }
    }

    #[test]
    fn bare_base64_wrapped_as_png() {
        let blob = base64_blob(400);
        assert_eq!(normalize(&blob), Some(CanonicalImageResult::inline("image/png", blob.clone())));
        let rendered = normalize(&blob).unwrap().to_string();
        assert_eq!(rendered, format!("data:image/png;base64,{blob}"));
    }

    #[test]
    fn malformed_data_uri_falls_back_to_raw() {
        assert_eq!(
            normalize("data:image/png,notbase64"),
            Some(CanonicalImageResult::RemoteUrl("data:image/png,notbase64".into()))
        );
    }

    #[test]
    fn unknown_text_is_best_effort_url() {
        assert_eq!(
            normalize("s3://bucket/key.png"),
            Some(CanonicalImageResult::RemoteUrl("s3://bucket/key.png".into()))
        );
    }

    #[test]
    fn base64_heuristic_length_threshold() {
        assert!(!looks_like_base64(&base64_blob(MIN_BASE64_LEN - 1)));
        assert!(looks_like_base64(&base64_blob(MIN_BASE64_LEN)));
    }

    #[test]
    fn base64_heuristic_rejects_foreign_chars() {
        let mut text = base64_blob(200);
        text.insert(10, ' ');
        assert!(!looks_like_base64(&text));
        assert!(!looks_like_base64(&format!("https://{}", base64_blob(200))));
    }

    #[test]
    fn base64_heuristic_only_scans_prefix() {
        let blob = format!("{}!!!", base64_blob(BASE64_SCAN_PREFIX));
        assert!(looks_like_base64(&blob));
    }

    #[test]
    fn serializes_as_rendered_string() {
        let json = serde_json::to_string(&CanonicalImageResult::inline("image/png", "AQID")).unwrap();
        assert_eq!(json, "\"data:image/png;base64,AQID\"");
    }
}
