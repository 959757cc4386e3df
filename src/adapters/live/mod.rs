//! Live adapters that call real provider APIs over HTTP.

pub mod controlnet;
pub mod fetcher;
pub mod identity;
pub mod openai;

use reqwest::RequestBuilder;

use crate::error::ProviderError;

/// Longest response body excerpt carried in an error message.
const MAX_BODY_EXCERPT: usize = 500;

/// Send a request and return the body of a successful response.
///
/// Non-success statuses are classified with [`ProviderError::from_status`]
/// and carry a truncated copy of the body.
pub(crate) async fn send_for_text(request: RequestBuilder) -> Result<String, ProviderError> {
    let response = request.send().await.map_err(|e| ProviderError::transport(&e))?;
    let status = response.status();
    let text = response.text().await.map_err(|e| ProviderError::transport(&e))?;

    if !status.is_success() {
        return Err(ProviderError::from_status(status.as_u16(), truncate_body(&text)));
    }
    Ok(text)
}

/// Parse a successful JSON body, mapping garbage to a transient failure.
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, ProviderError> {
    serde_json::from_str(text).map_err(|e| ProviderError::Transient {
        status: Some(200),
        message: format!("Failed to parse response: {e}. Body: {}", truncate_body(text)),
    })
}

/// Cut a body down to [`MAX_BODY_EXCERPT`] characters.
pub(crate) fn truncate_body(text: &str) -> String {
    match text.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Treat an empty or whitespace-only image field as absent.
pub(crate) fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_body_untouched() {
        assert_eq!(truncate_body("oops"), "oops");
    }

    #[test]
    fn truncate_long_body() {
        let long = "é".repeat(600);
        let cut = truncate_body(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), MAX_BODY_EXCERPT + 3);
    }

    #[test]
    fn blank_fields_are_absent() {
        assert_eq!(non_empty(Some("  ".into())), None);
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some("x".into())).as_deref(), Some("x"));
    }
}
