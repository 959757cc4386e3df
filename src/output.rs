//! Saving canonical image results to disk.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use image::ImageFormat;
use reqwest::Client;

use crate::error::AppError;
use crate::normalize::CanonicalImageResult;

/// Generate an output filename from a prompt and mime type.
///
/// Sanitizes the first 50 characters of the prompt to kebab-case,
/// appends a unix timestamp, and adds an extension matching the mime type.
#[must_use]
pub fn auto_filename(prompt: &str, mime_type: &str) -> String {
    let sanitized = sanitize_for_filename(prompt, 50);
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let ext = mime_extension(mime_type);
    format!("{sanitized}-{timestamp}.{ext}")
}

/// Sanitize a string for use in a filename.
///
/// Converts to lowercase, replaces non-alphanumeric chars with hyphens,
/// collapses consecutive hyphens, and trims to max length.
#[must_use]
pub fn sanitize_for_filename(input: &str, max_len: usize) -> String {
    let mut result = String::with_capacity(max_len);
    let mut last_was_hyphen = true;

    for ch in input.chars() {
        if result.len() >= max_len {
            break;
        }
        if ch.is_ascii_alphanumeric() {
            result.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            result.push('-');
            last_was_hyphen = true;
        }
    }

    while result.ends_with('-') {
        result.pop();
    }

    if result.is_empty() {
        "image".to_string()
    } else {
        result
    }
}

/// File extension for an image mime type; unknown types become `png`.
#[must_use]
pub fn mime_extension(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

/// Fetch the bytes behind a canonical result along with their mime type.
///
/// # Errors
///
/// Returns an error if inline data is not valid base64 or the download fails.
pub async fn fetch_bytes(
    client: &Client,
    result: &CanonicalImageResult,
) -> Result<(Vec<u8>, String), AppError> {
    match result {
        CanonicalImageResult::InlineData { mime_type, data } => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|e| AppError::ImageConversion(format!("Invalid base64 payload: {e}")))?;
            Ok((bytes, mime_type.clone()))
        }
        CanonicalImageResult::RemoteUrl(url) => {
            let response = client.get(url).send().await?.error_for_status()?;
            let mime_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map_or_else(|| "image/png".to_string(), |v| v.split(';').next().unwrap_or(v).trim().to_string());
            let bytes = response.bytes().await?.to_vec();
            Ok((bytes, mime_type))
        }
    }
}

/// Save raw image bytes, converting when the path's extension names
/// a different format than `source_mime`.
///
/// # Errors
///
/// Returns an error if the file cannot be written or format conversion fails.
pub fn save_image(data: &[u8], source_mime: &str, output_path: &Path) -> Result<(), AppError> {
    match ImageFormat::from_path(output_path) {
        Ok(target) if !mime_matches_format(source_mime, target) => {
            convert_and_save(data, target, output_path)
        }
        _ => std::fs::write(output_path, data).map_err(AppError::Io),
    }
}

fn mime_matches_format(mime: &str, format: ImageFormat) -> bool {
    ImageFormat::from_mime_type(mime) == Some(format)
}

fn convert_and_save(data: &[u8], target: ImageFormat, output_path: &Path) -> Result<(), AppError> {
    let img = image::load_from_memory(data)
        .map_err(|e| AppError::ImageConversion(format!("Failed to decode image: {e}")))?;
    img.save_with_format(output_path, target)
        .map_err(|e| AppError::ImageConversion(format!("Failed to save as {target:?}: {e}")))
}

/// Resolve the output path: use explicit path or auto-generate.
#[must_use]
pub fn resolve_output_path(explicit: Option<&str>, prompt: &str, mime_type: &str) -> PathBuf {
    match explicit {
        Some(p) => PathBuf::from(p),
        None => PathBuf::from(auto_filename(prompt, mime_type)),
    }
}
