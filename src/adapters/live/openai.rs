//! Primary-Diffusion adapter for the `OpenAI` Images API.

use reqwest::Client;
use serde::Deserialize;

use super::{non_empty, parse_body, send_for_text};
use crate::error::NoResultReason;
use crate::ports::image_provider::{
    AttemptFuture, ImageProvider, ProviderAttemptOutcome, ProviderKind,
};

/// Default `OpenAI` image generation endpoint.
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/images/generations";

const MODEL: &str = "dall-e-3";
const SIZE: &str = "1024x1024";
const QUALITY: &str = "standard";

/// Text-to-image provider; ignores identity images.
pub struct PrimaryDiffusionProvider {
    client: Client,
    api_key: Option<String>,
    url: String,
}

impl PrimaryDiffusionProvider {
    /// Create the provider. A `None` key makes every attempt a no-result.
    #[must_use]
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key, url: OPENAI_API_URL.to_string() }
    }

    /// Override the endpoint URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl ImageProvider for PrimaryDiffusionProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::PrimaryDiffusion
    }

    fn attempt<'a>(&'a self, prompt: &'a str, _identity_image: Option<&'a str>) -> AttemptFuture<'a> {
        Box::pin(async move {
            let Some(api_key) = self.api_key.as_deref() else {
                return ProviderAttemptOutcome::NoResult(NoResultReason::MissingApiKey);
            };

            let body = serde_json::json!({
                "model": MODEL,
                "prompt": prompt,
                "size": SIZE,
                "quality": QUALITY,
                "n": 1,
            });

            let request = self.client.post(&self.url).bearer_auth(api_key).json(&body);
            let text = match send_for_text(request).await {
                Ok(text) => text,
                Err(e) => return ProviderAttemptOutcome::Failure(e),
            };

            let parsed: OpenAiResponse = match parse_body(&text) {
                Ok(parsed) => parsed,
                Err(e) => return ProviderAttemptOutcome::Failure(e),
            };

            parsed
                .data
                .into_iter()
                .next()
                .and_then(|item| non_empty(item.url).or_else(|| non_empty(item.b64_json)))
                .map_or(
                    ProviderAttemptOutcome::NoResult(NoResultReason::EmptyResponse),
                    ProviderAttemptOutcome::Success,
                )
        })
    }
}

// --- OpenAI API response types ---

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    data: Vec<OpenAiImageData>,
}

#[derive(Deserialize)]
struct OpenAiImageData {
    url: Option<String>,
    b64_json: Option<String>,
}
