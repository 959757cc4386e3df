//! Identity-Preserving adapter for an InstantID-style face-conditioned API.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;

use super::fetcher::inline_identity_image;
use super::{non_empty, parse_body, send_for_text};
use crate::error::NoResultReason;
use crate::ports::identity_fetcher::IdentityImageFetcher;
use crate::ports::image_provider::{
    AttemptFuture, ImageProvider, ProviderAttemptOutcome, ProviderKind,
};

/// Default identity-preserving generation endpoint.
pub const IDENTITY_API_URL: &str = "https://api.segmind.com/v1/instantid";

/// Generates images that keep the subject of a reference face.
pub struct IdentityPreservingProvider {
    client: Client,
    api_key: Option<String>,
    url: String,
    fetcher: Arc<dyn IdentityImageFetcher>,
}

impl IdentityPreservingProvider {
    /// Create the provider. A `None` key makes every attempt a no-result.
    #[must_use]
    pub fn new(
        client: Client,
        api_key: Option<String>,
        fetcher: Arc<dyn IdentityImageFetcher>,
    ) -> Self {
        Self { client, api_key, url: IDENTITY_API_URL.to_string(), fetcher }
    }

    /// Override the endpoint URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl ImageProvider for IdentityPreservingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::IdentityPreserving
    }

    fn attempt<'a>(&'a self, prompt: &'a str, identity_image: Option<&'a str>) -> AttemptFuture<'a> {
        Box::pin(async move {
            let Some(api_key) = self.api_key.as_deref() else {
                return ProviderAttemptOutcome::NoResult(NoResultReason::MissingApiKey);
            };
            let Some(reference) = identity_image else {
                return ProviderAttemptOutcome::NoResult(NoResultReason::MissingIdentityImage);
            };

            let face_image = match inline_identity_image(self.fetcher.as_ref(), reference).await {
                Ok(encoded) => encoded,
                Err(e) => return ProviderAttemptOutcome::Failure(e),
            };

            let body = serde_json::json!({
                "prompt": prompt,
                "face_image": face_image,
                "num_inference_steps": 30,
                "guidance_scale": 5,
                "identity_strength": 0.8,
                "adapter_strength": 0.8,
                "base64": true,
            });

            let request = self.client.post(&self.url).header("x-api-key", api_key).json(&body);
            let text = match send_for_text(request).await {
                Ok(text) => text,
                Err(e) => return ProviderAttemptOutcome::Failure(e),
            };

            match parse_body::<IdentityResponse>(&text) {
                Ok(parsed) => non_empty(parsed.image).map_or(
                    ProviderAttemptOutcome::NoResult(NoResultReason::EmptyResponse),
                    ProviderAttemptOutcome::Success,
                ),
                Err(e) => ProviderAttemptOutcome::Failure(e),
            }
        })
    }
}

#[derive(Deserialize)]
struct IdentityResponse {
    image: Option<String>,
}
