//! ControlNet-Style adapter: generation guided by a reference pose image.

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

/// Default ControlNet generation endpoint.
pub const CONTROLNET_API_URL: &str = "https://api.segmind.com/v1/sd1.5-controlnet";

const CONTROL_TYPE: &str = "openpose";
const CONTROL_STRENGTH: f64 = 0.8;
const STEPS: u32 = 30;
const GUIDANCE_SCALE: f64 = 7.5;

/// Style-controlled provider conditioned on a reference image.
pub struct ControlNetStyleProvider {
    client: Client,
    api_key: Option<String>,
    url: String,
    fetcher: Arc<dyn IdentityImageFetcher>,
}

impl ControlNetStyleProvider {
    /// Create the provider. A `None` key makes every attempt a no-result.
    #[must_use]
    pub fn new(
        client: Client,
        api_key: Option<String>,
        fetcher: Arc<dyn IdentityImageFetcher>,
    ) -> Self {
        Self { client, api_key, url: CONTROLNET_API_URL.to_string(), fetcher }
    }

    /// Override the endpoint URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl ImageProvider for ControlNetStyleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ControlNetStyle
    }

    fn attempt<'a>(&'a self, prompt: &'a str, identity_image: Option<&'a str>) -> AttemptFuture<'a> {
        Box::pin(async move {
            let Some(api_key) = self.api_key.as_deref() else {
                return ProviderAttemptOutcome::NoResult(NoResultReason::MissingApiKey);
            };
            let Some(reference) = identity_image else {
                return ProviderAttemptOutcome::NoResult(NoResultReason::MissingIdentityImage);
            };

            let image = match inline_identity_image(self.fetcher.as_ref(), reference).await {
                Ok(encoded) => encoded,
                Err(e) => return ProviderAttemptOutcome::Failure(e),
            };

            let body = serde_json::json!({
                "prompt": prompt,
                "image": image,
                "controlnet": {
                    "type": CONTROL_TYPE,
                    "conditioning_scale": CONTROL_STRENGTH,
                },
                "num_inference_steps": STEPS,
                "guidance_scale": GUIDANCE_SCALE,
                "base64": true,
            });

            let request = self.client.post(&self.url).header("x-api-key", api_key).json(&body);
            let text = match send_for_text(request).await {
                Ok(text) => text,
                Err(e) => return ProviderAttemptOutcome::Failure(e),
            };

            match parse_body::<ControlNetResponse>(&text) {
                Ok(parsed) => parsed.into_image().map_or(
                    ProviderAttemptOutcome::NoResult(NoResultReason::EmptyResponse),
                    ProviderAttemptOutcome::Success,
                ),
                Err(e) => ProviderAttemptOutcome::Failure(e),
            }
        })
    }
}

// --- ControlNet API response types ---

#[derive(Deserialize)]
struct ControlNetResponse {
    image: Option<String>,
    output: Option<ControlNetOutput>,
}

/// Some deployments return a single string, others a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum ControlNetOutput {
    One(String),
    Many(Vec<String>),
}

impl ControlNetResponse {
    fn into_image(self) -> Option<String> {
        non_empty(self.image).or_else(|| match self.output? {
            ControlNetOutput::One(s) => non_empty(Some(s)),
            ControlNetOutput::Many(list) => non_empty(list.into_iter().next()),
        })
    }
}
