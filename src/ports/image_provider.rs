//! Image provider port: one external image-generation API per implementation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::{NoResultReason, ProviderError};

/// Requester bucket used when the caller does not identify itself.
pub const GLOBAL_REQUESTER: &str = "global";

/// The three supported image providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Text-to-image diffusion; the always-available baseline.
    PrimaryDiffusion,
    /// Subject-preserving generation conditioned on an identity image.
    IdentityPreserving,
    /// Style-controlled generation guided by a reference image.
    ControlNetStyle,
}

impl ProviderKind {
    /// Stable snake-case name, also used as the cassette port name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PrimaryDiffusion => "primary_diffusion",
            Self::IdentityPreserving => "identity_preserving",
            Self::ControlNetStyle => "controlnet_style",
        }
    }

    /// Whether this provider can only run with an identity image.
    #[must_use]
    pub const fn requires_identity_image(self) -> bool {
        !matches!(self, Self::PrimaryDiffusion)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A top-level image generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Text prompt describing the desired image.
    pub prompt: String,
    /// Reference subject: URL, `data:` URI, or bare base64.
    #[serde(default)]
    pub identity_image: Option<String>,
    /// Prefer higher-fidelity (slower) providers.
    #[serde(default)]
    pub high_quality: bool,
    /// Identity used for rate limiting.
    #[serde(default)]
    pub requester_id: Option<String>,
}

impl GenerationRequest {
    /// A plain text-to-image request from the global bucket.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Self::default() }
    }

    /// Attach an identity image.
    #[must_use]
    pub fn with_identity_image(mut self, image: impl Into<String>) -> Self {
        self.identity_image = Some(image.into());
        self
    }

    /// Set the high-quality hint.
    #[must_use]
    pub fn with_high_quality(mut self, high_quality: bool) -> Self {
        self.high_quality = high_quality;
        self
    }

    /// Set the requester identity.
    #[must_use]
    pub fn with_requester(mut self, requester_id: impl Into<String>) -> Self {
        self.requester_id = Some(requester_id.into());
        self
    }

    /// Whether the request carries an identity image.
    #[must_use]
    pub fn is_identity_request(&self) -> bool {
        self.identity_image.is_some()
    }

    /// The rate-limit key; blank or absent ids share the global bucket.
    #[must_use]
    pub fn requester_key(&self) -> &str {
        self.requester_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(GLOBAL_REQUESTER)
    }
}

/// Result of one provider attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderAttemptOutcome {
    /// Raw provider output (URL, data URI, or base64), not yet normalized.
    Success(String),
    /// The provider did not (or could not) produce anything usable.
    NoResult(NoResultReason),
    /// The provider call failed.
    Failure(ProviderError),
}

/// Boxed future returned by [`ImageProvider::attempt`].
pub type AttemptFuture<'a> = Pin<Box<dyn Future<Output = ProviderAttemptOutcome> + Send + 'a>>;

/// Generates one image through an external API.
pub trait ImageProvider: Send + Sync {
    /// Which provider this is.
    fn kind(&self) -> ProviderKind;

    /// Whether the provider can only run with an identity image.
    fn requires_identity_image(&self) -> bool {
        self.kind().requires_identity_image()
    }

    /// Attempt a single generation. Never retries internally.
    fn attempt<'a>(&'a self, prompt: &'a str, identity_image: Option<&'a str>)
        -> AttemptFuture<'a>;
}
