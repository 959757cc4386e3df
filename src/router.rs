//! Provider fallback router.
//!
//! A request passes the rate limiter once, then the three providers are tried
//! one after another in an order chosen from the request. The first provider
//! whose output normalizes to an image wins; every other outcome is logged
//! and the next provider is tried.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

use crate::error::{AttemptFailure, FailedAttempt, NoResultReason, ProviderError, RouterError};
use crate::normalize::{normalize, CanonicalImageResult};
use crate::ports::{
    Clock, GenerationRequest, ImageProvider, ProviderAttemptOutcome, ProviderKind, SystemClock,
};
use crate::rate_limit::{RateLimiter, DEFAULT_CAPACITY, DEFAULT_COOLDOWN};

/// Order used when the caller wants subject fidelity or higher quality.
pub const IDENTITY_ORDER: [ProviderKind; 3] = [
    ProviderKind::IdentityPreserving,
    ProviderKind::ControlNetStyle,
    ProviderKind::PrimaryDiffusion,
];

/// Order used for plain text-to-image requests.
pub const DEFAULT_ORDER: [ProviderKind; 3] = [
    ProviderKind::PrimaryDiffusion,
    ProviderKind::IdentityPreserving,
    ProviderKind::ControlNetStyle,
];

/// What to do when a provider rejects the input on policy grounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyRejection {
    /// Try the next provider.
    #[default]
    Fallback,
    /// Stop and report the rejection to the caller.
    Abort,
}

/// Tunables for a [`Router`].
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Cooldown between accepted requests per requester.
    pub cooldown: Duration,
    /// Requesters tracked by the rate limiter before eviction.
    pub max_tracked_requesters: usize,
    /// Wall-clock budget for all attempts of one request.
    pub total_budget: Duration,
    /// Policy-rejection handling.
    pub on_policy_rejection: PolicyRejection,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            max_tracked_requesters: DEFAULT_CAPACITY,
            total_budget: Duration::from_secs(150),
            on_policy_rejection: PolicyRejection::Fallback,
        }
    }
}

/// The three provider slots a router chooses between.
pub struct ProviderSet {
    /// Text-to-image baseline.
    pub primary: Box<dyn ImageProvider>,
    /// Identity-preserving provider.
    pub identity: Box<dyn ImageProvider>,
    /// ControlNet-style provider.
    pub controlnet: Box<dyn ImageProvider>,
}

impl ProviderSet {
    fn get(&self, kind: ProviderKind) -> &dyn ImageProvider {
        match kind {
            ProviderKind::PrimaryDiffusion => self.primary.as_ref(),
            ProviderKind::IdentityPreserving => self.identity.as_ref(),
            ProviderKind::ControlNetStyle => self.controlnet.as_ref(),
        }
    }
}

/// Choose the provider order for a request.
#[must_use]
pub fn attempt_order(request: &GenerationRequest) -> [ProviderKind; 3] {
    if request.high_quality || request.is_identity_request() {
        IDENTITY_ORDER
    } else {
        DEFAULT_ORDER
    }
}

/// Routes generation requests across providers with fallback.
pub struct Router {
    providers: ProviderSet,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    total_budget: Duration,
    on_policy_rejection: PolicyRejection,
}

impl Router {
    /// Create a router over the given providers.
    #[must_use]
    pub fn new(providers: ProviderSet, settings: &RouterSettings) -> Self {
        Self {
            providers,
            limiter: RateLimiter::new(settings.cooldown, settings.max_tracked_requesters),
            clock: Arc::new(SystemClock),
            total_budget: settings.total_budget,
            on_policy_rejection: settings.on_policy_rejection,
        }
    }

    /// Replace the clock used for rate limiting.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Generate one image, falling back across providers.
    ///
    /// # Errors
    ///
    /// - [`RouterError::InvalidRequest`] for an empty prompt.
    /// - [`RouterError::RateLimited`] inside the requester's cooldown; no
    ///   provider is contacted.
    /// - [`RouterError::Rejected`] when a provider rejects the input and the
    ///   router is configured to abort.
    /// - [`RouterError::AllProvidersFailed`] when nothing produced an image.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<CanonicalImageResult, RouterError> {
        if request.prompt.trim().is_empty() {
            return Err(RouterError::InvalidRequest("prompt must not be empty".into()));
        }

        let requester = request.requester_key();
        if let Err(e) = self.limiter.check_and_record(requester, self.clock.now()) {
            tracing::info!(requester, "{e}");
            return Err(e);
        }

        let order = attempt_order(request);
        let deadline = Instant::now() + self.total_budget;
        let mut attempts = Vec::with_capacity(order.len());

        for kind in order {
            let provider = self.providers.get(kind);
            tracing::debug!(
                provider = %kind,
                needs_identity = provider.requires_identity_image(),
                "attempting provider"
            );
            let attempt = provider.attempt(&request.prompt, request.identity_image.as_deref());
            let outcome = tokio::time::timeout_at(deadline, attempt)
                .await
                .unwrap_or_else(|_| ProviderAttemptOutcome::Failure(budget_exhausted()));

            let cause = match outcome {
                ProviderAttemptOutcome::Success(raw) => {
                    if let Some(image) = normalize(&raw) {
                        tracing::info!(provider = %kind, requester, "image generated");
                        return Ok(image);
                    }
                    tracing::debug!(provider = %kind, "provider returned an empty payload");
                    AttemptFailure::NoResult(NoResultReason::EmptyResponse)
                }
                ProviderAttemptOutcome::NoResult(reason) => {
                    tracing::debug!(provider = %kind, %reason, "provider produced no result");
                    AttemptFailure::NoResult(reason)
                }
                ProviderAttemptOutcome::Failure(err) => {
                    if let ProviderError::Policy { message, .. } = &err {
                        tracing::warn!(provider = %kind, error = %err, "provider rejected the input");
                        if self.on_policy_rejection == PolicyRejection::Abort {
                            return Err(RouterError::Rejected { provider: kind, message: message.clone() });
                        }
                    } else {
                        tracing::warn!(provider = %kind, error = %err, "provider attempt failed");
                    }
                    AttemptFailure::Failure(err)
                }
            };
            attempts.push(FailedAttempt { provider: kind, cause });

            if Instant::now() >= deadline {
                break;
            }
        }

        tracing::warn!(requester, attempted = attempts.len(), "all providers failed");
        Err(RouterError::AllProvidersFailed { attempts })
    }
}

fn budget_exhausted() -> ProviderError {
    ProviderError::Transient { status: None, message: "generation budget exhausted".into() }
}
