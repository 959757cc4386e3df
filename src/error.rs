//! Error types for provider attempts, routing, and the application shell.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::ProviderKind;

/// A failed attempt against a single image provider.
///
/// Serializable so recorded cassettes can carry failures verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ProviderError {
    /// Timeout, 5xx, or a network-level failure.
    #[error("transient failure{}: {message}", status_suffix(.status))]
    Transient {
        /// HTTP status code, if a response was received.
        status: Option<u16>,
        /// Diagnostic message (truncated body or transport error).
        message: String,
    },

    /// The provider rejected the input (content policy or malformed request).
    #[error("rejected by policy{}: {message}", status_suffix(.status))]
    Policy {
        /// HTTP status code, absent when the input was rejected locally.
        status: Option<u16>,
        /// Diagnostic message.
        message: String,
    },

    /// The provider refused our credentials.
    #[error("authentication failed ({status}): {message}")]
    Auth {
        /// HTTP status code.
        status: u16,
        /// Diagnostic message.
        message: String,
    },

    /// The provider is throttling us.
    #[error("upstream rate limit: {message}")]
    UpstreamRateLimited {
        /// Diagnostic message.
        message: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl ProviderError {
    /// Build a transient error from a transport-level `reqwest` failure.
    #[must_use]
    pub fn transport(err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        Self::Transient { status: err.status().map(|s| s.as_u16()), message }
    }

    /// Classify a non-success HTTP status into a failure kind.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Auth { status, message },
            429 => Self::UpstreamRateLimited { message },
            400..=499 => Self::Policy { status: Some(status), message },
            _ => Self::Transient { status: Some(status), message },
        }
    }
}

/// Why a provider ran (or declined to run) without producing an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoResultReason {
    /// The provider's API key is not configured.
    MissingApiKey,
    /// The provider needs an identity image and the request carries none.
    MissingIdentityImage,
    /// The provider answered successfully but returned no usable image.
    EmptyResponse,
}

impl fmt::Display for NoResultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MissingApiKey => "no API key configured",
            Self::MissingIdentityImage => "identity image required",
            Self::EmptyResponse => "no image in response",
        };
        f.write_str(text)
    }
}

/// Why one provider in the fallback chain produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The provider was skipped or returned nothing usable.
    NoResult(NoResultReason),
    /// The provider call failed.
    Failure(ProviderError),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResult(reason) => write!(f, "no result ({reason})"),
            Self::Failure(err) => write!(f, "{err}"),
        }
    }
}

/// One provider's entry in an [`RouterError::AllProvidersFailed`] report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    /// Which provider was attempted.
    pub provider: ProviderKind,
    /// What went wrong.
    pub cause: AttemptFailure,
}

/// Errors returned by [`crate::router::Router::generate`].
#[derive(Debug, Error)]
pub enum RouterError {
    /// The request is malformed (e.g. empty prompt).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The requester is inside the cooldown window.
    #[error("Rate limited, retry after {:.1}s", .retry_after.as_secs_f64())]
    RateLimited {
        /// Remaining cooldown.
        retry_after: Duration,
    },

    /// A provider rejected the input and the router is configured to abort.
    #[error("Rejected by {provider}: {message}")]
    Rejected {
        /// The rejecting provider.
        provider: ProviderKind,
        /// The provider's rejection message.
        message: String,
    },

    /// Every provider in the chain failed.
    #[error("All providers failed: {}", describe_attempts(.attempts))]
    AllProvidersFailed {
        /// Attempted providers in order, the last being the terminal cause.
        attempts: Vec<FailedAttempt>,
    },
}

impl RouterError {
    /// Names of the providers attempted before an `AllProvidersFailed`.
    #[must_use]
    pub fn attempted_providers(&self) -> Vec<ProviderKind> {
        match self {
            Self::AllProvidersFailed { attempts } => attempts.iter().map(|a| a.provider).collect(),
            _ => Vec::new(),
        }
    }
}

fn describe_attempts(attempts: &[FailedAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} -> {}", a.provider, a.cause))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Top-level application errors.
#[derive(Debug, Error)]
pub enum AppError {
    /// Routing failed.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// A network error occurred outside a provider attempt (e.g. download).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Image decoding or format conversion error.
    #[error("Image conversion error: {0}")]
    ImageConversion(String),
}
