//! Configuration file loading with environment variable overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::adapters::live::controlnet::CONTROLNET_API_URL;
use crate::adapters::live::identity::IDENTITY_API_URL;
use crate::adapters::live::openai::OPENAI_API_URL;
use crate::router::{PolicyRejection, RouterSettings};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Provider API keys.
    #[serde(default)]
    pub keys: KeysConfig,

    /// Provider endpoint overrides.
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    /// Routing and rate-limit tunables.
    #[serde(default)]
    pub router: RouterConfig,
}

/// API key configuration.
#[derive(Debug, Default, Deserialize)]
pub struct KeysConfig {
    /// Primary-Diffusion (`OpenAI`) key.
    pub openai: Option<String>,
    /// Identity-Preserving provider key.
    pub identity: Option<String>,
    /// ControlNet-Style provider key.
    pub controlnet: Option<String>,
}

/// Endpoint URLs, defaulting to the public APIs.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Primary-Diffusion endpoint.
    pub openai: String,
    /// Identity-Preserving endpoint.
    pub identity: String,
    /// ControlNet-Style endpoint.
    pub controlnet: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            openai: OPENAI_API_URL.to_string(),
            identity: IDENTITY_API_URL.to_string(),
            controlnet: CONTROLNET_API_URL.to_string(),
        }
    }
}

/// Router tunables, in seconds where durations are involved.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Cooldown between accepted requests per requester.
    pub cooldown_secs: u64,
    /// Requesters tracked before least-recent eviction.
    pub max_tracked_requesters: usize,
    /// Per-request timeout for each provider HTTP call.
    pub provider_timeout_secs: u64,
    /// Budget for all provider attempts of one request.
    pub total_budget_secs: u64,
    /// `fallback` or `abort` when a provider rejects the input.
    pub on_policy_rejection: PolicyRejection,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 10,
            max_tracked_requesters: 10_000,
            provider_timeout_secs: 60,
            total_budget_secs: 150,
            on_policy_rejection: PolicyRejection::Fallback,
        }
    }
}

impl RouterConfig {
    /// Timeout applied to every provider HTTP call.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Convert into router settings.
    #[must_use]
    pub fn settings(&self) -> RouterSettings {
        RouterSettings {
            cooldown: Duration::from_secs(self.cooldown_secs),
            max_tracked_requesters: self.max_tracked_requesters,
            total_budget: Duration::from_secs(self.total_budget_secs),
            on_policy_rejection: self.on_policy_rejection,
        }
    }
}

impl Config {
    /// Load configuration from the given path, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
    }

    /// Primary-Diffusion key, preferring `OPENAI_API_KEY`.
    #[must_use]
    pub fn openai_key(&self) -> Option<String> {
        key_from_env("OPENAI_API_KEY").or_else(|| self.keys.openai.clone())
    }

    /// Identity-Preserving key, preferring `IDENTITY_API_KEY`.
    #[must_use]
    pub fn identity_key(&self) -> Option<String> {
        key_from_env("IDENTITY_API_KEY").or_else(|| self.keys.identity.clone())
    }

    /// ControlNet-Style key, preferring `CONTROLNET_API_KEY`.
    #[must_use]
    pub fn controlnet_key(&self) -> Option<String> {
        key_from_env("CONTROLNET_API_KEY").or_else(|| self.keys.controlnet.clone())
    }
}

/// An empty variable counts as unset.
fn key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Discover the config file path using the resolution order:
/// 1. Explicit path (from `--config` flag)
/// 2. `DREAMFORGE_CONFIG` environment variable
/// 3. `~/.config/dreamforge/config.toml`
#[must_use]
pub fn discover_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(p) = explicit {
        return PathBuf::from(p);
    }

    if let Ok(p) = std::env::var("DREAMFORGE_CONFIG") {
        return PathBuf::from(p);
    }

    default_config_path()
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config/dreamforge/config.toml")
    } else {
        PathBuf::from("dreamforge.toml")
    }
}
