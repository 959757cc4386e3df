//! Service context: builds the router with live, recording, or replaying providers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Client;

use crate::adapters::live::controlnet::ControlNetStyleProvider;
use crate::adapters::live::fetcher::{
    CachedIdentityFetcher, HttpIdentityFetcher, DEFAULT_CACHE_ENTRIES, DEFAULT_CACHE_TTL,
};
use crate::adapters::live::identity::IdentityPreservingProvider;
use crate::adapters::live::openai::PrimaryDiffusionProvider;
use crate::adapters::recording::RecordingProvider;
use crate::adapters::replaying::ReplayingProvider;
use crate::cassette::load_cassette;
use crate::cassette::recorder::CassetteRecorder;
use crate::config::Config;
use crate::error::AppError;
use crate::ports::{IdentityImageFetcher, ImageProvider, ProviderKind};
use crate::router::{ProviderSet, Router};

/// Everything a command needs to serve generation requests.
pub struct ServiceContext {
    /// The shared fallback router.
    pub router: Arc<Router>,
    /// HTTP client for downloads outside provider attempts.
    pub client: Client,
}

/// Handle to a recording session that must be finished after use.
pub struct RecordingSession {
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingSession {
    /// Write the recorded cassette to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette file cannot be written.
    pub fn finish(self) -> Result<PathBuf, String> {
        self.recorder.lock().finish().map_err(|e| format!("Failed to write cassette: {e}"))
    }
}

impl ServiceContext {
    /// Create a context that talks to the real providers.
    ///
    /// Missing keys are not an error here: the affected provider reports
    /// no result and the router falls back.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn live(config: &Config) -> Result<Self, AppError> {
        let client = Client::builder().timeout(config.router.provider_timeout()).build()?;
        let providers = live_providers(config, &client);
        let router = Router::new(providers, &config.router.settings());
        Ok(Self { router: Arc::new(router), client })
    }

    /// Create a context whose live providers are wrapped with a recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn recording(config: &Config) -> Result<(Self, RecordingSession), AppError> {
        let client = Client::builder().timeout(config.router.provider_timeout()).build()?;

        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        let path = PathBuf::from(".dreamforge/cassettes")
            .join(&timestamp)
            .join("providers.cassette.yaml");
        let recorder = Arc::new(Mutex::new(CassetteRecorder::new(
            path,
            format!("{timestamp}-providers"),
            get_commit_hash(),
        )));

        let live = live_providers(config, &client);
        let wrap = |inner: Box<dyn ImageProvider>| -> Box<dyn ImageProvider> {
            Box::new(RecordingProvider::new(inner, Arc::clone(&recorder)))
        };
        let providers = ProviderSet {
            primary: wrap(live.primary),
            identity: wrap(live.identity),
            controlnet: wrap(live.controlnet),
        };

        let router = Router::new(providers, &config.router.settings());
        let ctx = Self { router: Arc::new(router), client };
        Ok((ctx, RecordingSession { recorder }))
    }

    /// Create a context that replays provider outcomes from a cassette.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette cannot be loaded.
    pub fn replaying(path: &Path, config: &Config) -> Result<Self, AppError> {
        let replayer = load_cassette(path)
            .map_err(|e| AppError::Config(format!("Failed to load cassette: {e}")))?;
        let replayer = Arc::new(Mutex::new(replayer));
        let replay = |kind| -> Box<dyn ImageProvider> {
            Box::new(ReplayingProvider::new(kind, Arc::clone(&replayer)))
        };
        let providers = ProviderSet {
            primary: replay(ProviderKind::PrimaryDiffusion),
            identity: replay(ProviderKind::IdentityPreserving),
            controlnet: replay(ProviderKind::ControlNetStyle),
        };

        let client = Client::builder().timeout(config.router.provider_timeout()).build()?;
        let router = Router::new(providers, &config.router.settings());
        Ok(Self { router: Arc::new(router), client })
    }
}

fn live_providers(config: &Config, client: &Client) -> ProviderSet {
    let fetcher: Arc<dyn IdentityImageFetcher> = Arc::new(CachedIdentityFetcher::new(
        Arc::new(HttpIdentityFetcher::new(client.clone())),
        DEFAULT_CACHE_ENTRIES,
        DEFAULT_CACHE_TTL,
    ));
    ProviderSet {
        primary: Box::new(
            PrimaryDiffusionProvider::new(client.clone(), config.openai_key())
                .with_url(&config.endpoints.openai),
        ),
        identity: Box::new(
            IdentityPreservingProvider::new(client.clone(), config.identity_key(), Arc::clone(&fetcher))
                .with_url(&config.endpoints.identity),
        ),
        controlnet: Box::new(
            ControlNetStyleProvider::new(client.clone(), config.controlnet_key(), fetcher)
                .with_url(&config.endpoints.controlnet),
        ),
    }
}

/// Get the current git commit hash, or "unknown" if unavailable.
fn get_commit_hash() -> String {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map_or_else(|| "unknown".to_string(), |s| s.trim().to_string())
}
