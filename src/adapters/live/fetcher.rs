//! Identity-image fetching and inline encoding.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use lru::LruCache;
use parking_lot::Mutex;
use reqwest::Client;

use super::truncate_body;
use crate::error::ProviderError;
use crate::normalize::looks_like_base64;
use crate::ports::identity_fetcher::{FetchFuture, IdentityImageFetcher};

/// Largest identity image accepted for download.
pub const MAX_IDENTITY_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Downloads identity images over HTTP.
pub struct HttpIdentityFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpIdentityFetcher {
    /// Create a fetcher. The client's timeout bounds every download.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client, max_bytes: MAX_IDENTITY_IMAGE_BYTES }
    }

    #[cfg(test)]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn too_large(&self, url: &str) -> ProviderError {
        ProviderError::Policy {
            status: None,
            message: format!("identity image at {url} exceeds {} bytes", self.max_bytes),
        }
    }
}

impl IdentityImageFetcher for HttpIdentityFetcher {
    fn fetch_base64<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let mut response =
                self.client.get(url).send().await.map_err(|e| ProviderError::transport(&e))?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(ProviderError::from_status(
                    status.as_u16(),
                    format!("identity image fetch failed: {}", truncate_body(&text)),
                ));
            }

            if response.content_length().is_some_and(|len| len > self.max_bytes as u64) {
                return Err(self.too_large(url));
            }

            let mut bytes = Vec::new();
            while let Some(chunk) = response.chunk().await.map_err(|e| ProviderError::transport(&e))? {
                if bytes.len() + chunk.len() > self.max_bytes {
                    return Err(self.too_large(url));
                }
                bytes.extend_from_slice(&chunk);
            }
            if bytes.is_empty() {
                return Err(ProviderError::Transient {
                    status: Some(status.as_u16()),
                    message: format!("identity image at {url} is empty"),
                });
            }
            tracing::debug!(url, bytes = bytes.len(), "fetched identity image");
            Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
        })
    }
}

/// Default number of identity images kept by [`CachedIdentityFetcher`].
pub const DEFAULT_CACHE_ENTRIES: usize = 8;

/// Default lifetime of a cached identity image.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Remembers recent downloads so providers later in one fallback chain
/// reuse the image an earlier provider already fetched.
///
/// Only successful fetches are cached. Entries expire after `ttl`.
pub struct CachedIdentityFetcher {
    inner: Arc<dyn IdentityImageFetcher>,
    ttl: Duration,
    entries: Mutex<LruCache<String, (Instant, String)>>,
}

impl CachedIdentityFetcher {
    /// Wrap `inner` with a cache of at most `capacity` images.
    #[must_use]
    pub fn new(inner: Arc<dyn IdentityImageFetcher>, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { inner, ttl, entries: Mutex::new(LruCache::new(capacity)) }
    }

    fn cached(&self, url: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        let fresh = entries
            .get(url)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, encoded)| encoded.clone());
        if fresh.is_none() {
            entries.pop(url);
        }
        fresh
    }
}

impl IdentityImageFetcher for CachedIdentityFetcher {
    fn fetch_base64<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            if let Some(encoded) = self.cached(url) {
                tracing::debug!(url, "identity image served from cache");
                return Ok(encoded);
            }
            let encoded = self.inner.fetch_base64(url).await?;
            self.entries.lock().put(url.to_string(), (Instant::now(), encoded.clone()));
            Ok(encoded)
        })
    }
}

/// Turn an identity reference into the bare base64 providers expect.
///
/// Accepts a `data:` URI, an `http(s)` URL (downloaded through `fetcher`),
/// or an already-bare base64 payload.
///
/// # Errors
///
/// Returns a policy failure for unrecognized input, or the fetcher's error.
pub async fn inline_identity_image(
    fetcher: &dyn IdentityImageFetcher,
    reference: &str,
) -> Result<String, ProviderError> {
    let reference = reference.trim();

    if let Some(rest) = reference.strip_prefix("data:") {
        return rest
            .split_once(";base64,")
            .map(|(_, payload)| payload.to_string())
            .filter(|payload| !payload.is_empty())
            .ok_or_else(|| ProviderError::Policy {
                status: None,
                message: "identity image data URI is not base64".into(),
            });
    }
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return fetcher.fetch_base64(reference).await;
    }
    if looks_like_base64(reference) {
        return Ok(reference.to_string());
    }

    Err(ProviderError::Policy {
        status: None,
        message: "identity image must be a URL, data URI, or base64 payload".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher(AtomicUsize);

    impl IdentityImageFetcher for CountingFetcher {
        fn fetch_base64<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(format!("{url}#{n}")) })
        }
    }

    #[tokio::test]
    async fn oversized_image_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/huge.png");
                then.status(200).body(vec![0_u8; 2048]);
            })
            .await;

        let fetcher = HttpIdentityFetcher::new(Client::new()).with_max_bytes(1024);
        let err = fetcher.fetch_base64(&server.url("/huge.png")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Policy { status: None, ref message } if message.contains("exceeds 1024 bytes")));
    }

    #[tokio::test]
    async fn image_at_ceiling_is_accepted() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/exact.png");
                then.status(200).body(vec![0_u8; 3]);
            })
            .await;

        let fetcher = HttpIdentityFetcher::new(Client::new()).with_max_bytes(3);
        assert_eq!(fetcher.fetch_base64(&server.url("/exact.png")).await.unwrap(), "AAAA");
    }

    #[tokio::test]
    async fn cache_reuses_a_fresh_download() {
        let inner = Arc::new(CountingFetcher(AtomicUsize::new(0)));
        let cached = CachedIdentityFetcher::new(inner.clone(), 4, DEFAULT_CACHE_TTL);

        let first = cached.fetch_base64("https://x/me.png").await.unwrap();
        let second = cached.fetch_base64("https://x/me.png").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_fetched_again() {
        let inner = Arc::new(CountingFetcher(AtomicUsize::new(0)));
        let cached = CachedIdentityFetcher::new(inner.clone(), 4, Duration::ZERO);

        cached.fetch_base64("https://x/me.png").await.unwrap();
        cached.fetch_base64("https://x/me.png").await.unwrap();

        assert_eq!(inner.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn identity_then_controlnet_download_once() {
        use crate::adapters::live::controlnet::ControlNetStyleProvider;
        use crate::adapters::live::identity::IdentityPreservingProvider;
        use crate::ports::image_provider::{ImageProvider, ProviderAttemptOutcome};
        use httpmock::Method::POST;

        let server = MockServer::start_async().await;
        let face = server
            .mock_async(|when, then| {
                when.method(GET).path("/me.jpg");
                then.status(200).body([0xFF_u8, 0xD8, 0xFF]);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/identity");
                then.status(503).body("warming up");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/controlnet").body_includes("\"image\":\"/9j/\"");
                then.status(200).body(r#"{"image": "https://cdn.example/knight.png"}"#);
            })
            .await;

        let client = Client::new();
        let fetcher: Arc<dyn IdentityImageFetcher> = Arc::new(CachedIdentityFetcher::new(
            Arc::new(HttpIdentityFetcher::new(client.clone())),
            DEFAULT_CACHE_ENTRIES,
            DEFAULT_CACHE_TTL,
        ));
        let identity = IdentityPreservingProvider::new(client.clone(), Some("k".into()), Arc::clone(&fetcher))
            .with_url(server.url("/identity"));
        let controlnet = ControlNetStyleProvider::new(client, Some("k".into()), fetcher)
            .with_url(server.url("/controlnet"));
        let face_url = server.url("/me.jpg");

        let first = identity.attempt("me as a knight", Some(&face_url)).await;
        let second = controlnet.attempt("me as a knight", Some(&face_url)).await;

        assert!(matches!(first, ProviderAttemptOutcome::Failure(_)));
        assert_eq!(second, ProviderAttemptOutcome::Success("https://cdn.example/knight.png".into()));
        face.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn fetches_and_encodes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/face.jpg");
                then.status(200).header("content-type", "image/jpeg").body([0xFF_u8, 0xD8, 0xFF]);
            })
            .await;

        let fetcher = HttpIdentityFetcher::new(Client::new());
        let encoded = fetcher.fetch_base64(&server.url("/face.jpg")).await.unwrap();
        assert_eq!(encoded, "/9j/");
    }

    #[tokio::test]
    async fn missing_image_is_policy_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gone.jpg");
                then.status(404).body("not found");
            })
            .await;

        let fetcher = HttpIdentityFetcher::new(Client::new());
        let err = fetcher.fetch_base64(&server.url("/gone.jpg")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Policy { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn data_uri_is_stripped() {
        let fetcher = HttpIdentityFetcher::new(Client::new());
        let payload = inline_identity_image(&fetcher, "data:image/png;base64,AQID").await.unwrap();
        assert_eq!(payload, "AQID");
    }

    #[tokio::test]
    async fn bare_base64_passes_through() {
        let fetcher = HttpIdentityFetcher::new(Client::new());
        let blob = "A".repeat(120);
        assert_eq!(inline_identity_image(&fetcher, &blob).await.unwrap(), blob);
    }

    #[tokio::test]
    async fn garbage_reference_is_rejected() {
        let fetcher = HttpIdentityFetcher::new(Client::new());
        let err = inline_identity_image(&fetcher, "my face please").await.unwrap_err();
        assert!(matches!(err, ProviderError::Policy { status: None, .. }));
    }
}
