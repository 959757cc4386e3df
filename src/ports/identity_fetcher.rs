//! Identity-image fetcher port.

use std::future::Future;
use std::pin::Pin;

use crate::error::ProviderError;

/// Boxed future returned by [`IdentityImageFetcher::fetch_base64`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>>;

/// Downloads a reference image and returns it base64-encoded.
pub trait IdentityImageFetcher: Send + Sync {
    /// Fetch the image at `url` and encode its bytes as standard base64.
    fn fetch_base64<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}
