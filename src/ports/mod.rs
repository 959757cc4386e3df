//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the routing core and an
//! external system. Implementations live in `src/adapters/`.

pub mod clock;
pub mod identity_fetcher;
pub mod image_provider;

pub use clock::{Clock, SystemClock};
pub use identity_fetcher::IdentityImageFetcher;
pub use image_provider::{
    GenerationRequest, ImageProvider, ProviderAttemptOutcome, ProviderKind,
};
