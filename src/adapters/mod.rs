//! Adapter implementations for port traits.
//!
//! - `live/`: Real provider APIs over HTTP
//! - `recording/`: Wrap a live provider and capture its outcomes
//! - `replaying/`: Serve captured outcomes with no network I/O

pub mod live;
pub mod recording;
pub mod replaying;

use serde::Serialize;

/// Method name under which provider attempts are recorded.
pub(crate) const ATTEMPT_METHOD: &str = "attempt";

/// Arguments of one provider attempt, as stored in cassettes.
#[derive(Debug, Serialize)]
pub(crate) struct AttemptInput<'a> {
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_image: Option<&'a str>,
}
