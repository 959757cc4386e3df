//! Recording adapter: delegates to a live provider and records the outcome.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{AttemptInput, ATTEMPT_METHOD};
use crate::cassette::recorder::CassetteRecorder;
use crate::ports::image_provider::{AttemptFuture, ImageProvider, ProviderKind};

/// Records every attempt of the wrapped provider under its own port name.
pub struct RecordingProvider {
    inner: Box<dyn ImageProvider>,
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingProvider {
    /// Wrap `inner`, appending its attempts to `recorder`.
    pub fn new(inner: Box<dyn ImageProvider>, recorder: Arc<Mutex<CassetteRecorder>>) -> Self {
        Self { inner, recorder }
    }
}

impl ImageProvider for RecordingProvider {
    fn kind(&self) -> ProviderKind {
        self.inner.kind()
    }

    fn attempt<'a>(&'a self, prompt: &'a str, identity_image: Option<&'a str>) -> AttemptFuture<'a> {
        Box::pin(async move {
            let outcome = self.inner.attempt(prompt, identity_image).await;
            let input = AttemptInput { prompt, identity_image };
            self.recorder.lock().record(self.kind().name(), ATTEMPT_METHOD, &input, &outcome);
            outcome
        })
    }
}
