//! Replaying adapter: serves recorded outcomes from a cassette.

use std::sync::Arc;

use parking_lot::Mutex;

use super::ATTEMPT_METHOD;
use crate::cassette::replayer::CassetteReplayer;
use crate::error::ProviderError;
use crate::ports::image_provider::{
    AttemptFuture, ImageProvider, ProviderAttemptOutcome, ProviderKind,
};

/// Plays back the next recorded outcome for one provider.
pub struct ReplayingProvider {
    kind: ProviderKind,
    replayer: Arc<Mutex<CassetteReplayer>>,
}

impl ReplayingProvider {
    /// Create a replaying provider for `kind` backed by a shared replayer.
    #[must_use]
    pub fn new(kind: ProviderKind, replayer: Arc<Mutex<CassetteReplayer>>) -> Self {
        Self { kind, replayer }
    }

    fn next_outcome(&self) -> ProviderAttemptOutcome {
        let mut replayer = self.replayer.lock();
        let output = match replayer.next_interaction(self.kind.name(), ATTEMPT_METHOD) {
            Ok(interaction) => interaction.output.clone(),
            Err(message) => return replay_failure(message),
        };
        serde_json::from_value(output)
            .unwrap_or_else(|e| replay_failure(format!("unreadable recorded outcome: {e}")))
    }
}

fn replay_failure(message: String) -> ProviderAttemptOutcome {
    ProviderAttemptOutcome::Failure(ProviderError::Transient { status: None, message })
}

impl ImageProvider for ReplayingProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn attempt<'a>(&'a self, _prompt: &'a str, _identity_image: Option<&'a str>) -> AttemptFuture<'a> {
        let outcome = self.next_outcome();
        Box::pin(async move { outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::format::{Cassette, Interaction};
    use crate::error::NoResultReason;
    use serde_json::json;

    fn shared_replayer(outputs: &[(&str, serde_json::Value)]) -> Arc<Mutex<CassetteReplayer>> {
        let interactions = outputs
            .iter()
            .enumerate()
            .map(|(i, (port, output))| Interaction {
                seq: i as u64,
                port: (*port).into(),
                method: ATTEMPT_METHOD.into(),
                input: json!({}),
                output: output.clone(),
            })
            .collect();
        let cassette = Cassette {
            name: "t".into(),
            recorded_at: chrono::Utc::now(),
            commit: "c".into(),
            interactions,
        };
        Arc::new(Mutex::new(CassetteReplayer::new(&cassette)))
    }

    #[tokio::test]
    async fn replays_recorded_outcomes() {
        let replayer = shared_replayer(&[
            ("identity_preserving", json!({"NoResult": "MissingIdentityImage"})),
            ("primary_diffusion", json!({"Success": "https://img.example/a.png"})),
        ]);
        let identity = ReplayingProvider::new(ProviderKind::IdentityPreserving, Arc::clone(&replayer));
        let primary = ReplayingProvider::new(ProviderKind::PrimaryDiffusion, replayer);

        assert_eq!(
            identity.attempt("x", None).await,
            ProviderAttemptOutcome::NoResult(NoResultReason::MissingIdentityImage)
        );
        assert_eq!(
            primary.attempt("x", None).await,
            ProviderAttemptOutcome::Success("https://img.example/a.png".into())
        );
    }

    #[tokio::test]
    async fn missing_recording_is_a_failure_not_a_panic() {
        let replayer = shared_replayer(&[]);
        let provider = ReplayingProvider::new(ProviderKind::ControlNetStyle, replayer);
        assert!(matches!(
            provider.attempt("x", None).await,
            ProviderAttemptOutcome::Failure(ProviderError::Transient { .. })
        ));
    }
}
