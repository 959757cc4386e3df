//! Collects interactions and writes them out as a cassette.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use super::format::{Cassette, Interaction};

/// Accumulates interactions in call order until [`CassetteRecorder::finish`].
#[derive(Debug)]
pub struct CassetteRecorder {
    path: PathBuf,
    name: String,
    commit: String,
    interactions: Vec<Interaction>,
}

impl CassetteRecorder {
    /// Create a recorder that will write to `path`.
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self { path: path.into(), name: name.into(), commit: commit.into(), interactions: Vec::new() }
    }

    /// Append one call. Values that fail to serialize are stored as `null`.
    pub fn record<I: Serialize, O: Serialize>(
        &mut self,
        port: &str,
        method: &str,
        input: &I,
        output: &O,
    ) {
        let seq = self.interactions.len() as u64;
        self.interactions.push(Interaction {
            seq,
            port: port.to_string(),
            method: method.to_string(),
            input: serde_json::to_value(input).unwrap_or_default(),
            output: serde_json::to_value(output).unwrap_or_default(),
        });
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Write everything recorded so far, creating parent directories.
    ///
    /// Drains the recorded interactions.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn finish(&mut self) -> Result<PathBuf, std::io::Error> {
        let cassette = Cassette {
            name: self.name.clone(),
            recorded_at: Utc::now(),
            commit: self.commit.clone(),
            interactions: std::mem::take(&mut self.interactions),
        };
        let yaml = serde_yaml::to_string(&cassette).map_err(std::io::Error::other)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, yaml)?;
        Ok(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NoResultReason;
    use crate::ports::ProviderAttemptOutcome;
    use serde_json::json;

    #[test]
    fn records_outcomes_per_provider() {
        let dir = std::env::temp_dir().join("dreamforge_recorder_test");
        let path = dir.join("providers.cassette.yaml");

        let mut recorder = CassetteRecorder::new(&path, "test-recording", "deadbeef");
        recorder.record(
            "identity_preserving",
            "attempt",
            &json!({"prompt": "a cat"}),
            &ProviderAttemptOutcome::NoResult(NoResultReason::MissingIdentityImage),
        );
        recorder.record(
            "primary_diffusion",
            "attempt",
            &json!({"prompt": "a cat"}),
            &ProviderAttemptOutcome::Success("https://img.example/cat.png".into()),
        );
        assert_eq!(recorder.len(), 2);

        let written = recorder.finish().unwrap();
        assert_eq!(written, path);
        assert_eq!(recorder.len(), 0);

        let cassette: Cassette =
            serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(cassette.name, "test-recording");
        assert_eq!(cassette.interactions[0].port, "identity_preserving");
        assert_eq!(cassette.interactions[1].seq, 1);
        assert_eq!(cassette.interactions[1].output, json!({"Success": "https://img.example/cat.png"}));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
