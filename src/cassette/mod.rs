//! Record/replay of provider interactions for deterministic runs.
//!
//! A cassette is a YAML file of `(port, method, input, output)` tuples. Each
//! provider is its own port, so replay hands every provider back exactly the
//! outcomes it produced while recording, in order.

pub mod format;
pub mod recorder;
pub mod replayer;

use std::path::Path;

use self::format::Cassette;
use self::replayer::CassetteReplayer;

/// Load a cassette file and create a replayer.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_cassette(path: &Path) -> Result<CassetteReplayer, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read cassette file {}: {e}", path.display()))?;
    let cassette: Cassette = serde_yaml::from_str(&content)
        .map_err(|e| format!("Failed to parse cassette file {}: {e}", path.display()))?;
    Ok(CassetteReplayer::new(&cassette))
}
