//! Subcommand implementations.

pub mod diff;
pub mod position;
pub mod replay;

use std::path::Path;

use livetree::{Snapshot, snapshot};

/// Reads and parses a snapshot file.
pub fn read_snapshot(path: &Path) -> Result<Snapshot, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    Ok(snapshot::from_json(&text)?)
}
