//! Persistence layer.
//!
//! Saves and loads the `{credits, jackpot}` snapshot to/from a JSON file.
//! Nothing else about a round survives a restart.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use tracing::{debug, info};

use crate::types::StoredState;

/// Default state file path.
const DEFAULT_STATE_FILE: &str = "updown_state.json";

/// Save the snapshot to a JSON file.
///
/// Writes to a sibling temp file first and renames it over the target so
/// a crash mid-write never leaves a truncated snapshot behind.
pub fn save_state(state: &StoredState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(state)
        .context("Failed to serialise game state")?;

    let tmp = format!("{path}.tmp");
    std::fs::write(&tmp, &json)
        .with_context(|| format!("Failed to write state to {tmp}"))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move state into {path}"))?;

    debug!(path, credits = %state.credits, jackpot = %state.jackpot, "State saved");
    Ok(())
}

/// Load the snapshot from a JSON file. `Ok(None)` when there is no file
/// yet; a file that exists but can't be read or parsed is an error.
pub fn load_state(path: Option<&str>) -> Result<Option<StoredState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path, "No saved state found");
            return Ok(None);
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read state from {path}")),
    };

    let state: StoredState = serde_json::from_str(&json)
        .with_context(|| format!("Corrupt state file {path}"))?;
    debug!(path, credits = %state.credits, jackpot = %state.jackpot, "State loaded");
    Ok(Some(state))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
