//! Termination message reported when an import finishes.
//!
//! The pipeline only produces or passes the message through; the caller
//! decides where it ends up (by default the pod termination log).

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use volimport_shared::errors::ImportResult;

const TERMINATION_LOG_MODE: u32 = 0o600;

/// Structured result of an import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminationMessage {
    /// Set when the run failed because scratch space was missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_space_required: Option<bool>,

    /// Whether the destination ended up preallocated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preallocation_applied: Option<bool>,

    /// Number of checkpoint deltas merged so far in a multistage import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_count: Option<u32>,

    /// Provider-specific labels (e.g. detected source format).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl TerminationMessage {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Serialize to a single line of JSON.
    pub fn to_line(&self) -> ImportResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Write the first line of `message` to `path`.
///
/// Newlines are flattened to spaces first, so multi-line error text still
/// lands as one readable line.
pub fn write_termination_message(path: &Path, message: &str) -> ImportResult<()> {
    let flattened = message.replace('\n', " ");
    let first_line = flattened.lines().next().unwrap_or_default();
    if first_line.is_empty() {
        return Ok(());
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(TERMINATION_LOG_MODE)
        .open(path)?;
    file.write_all(first_line.as_bytes())?;
    tracing::debug!(path = %path.display(), "Wrote termination message");
    Ok(())
}
