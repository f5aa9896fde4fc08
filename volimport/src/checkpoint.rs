//! Checkpoint chains and resume points.
//!
//! A multistage import copies a base image first and then one delta per
//! checkpoint. Between stages the run pauses and a [`ResumePoint`] records
//! where to pick up.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use volimport_shared::errors::{ImportError, ImportResult};

use crate::processor::ProcessingPhase;

/// One stage of a multistage import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataVolumeCheckpoint {
    /// Checkpoint this delta applies on top of. Empty for the base image.
    #[serde(default)]
    pub previous: String,
    /// Checkpoint this stage produces.
    pub current: String,
}

impl DataVolumeCheckpoint {
    pub fn is_base(&self) -> bool {
        self.previous.is_empty()
    }
}

/// Ordered list of checkpoints to import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointChain {
    #[serde(default)]
    pub checkpoints: Vec<DataVolumeCheckpoint>,
    /// The last checkpoint in the list is the final one; no more will be added.
    #[serde(default)]
    pub final_checkpoint: bool,
}

impl CheckpointChain {
    pub fn from_json(json: &str) -> ImportResult<Self> {
        let chain: Self = serde_json::from_str(json)?;
        chain.validate()?;
        Ok(chain)
    }

    pub fn load(path: &Path) -> ImportResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ImportError::Config(format!("failed to read checkpoints {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Each checkpoint must name a unique `current` and build on the one before it.
    pub fn validate(&self) -> ImportResult<()> {
        let mut seen = HashSet::new();
        for (idx, checkpoint) in self.checkpoints.iter().enumerate() {
            if checkpoint.current.is_empty() {
                return Err(ImportError::Config(format!(
                    "checkpoint {idx} has an empty current id"
                )));
            }
            if !seen.insert(checkpoint.current.as_str()) {
                return Err(ImportError::Config(format!(
                    "checkpoint {} appears more than once",
                    checkpoint.current
                )));
            }
            if idx > 0 && checkpoint.previous != self.checkpoints[idx - 1].current {
                return Err(ImportError::Config(format!(
                    "checkpoint {} expects previous {:?} but follows {}",
                    checkpoint.current,
                    checkpoint.previous,
                    self.checkpoints[idx - 1].current
                )));
            }
        }
        Ok(())
    }

    pub fn position(&self, current: &str) -> Option<usize> {
        self.checkpoints.iter().position(|c| c.current == current)
    }

    pub fn get(&self, current: &str) -> Option<&DataVolumeCheckpoint> {
        self.checkpoints.iter().find(|c| c.current == current)
    }

    /// The checkpoint to import after `last_merged`, or the first one when
    /// nothing has been merged yet.
    pub fn next_unmerged(&self, last_merged: Option<&str>) -> Option<&DataVolumeCheckpoint> {
        match last_merged {
            None => self.checkpoints.first(),
            Some(last) => self.checkpoints.iter().find(|c| c.previous == last),
        }
    }

    /// Whether `current` is the last checkpoint of a closed chain.
    pub fn is_final(&self, current: &str) -> bool {
        self.final_checkpoint
            && self
                .checkpoints
                .last()
                .is_some_and(|c| c.current == current)
    }
}

/// Where a paused import picks up again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePoint {
    /// Phase to run first on resume.
    pub phase: ProcessingPhase,
    /// Intermediate image left by the transfer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Url>,
    /// Checkpoint the paused stage belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<DataVolumeCheckpoint>,
    pub paused_at: DateTime<Utc>,
}

impl ResumePoint {
    pub fn new(phase: ProcessingPhase, image: Option<Url>) -> Self {
        Self {
            phase,
            image,
            checkpoint: None,
            paused_at: Utc::now(),
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: DataVolumeCheckpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn save(&self, path: &Path) -> ImportResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(
            path = %path.display(),
            phase = %self.phase,
            "Saved resume point"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> ImportResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ImportError::Config(format!("failed to read resume point {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chain(pairs: &[(&str, &str)], final_checkpoint: bool) -> CheckpointChain {
        CheckpointChain {
            checkpoints: pairs
                .iter()
                .map(|(previous, current)| DataVolumeCheckpoint {
                    previous: previous.to_string(),
                    current: current.to_string(),
                })
                .collect(),
            final_checkpoint,
        }
    }

    #[test]
    fn test_parse_camel_case_json() {
        let json = r#"{
            "checkpoints": [
                {"previous": "", "current": "snap1"},
                {"previous": "snap1", "current": "snap2"}
            ],
            "finalCheckpoint": true
        }"#;
        let chain = CheckpointChain::from_json(json).unwrap();
        assert_eq!(chain.checkpoints.len(), 2);
        assert!(chain.checkpoints[0].is_base());
        assert!(chain.is_final("snap2"));
        assert!(!chain.is_final("snap1"));
    }

    #[test]
    fn test_validate_rejects_gaps_and_duplicates() {
        let gap = chain(&[("", "a"), ("x", "b")], false);
        assert!(matches!(gap.validate(), Err(ImportError::Config(_))));

        let dup = chain(&[("", "a"), ("a", "a")], false);
        assert!(matches!(dup.validate(), Err(ImportError::Config(_))));

        let empty_id = chain(&[("", "")], false);
        assert!(empty_id.validate().is_err());
    }

    #[test]
    fn test_next_unmerged_walks_the_chain() {
        let chain = chain(&[("", "a"), ("a", "b"), ("b", "c")], false);
        assert_eq!(chain.next_unmerged(None).unwrap().current, "a");
        assert_eq!(chain.next_unmerged(Some("a")).unwrap().current, "b");
        assert_eq!(chain.next_unmerged(Some("b")).unwrap().current, "c");
        assert!(chain.next_unmerged(Some("c")).is_none());
        assert_eq!(chain.position("c"), Some(2));
    }

    #[test]
    fn test_open_chain_is_never_final() {
        let chain = chain(&[("", "a")], false);
        assert!(!chain.is_final("a"));
    }

    #[test]
    fn test_resume_point_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resume.json");
        let image = Url::parse("file:///scratch/tmpimage").unwrap();

        let point = ResumePoint::new(ProcessingPhase::CONVERT, Some(image)).with_checkpoint(
            DataVolumeCheckpoint {
                previous: String::new(),
                current: "snap1".into(),
            },
        );
        point.save(&path).unwrap();

        let loaded = ResumePoint::load(&path).unwrap();
        assert_eq!(loaded, point);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"pausedAt\""));
    }

    #[test]
    fn test_resume_point_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = ResumePoint::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ImportError::Config(_)));
    }
}
