//! Processing phases.
//!
//! Phases form an open set: the built-in steps are named constants and
//! callers may mint additional tokens for custom executors.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A named step of the import pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessingPhase(Cow<'static, str>);

impl ProcessingPhase {
    /// Inspect the source without transferring payload.
    pub const INFO: Self = Self::from_static("Info");
    /// Transfer into scratch space ahead of conversion.
    pub const TRANSFER_SCRATCH: Self = Self::from_static("TransferScratch");
    /// Transfer into the data directory.
    pub const TRANSFER_DATA_DIR: Self = Self::from_static("TransferDataDir");
    /// Transfer straight into the destination file.
    pub const TRANSFER_DATA_FILE: Self = Self::from_static("TransferDataFile");
    /// Validate the transferred image, then pause.
    pub const VALIDATE_PAUSE: Self = Self::from_static("ValidatePause");
    /// Convert the transferred image to raw.
    pub const CONVERT: Self = Self::from_static("Convert");
    /// Grow the image to the requested size.
    pub const RESIZE: Self = Self::from_static("Resize");
    /// Collapse one delta of a checkpoint chain into the base image.
    pub const MERGE_DELTA: Self = Self::from_static("MergeDelta");
    /// Processing stopped at a safe point; resume later.
    pub const PAUSE: Self = Self::from_static("Pause");
    /// Import finished successfully.
    pub const COMPLETE: Self = Self::from_static("Complete");
    /// Import failed.
    pub const ERROR: Self = Self::from_static("Error");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Create a custom phase token.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the run loop stops on this phase.
    pub fn is_terminal(&self) -> bool {
        *self == Self::COMPLETE || *self == Self::PAUSE || *self == Self::ERROR
    }
}

impl fmt::Display for ProcessingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ProcessingPhase {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for ProcessingPhase {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}
