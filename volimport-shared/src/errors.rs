//! Error types for the import pipeline.
//!
//! Errors are categorized by how the caller reacts to them:
//! - [`ImportError::RequiresScratchSpace`]: retry with scratch storage provisioned
//! - [`ImportError::UnknownPhase`], [`ImportError::CycleDetected`]: wiring bugs, always fatal
//! - everything else: the import attempt failed and the caller decides whether to retry
//!
//! ```ignore
//! match processor.process_data() {
//!     Err(e) if e.requires_scratch_space() => { /* reschedule with scratch */ }
//!     Err(e) => { /* surface as the run's outcome */ }
//!     Ok(()) => {}
//! }
//! ```

use std::io;
use thiserror::Error;

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Errors that can occur while importing a disk image.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Destination or scratch path is unusable (missing, unwritable, no free space).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The source needs intermediate storage for conversion and none was configured.
    #[error("scratch space required and none found")]
    RequiresScratchSpace,

    /// Source content does not match the declared size or format expectations.
    #[error("validation: {0}")]
    Validation(String),

    /// The image tool failed to convert, resize, rebase or commit.
    #[error("conversion: {0}")]
    Conversion(String),

    /// A phase without a registered executor was reached.
    #[error("unknown processing phase {0}")]
    UnknownPhase(String),

    /// A phase was entered a second time in one run.
    #[error("loop detected on phase {0}")]
    CycleDetected(String),

    /// Streaming the payload from the source failed.
    #[error("transfer: {0}")]
    Transfer(String),

    /// The data provider misbehaved or could not inspect its source.
    #[error("provider: {0}")]
    Provider(String),

    /// A size string could not be parsed.
    #[error("invalid size {value:?}: {reason}")]
    InvalidSize { value: String, reason: String },

    /// Configuration or option validation error.
    #[error("config: {0}")]
    Config(String),

    /// A phase executor failed; `context` names what the phase was doing.
    #[error("{context}: {source}")]
    Phase {
        context: &'static str,
        #[source]
        source: Box<ImportError>,
    },

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImportError {
    /// Wrap this error with the description of the phase that produced it.
    ///
    /// `RequiresScratchSpace` is never wrapped so callers can match on it directly.
    pub fn in_phase(self, context: &'static str) -> Self {
        match self {
            ImportError::RequiresScratchSpace => self,
            other => ImportError::Phase {
                context,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping phase context wrappers.
    pub fn root_cause(&self) -> &ImportError {
        let mut current = self;
        while let ImportError::Phase { source, .. } = current {
            current = source;
        }
        current
    }

    /// Whether the caller should retry with scratch space configured.
    pub fn requires_scratch_space(&self) -> bool {
        matches!(self.root_cause(), ImportError::RequiresScratchSpace)
    }
}
