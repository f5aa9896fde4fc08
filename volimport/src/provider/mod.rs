//! Data providers.
//!
//! A provider is the source-specific half of an import: it inspects the
//! source and streams its payload, while the processor decides what happens
//! around it. The processor depends only on these traits:
//! - `DataProvider` - inspect, transfer, report the intermediate image
//! - `ResumableDataProvider` - additionally names the phase to resume into
//!
//! Providers shipped here:
//! - `StreamDataProvider` / `ResumableStreamDataProvider` - local files and uploads
//! - `BlankDataProvider` - empty images
//! - `DeltaChainProvider` - exported checkpoint deltas on local disk

mod blank;
mod delta;
mod format;
mod stream;

use std::path::Path;

use url::Url;
use volimport_shared::errors::{ImportError, ImportResult};

use crate::processor::ProcessingPhase;
use crate::space::{HostSpaceProbe, SpaceProbe};
use crate::termination::TerminationMessage;

pub use blank::BlankDataProvider;
pub use delta::DeltaChainProvider;
pub use format::{ContentType, SourceFormat};
pub use stream::{ResumableStreamDataProvider, StreamDataProvider};

/// Capability surface every data source exposes to the processor.
///
/// Each method returns the next phase on success. A provider never returns
/// [`ProcessingPhase::ERROR`] as a success value; failures are `Err`.
pub trait DataProvider {
    /// Inspect the source without transferring payload.
    fn info(&mut self) -> ImportResult<ProcessingPhase>;

    /// Stream the payload into the directory `path`.
    fn transfer(&mut self, path: &Path, preallocate: bool) -> ImportResult<ProcessingPhase>;

    /// Stream the payload directly into `file`.
    fn transfer_file(&mut self, file: &Path, preallocate: bool) -> ImportResult<ProcessingPhase>;

    /// Location of the (possibly intermediate) image for later phases.
    fn url(&self) -> Option<&Url>;

    /// Structured result to surface to the caller.
    fn termination_message(&self) -> Option<TerminationMessage> {
        None
    }

    /// Release readers and handles. Idempotent.
    fn close(&mut self) -> ImportResult<()>;
}

/// A provider that can pause after a transfer and resume in a later process.
pub trait ResumableDataProvider: DataProvider {
    /// Phase to start from when the run resumes.
    fn resume_phase(&self) -> ProcessingPhase;
}

/// A transfer target directory must exist and have room for writes.
pub(crate) fn check_transfer_dir(path: &Path) -> ImportResult<()> {
    if !path.is_dir() {
        return Err(ImportError::InvalidPath(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    match HostSpaceProbe.filesystem_available(path) {
        Ok(0) => Err(ImportError::InvalidPath(format!(
            "no space available in {}",
            path.display()
        ))),
        Ok(_) => Ok(()),
        Err(e) => Err(ImportError::InvalidPath(format!(
            "unable to measure {}: {e}",
            path.display()
        ))),
    }
}

impl<P: DataProvider + ?Sized> DataProvider for Box<P> {
    fn info(&mut self) -> ImportResult<ProcessingPhase> {
        (**self).info()
    }

    fn transfer(&mut self, path: &Path, preallocate: bool) -> ImportResult<ProcessingPhase> {
        (**self).transfer(path, preallocate)
    }

    fn transfer_file(&mut self, file: &Path, preallocate: bool) -> ImportResult<ProcessingPhase> {
        (**self).transfer_file(file, preallocate)
    }

    fn url(&self) -> Option<&Url> {
        (**self).url()
    }

    fn termination_message(&self) -> Option<TerminationMessage> {
        (**self).termination_message()
    }

    fn close(&mut self) -> ImportResult<()> {
        (**self).close()
    }
}

impl<P: ResumableDataProvider + ?Sized> ResumableDataProvider for Box<P> {
    fn resume_phase(&self) -> ProcessingPhase {
        (**self).resume_phase()
    }
}
