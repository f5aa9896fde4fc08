use std::path::Path;
use std::sync::Arc;

use url::Url;
use volimport_shared::errors::{ImportError, ImportResult};

use super::DataProvider;
use crate::image::ImageOperations;
use crate::processor::ProcessingPhase;
use crate::quantity::Quantity;

/// Creates an empty raw image instead of importing anything.
pub struct BlankDataProvider {
    ops: Arc<dyn ImageOperations>,
    size: Quantity,
}

impl BlankDataProvider {
    pub fn new(ops: Arc<dyn ImageOperations>, size: Quantity) -> Self {
        Self { ops, size }
    }
}

impl DataProvider for BlankDataProvider {
    fn info(&mut self) -> ImportResult<ProcessingPhase> {
        Ok(ProcessingPhase::TRANSFER_DATA_FILE)
    }

    fn transfer(&mut self, _path: &Path, _preallocate: bool) -> ImportResult<ProcessingPhase> {
        Err(ImportError::Provider(
            "blank images are created in place, not transferred".into(),
        ))
    }

    fn transfer_file(&mut self, file: &Path, preallocate: bool) -> ImportResult<ProcessingPhase> {
        self.ops.create_blank_image(file, self.size, preallocate)?;
        tracing::info!(
            dest = %file.display(),
            size = self.size.bytes(),
            preallocate,
            "Created blank image"
        );
        Ok(ProcessingPhase::RESIZE)
    }

    fn url(&self) -> Option<&Url> {
        None
    }

    fn close(&mut self) -> ImportResult<()> {
        Ok(())
    }
}
