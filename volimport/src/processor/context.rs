//! State shared by phase executors.

use std::path::PathBuf;
use std::sync::Arc;

use url::Url;
use volimport_shared::errors::ImportResult;

use crate::image::ImageOperations;
use crate::quantity::Quantity;
use crate::space::{self, SpaceProbe};

/// Everything a phase executor may read or change during a run.
///
/// Executors receive it explicitly instead of closing over the processor.
pub struct ImportContext<P> {
    /// The data source.
    pub provider: P,
    pub ops: Arc<dyn ImageOperations>,
    pub(crate) probe: Box<dyn SpaceProbe>,
    /// Destination data file or block device.
    pub data_file: PathBuf,
    pub data_dir: PathBuf,
    /// Empty when no scratch space is configured.
    pub scratch_dir: PathBuf,
    /// Requested final size as given, parsed when needed.
    pub requested_size: String,
    pub filesystem_overhead: f64,
    pub preallocation: bool,
    pub preallocation_applied: bool,
    /// Source format to pin during conversion.
    pub source_format: Option<String>,
    /// Space the import may fill, measured when the processor was built.
    pub available_space: Option<u64>,
}

impl<P> ImportContext<P> {
    /// Measure the space the destination can hold.
    ///
    /// Block devices report their capacity. Otherwise the free space of the
    /// data directory is capped at the requested size. Measurement failures
    /// are logged and yield `None`.
    pub fn calculate_target_size(&self) -> Option<u64> {
        match self.probe.block_device_size(&self.data_file) {
            Ok(Some(size)) => return Some(size),
            Ok(None) => {}
            Err(e) => tracing::error!(
                dest = %self.data_file.display(),
                error = %e,
                "Unable to probe destination block device"
            ),
        }

        let available = match self.probe.filesystem_available(&self.data_dir) {
            Ok(available) => available,
            Err(e) => {
                tracing::error!(
                    data_dir = %self.data_dir.display(),
                    error = %e,
                    "Unable to measure available space"
                );
                return None;
            }
        };

        match Quantity::parse_optional(&self.requested_size) {
            Ok(Some(requested)) => Some(available.min(requested.bytes())),
            Ok(None) => Some(available),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unparsable requested size");
                Some(available)
            }
        }
    }

    /// Whether the destination is a block device.
    pub fn is_block_device(&self) -> bool {
        matches!(self.probe.block_device_size(&self.data_file), Ok(Some(_)))
    }

    /// Available space after reserving filesystem overhead.
    pub fn usable_space(&self) -> Option<u64> {
        self.available_space
            .map(|available| space::usable_space(self.filesystem_overhead, available))
    }

    /// Check that the image at `url` fits in the available space.
    pub fn validate(&self, url: &Url) -> ImportResult<()> {
        let available = match self.available_space {
            Some(available) => available,
            None => {
                tracing::warn!(
                    url = %url,
                    "Available space unknown, validating image without a size limit"
                );
                u64::MAX
            }
        };
        tracing::debug!(url = %url, available, "Validating image");
        self.ops.validate(url, available)
    }
}
