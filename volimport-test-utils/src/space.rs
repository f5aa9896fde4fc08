use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use volimport::space::SpaceProbe;

/// Space probe reporting fixed capacities.
///
/// Clones share the recorded probe history, so a test can keep one clone
/// and hand the other to the processor.
#[derive(Debug, Clone, Default)]
pub struct FakeSpaceProbe {
    block_size: Option<u64>,
    filesystem_available: Option<u64>,
    block_probes: Arc<Mutex<Vec<PathBuf>>>,
    filesystem_probes: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeSpaceProbe {
    /// Destination on a filesystem with `available` free bytes.
    pub fn filesystem(available: u64) -> Self {
        Self {
            filesystem_available: Some(available),
            ..Default::default()
        }
    }

    /// Destination is a block device of `size` bytes.
    pub fn block_device(size: u64) -> Self {
        Self {
            block_size: Some(size),
            ..Default::default()
        }
    }

    /// Every measurement fails.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn block_probes(&self) -> Vec<PathBuf> {
        self.block_probes.lock().clone()
    }

    pub fn filesystem_probes(&self) -> Vec<PathBuf> {
        self.filesystem_probes.lock().clone()
    }
}

impl SpaceProbe for FakeSpaceProbe {
    fn block_device_size(&self, path: &Path) -> io::Result<Option<u64>> {
        self.block_probes.lock().push(path.to_path_buf());
        match (self.block_size, self.filesystem_available) {
            (Some(size), _) => Ok(Some(size)),
            (None, Some(_)) => Ok(None),
            (None, None) => Err(io::Error::other("fake block probe failure")),
        }
    }

    fn filesystem_available(&self, dir: &Path) -> io::Result<u64> {
        self.filesystem_probes.lock().push(dir.to_path_buf());
        self.filesystem_available
            .ok_or_else(|| io::Error::other("fake statvfs failure"))
    }
}
