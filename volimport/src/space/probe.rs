//! Measuring physical space on the host.

use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

/// Source of physical space measurements.
///
/// Injected into the processor so tests can report arbitrary capacities
/// without real block devices.
pub trait SpaceProbe {
    /// Capacity of `path` when it is a block device, `None` otherwise.
    fn block_device_size(&self, path: &Path) -> io::Result<Option<u64>>;

    /// Bytes available to unprivileged writers on the filesystem holding `dir`.
    fn filesystem_available(&self, dir: &Path) -> io::Result<u64>;
}

/// Probe backed by the host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostSpaceProbe;

impl SpaceProbe for HostSpaceProbe {
    fn block_device_size(&self, path: &Path) -> io::Result<Option<u64>> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if !metadata.file_type().is_block_device() {
            return Ok(None);
        }

        // Block devices report a zero length in metadata; seeking to the end
        // yields the device capacity.
        let mut device = File::open(path)?;
        let size = device.seek(SeekFrom::End(0))?;
        tracing::debug!(device = %path.display(), size, "Measured block device");
        Ok(Some(size))
    }

    fn filesystem_available(&self, dir: &Path) -> io::Result<u64> {
        let stat = nix::sys::statvfs::statvfs(dir).map_err(io::Error::from)?;
        let available = (stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64);
        tracing::debug!(dir = %dir.display(), available, "Measured filesystem");
        Ok(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_regular_file_is_not_block_device() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("disk.img");
        std::fs::write(&file, b"data").unwrap();

        assert_eq!(HostSpaceProbe.block_device_size(&file).unwrap(), None);
        assert_eq!(HostSpaceProbe.block_device_size(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_missing_path_is_not_block_device() {
        let result = HostSpaceProbe.block_device_size(Path::new("/nonexistent/volimport/disk"));
        assert_eq!(result.unwrap(), None);
    }

    #[test]
    fn test_filesystem_available_for_tempdir() {
        let dir = TempDir::new().unwrap();
        assert!(HostSpaceProbe.filesystem_available(dir.path()).is_ok());
    }

    #[test]
    fn test_filesystem_available_missing_dir_fails() {
        let result = HostSpaceProbe.filesystem_available(Path::new("/nonexistent/volimport"));
        assert!(result.is_err());
    }
}
