//! Image format operations.
//!
//! The pipeline never runs the conversion tool directly; it goes through
//! [`ImageOperations`] so the orchestration can be exercised with fakes and
//! any tool with equivalent semantics can be substituted:
//! - `QemuImg` - implementation backed by the `qemu-img` binary
//! - `ImgInfo` - format metadata reported by `info`

mod qemu;

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;
use volimport_shared::errors::{ImportError, ImportResult};

use crate::quantity::Quantity;

pub use qemu::QemuImg;

/// Format metadata of an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImgInfo {
    /// Format name reported by the tool (e.g. "raw", "qcow2").
    pub format: String,
    /// Backing file of a delta image, empty when there is none.
    #[serde(rename = "backing-filename", default)]
    pub backing_file: String,
    /// Size of the disk as seen by the guest.
    #[serde(rename = "virtual-size")]
    pub virtual_size: u64,
    /// Bytes allocated on the host.
    #[serde(rename = "actual-size", default)]
    pub actual_size: u64,
}

/// Format inspection and mutation of disk images.
pub trait ImageOperations: Send + Sync {
    /// Probe format, sizes and backing file.
    fn info(&self, url: &Url) -> ImportResult<ImgInfo>;

    /// Convert any supported format at `url` into a raw image at `dest`.
    ///
    /// `format` pins the source format instead of letting the tool detect it.
    fn convert_to_raw_stream(
        &self,
        url: &Url,
        dest: &Path,
        preallocate: bool,
        format: Option<&str>,
    ) -> ImportResult<()>;

    /// Check that the image at `url` will fit in `available` bytes once converted.
    fn validate(&self, url: &Url, available: u64) -> ImportResult<()>;

    /// Grow the raw image at `dest` to `size`. Never shrinks.
    fn resize(&self, dest: &Path, size: Quantity, preallocate: bool) -> ImportResult<()>;

    /// Create an empty raw image of `size` at `dest`.
    fn create_blank_image(&self, dest: &Path, size: Quantity, preallocate: bool)
    -> ImportResult<()>;

    /// Point the delta image at `delta` to a new backing file.
    fn rebase(&self, backing_file: &Path, delta: &Url) -> ImportResult<()>;

    /// Flatten the delta image into its backing file.
    fn commit(&self, image: &Url) -> ImportResult<()>;
}

/// Build a `file://` URL for a local path, relative paths included.
pub fn path_url(path: &Path) -> ImportResult<Url> {
    let absolute = std::path::absolute(path)?;
    Url::from_file_path(&absolute)
        .map_err(|_| ImportError::InvalidPath(format!("{} is not a valid file path", path.display())))
}

/// Argument handed to the image tool: plain path for `file://`, the URL otherwise.
pub(crate) fn tool_arg(url: &Url) -> String {
    if url.scheme() == "file"
        && let Ok(path) = url.to_file_path()
    {
        return path.to_string_lossy().into_owned();
    }
    url.as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_img_info_from_tool_json() {
        let json = r#"{
            "virtual-size": 10737418240,
            "filename": "disk.qcow2",
            "cluster-size": 65536,
            "format": "qcow2",
            "actual-size": 200704,
            "backing-filename": "/data/base.img",
            "dirty-flag": false
        }"#;
        let info: ImgInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.format, "qcow2");
        assert_eq!(info.virtual_size, 10 << 30);
        assert_eq!(info.actual_size, 200704);
        assert_eq!(info.backing_file, "/data/base.img");
    }

    #[test]
    fn test_img_info_without_backing_file() {
        let json = r#"{"virtual-size": 1024, "format": "raw"}"#;
        let info: ImgInfo = serde_json::from_str(json).unwrap();
        assert!(info.backing_file.is_empty());
        assert_eq!(info.actual_size, 0);
    }

    #[test]
    fn test_path_url_round_trips_through_tool_arg() {
        let url = path_url(Path::new("/var/lib/data/disk.img")).unwrap();
        assert_eq!(url.scheme(), "file");
        assert_eq!(tool_arg(&url), "/var/lib/data/disk.img");
    }

    #[test]
    fn test_relative_path_url_is_absolute() {
        let url = path_url(Path::new("dest")).unwrap();
        assert!(tool_arg(&url).ends_with("/dest"));
    }

    #[test]
    fn test_remote_url_passed_verbatim() {
        let url = Url::parse("https://images.example.com/cirros.qcow2").unwrap();
        assert_eq!(tool_arg(&url), "https://images.example.com/cirros.qcow2");
    }
}
