//! Constants shared between the import library and whatever drives it.

/// Space accounting constants.
pub mod space {
    /// Alignment for disk images. A multiple of all known hardware block
    /// sizes (512/4k/8k/32k/64k).
    pub const DEFAULT_ALIGN_BLOCK_SIZE: u64 = 1024 * 1024;

    /// Default filesystem overhead fraction (5.5%).
    pub const DEFAULT_FILESYSTEM_OVERHEAD: f64 = 0.055;
}

/// File names used inside scratch and data directories.
pub mod filenames {
    /// Image written into scratch space before conversion.
    pub const SCRATCH_IMAGE: &str = "tmpimage";

    /// Default name of the final image inside the data directory.
    pub const DISK_IMAGE: &str = "disk.img";
}

/// Image formats accepted as conversion sources.
pub mod formats {
    pub const RAW: &str = "raw";
    pub const QCOW2: &str = "qcow2";

    /// Formats the image tool is allowed to convert from.
    pub const SUPPORTED: &[&str] = &["raw", "qcow2", "vmdk", "vdi", "vpc", "vhdx"];
}

/// Environment variables read by the import options.
pub mod envs {
    /// Destination image path (file or block device).
    pub const DEST: &str = "VOLIMPORT_DEST";

    /// Data directory holding the destination image.
    pub const DATA_DIR: &str = "VOLIMPORT_DATA_DIR";

    /// Scratch directory for intermediate images.
    pub const SCRATCH_DIR: &str = "VOLIMPORT_SCRATCH_DIR";

    /// Requested final image size (e.g. "10Gi").
    pub const IMAGE_SIZE: &str = "VOLIMPORT_IMAGE_SIZE";

    /// Filesystem overhead fraction between 0 and 1.
    pub const FILESYSTEM_OVERHEAD: &str = "VOLIMPORT_FILESYSTEM_OVERHEAD";

    /// "true" to preallocate the destination image.
    pub const PREALLOCATION: &str = "VOLIMPORT_PREALLOCATION";

    /// Path to the qemu-img binary.
    pub const QEMU_IMG: &str = "VOLIMPORT_QEMU_IMG";

    /// Directory for log files.
    pub const LOG_DIR: &str = "VOLIMPORT_LOG_DIR";
}

/// Termination message file written when an import finishes.
pub mod termination {
    /// Default location, matching the pod termination log.
    pub const DEFAULT_PATH: &str = "/dev/termination-log";
}
