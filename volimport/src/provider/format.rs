//! Source format detection from magic bytes.

use serde::{Deserialize, Serialize};

/// Bytes read from the start of a stream to detect its format.
///
/// Large enough to cover the tar `ustar` magic at offset 257.
pub(crate) const HEADER_LEN: usize = 512;

const QCOW2_MAGIC: u32 = 0x514649fb; // "QFI\xfb"
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const XZ_MAGIC: [u8; 6] = [0xfd, b'7', b'z', b'X', b'Z', 0x00];
const VMDK_MAGIC: &[u8] = b"KDMV";
const VHDX_MAGIC: &[u8] = b"vhdxfile";
const VPC_MAGIC: &[u8] = b"conectix";
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";

/// What the imported bytes are meant to become.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// A virtual machine disk image.
    #[default]
    Kubevirt,
    /// A tar archive unpacked into the data directory.
    Archive,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Kubevirt => "kubevirt",
            ContentType::Archive => "archive",
        }
    }
}

/// Format of a source stream as recognized from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Raw,
    Qcow2,
    Vmdk,
    Vhdx,
    Vpc,
    Gzip,
    Xz,
    Tar,
}

impl SourceFormat {
    /// Detect the format from the first bytes of a stream.
    ///
    /// Anything unrecognized is treated as a raw disk image.
    pub fn detect(header: &[u8]) -> Self {
        if header.len() >= 4 && u32::from_be_bytes([header[0], header[1], header[2], header[3]]) == QCOW2_MAGIC {
            SourceFormat::Qcow2
        } else if header.starts_with(&GZIP_MAGIC) {
            SourceFormat::Gzip
        } else if header.starts_with(&XZ_MAGIC) {
            SourceFormat::Xz
        } else if header.starts_with(VMDK_MAGIC) {
            SourceFormat::Vmdk
        } else if header.starts_with(VHDX_MAGIC) {
            SourceFormat::Vhdx
        } else if header.starts_with(VPC_MAGIC) {
            SourceFormat::Vpc
        } else if header
            .get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len())
            .is_some_and(|m| m == TAR_MAGIC)
        {
            SourceFormat::Tar
        } else {
            SourceFormat::Raw
        }
    }

    /// Whether the image must go through scratch space and conversion.
    pub fn needs_conversion(&self) -> bool {
        matches!(
            self,
            SourceFormat::Qcow2 | SourceFormat::Vmdk | SourceFormat::Vhdx | SourceFormat::Vpc
        )
    }

    /// Whether the stream is a compression wrapper around another format.
    pub fn is_compressed(&self) -> bool {
        matches!(self, SourceFormat::Gzip | SourceFormat::Xz)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Raw => "raw",
            SourceFormat::Qcow2 => "qcow2",
            SourceFormat::Vmdk => "vmdk",
            SourceFormat::Vhdx => "vhdx",
            SourceFormat::Vpc => "vpc",
            SourceFormat::Gzip => "gzip",
            SourceFormat::Xz => "xz",
            SourceFormat::Tar => "tar",
        }
    }
}
