use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use qcow2_rs::meta::Qcow2Header;
use tempfile::TempDir;
use volimport::ImportOptions;

const CLUSTER_BITS: usize = 16;
const REFCOUNT_ORDER: u8 = 4;
const BLOCK_SIZE: usize = 512;

/// Temp directory laid out like an import pod: `data/` holding the
/// destination volume and `scratch/` for intermediate images.
pub struct ImportDirs {
    pub root: TempDir,
    pub data_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub dest: PathBuf,
}

impl ImportDirs {
    pub fn new() -> Self {
        let root = TempDir::new().expect("create temp dir");
        let data_dir = root.path().join("data");
        let scratch_dir = root.path().join("scratch");
        std::fs::create_dir_all(&data_dir).expect("create data dir");
        std::fs::create_dir_all(&scratch_dir).expect("create scratch dir");
        let dest = data_dir.join("disk.img");
        Self {
            root,
            data_dir,
            scratch_dir,
            dest,
        }
    }

    /// Options pointing at these directories.
    pub fn options(&self, image_size: &str) -> ImportOptions {
        ImportOptions {
            dest: Some(self.dest.clone()),
            data_dir: self.data_dir.clone(),
            scratch_dir: Some(self.scratch_dir.clone()),
            image_size: image_size.to_string(),
            ..Default::default()
        }
    }
}

impl Default for ImportDirs {
    fn default() -> Self {
        Self::new()
    }
}

/// Write an empty qcow2 image with virtual size `size` to `path`.
pub fn write_qcow2_image(path: &Path, size: u64) {
    let (rc_table, rc_block, _l1_table) =
        Qcow2Header::calculate_meta_params(size, CLUSTER_BITS, REFCOUNT_ORDER, BLOCK_SIZE);
    let clusters = 1 + rc_table.1 + rc_block.1;
    let buffer_size = ((clusters as usize) << CLUSTER_BITS) + BLOCK_SIZE;

    let mut header_buf = vec![0u8; buffer_size];
    Qcow2Header::format_qcow2(&mut header_buf, size, CLUSTER_BITS, REFCOUNT_ORDER, BLOCK_SIZE)
        .expect("format qcow2 header");

    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .expect("create qcow2 file");
    file.write_all(&header_buf).expect("write qcow2 header");
}
