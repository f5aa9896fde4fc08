//! Configuration for an import run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use volimport_shared::constants::envs as const_envs;
use volimport_shared::constants::filenames::DISK_IMAGE;
use volimport_shared::constants::space::DEFAULT_FILESYSTEM_OVERHEAD;
use volimport_shared::errors::{ImportError, ImportResult};

use crate::quantity::Quantity;

// ============================================================================
// Import Options
// ============================================================================

/// Where an import writes and how the result is sized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    /// Destination data file or block device.
    ///
    /// Default: `{data_dir}/disk.img`
    #[serde(default)]
    pub dest: Option<PathBuf>,

    /// Directory on the destination volume. Archives unpack here.
    ///
    /// Default: current directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Intermediate storage for sources that need conversion.
    ///
    /// Default: none; such sources then fail with "scratch space required".
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Requested final size (e.g. "10Gi"). Empty keeps the source size.
    #[serde(default)]
    pub image_size: String,

    /// Fraction of the volume reserved for filesystem metadata, in 0..=1.
    ///
    /// Default: 0.055
    #[serde(default = "default_filesystem_overhead")]
    pub filesystem_overhead: f64,

    /// Fully allocate the destination instead of writing it sparse.
    #[serde(default)]
    pub preallocation: bool,

    /// Pin the source format for conversion instead of detecting it.
    #[serde(default)]
    pub source_format: Option<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_filesystem_overhead() -> f64 {
    DEFAULT_FILESYSTEM_OVERHEAD
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            dest: None,
            data_dir: default_data_dir(),
            scratch_dir: None,
            image_size: String::new(),
            filesystem_overhead: default_filesystem_overhead(),
            preallocation: false,
            source_format: None,
        }
    }
}

impl ImportOptions {
    /// Load options from a JSON file.
    pub fn from_file(path: &Path) -> ImportResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ImportError::Config(format!("failed to read config {}: {e}", path.display()))
        })?;
        let options: Self = serde_json::from_str(&json)?;
        Ok(options)
    }

    /// Override fields from `VOLIMPORT_*` environment variables that are set.
    pub fn apply_env(mut self) -> ImportResult<Self> {
        self.apply_vars(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> ImportResult<()> {
        if let Some(dest) = var(const_envs::DEST) {
            self.dest = Some(PathBuf::from(dest));
        }
        if let Some(dir) = var(const_envs::DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var(const_envs::SCRATCH_DIR) {
            self.scratch_dir = Some(PathBuf::from(dir));
        }
        if let Some(size) = var(const_envs::IMAGE_SIZE) {
            self.image_size = size;
        }
        if let Some(overhead) = var(const_envs::FILESYSTEM_OVERHEAD) {
            self.filesystem_overhead = overhead.trim().parse().map_err(|_| {
                ImportError::Config(format!(
                    "{} must be a number, got {overhead:?}",
                    const_envs::FILESYSTEM_OVERHEAD
                ))
            })?;
        }
        if let Some(preallocation) = var(const_envs::PREALLOCATION) {
            self.preallocation = matches!(preallocation.trim(), "true" | "1" | "yes");
        }
        Ok(())
    }

    /// Check option values before a run starts.
    pub fn validate(&self) -> ImportResult<()> {
        if !(0.0..=1.0).contains(&self.filesystem_overhead) {
            return Err(ImportError::Config(format!(
                "filesystem overhead must be between 0 and 1, got {}",
                self.filesystem_overhead
            )));
        }
        Quantity::parse_optional(&self.image_size)?;
        if self.data_dir.as_os_str().is_empty() {
            return Err(ImportError::Config("data directory must not be empty".into()));
        }
        Ok(())
    }

    /// Destination data file, defaulting to `disk.img` inside the data directory.
    pub fn dest_path(&self) -> PathBuf {
        self.dest
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DISK_IMAGE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_json() {
        let options: ImportOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ImportOptions::default());
        assert_eq!(options.filesystem_overhead, 0.055);
        assert_eq!(options.dest_path(), PathBuf::from("./disk.img"));
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"dest": "/dev/vdb", "dataDir": "/data", "imageSize": "10Gi", "preallocation": true}"#,
        )
        .unwrap();

        let options = ImportOptions::from_file(&path).unwrap();
        assert_eq!(options.dest_path(), PathBuf::from("/dev/vdb"));
        assert_eq!(options.image_size, "10Gi");
        assert!(options.preallocation);
        options.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (const_envs::SCRATCH_DIR, "/scratch"),
            (const_envs::FILESYSTEM_OVERHEAD, "0.1"),
            (const_envs::PREALLOCATION, "true"),
        ]);
        let mut options = ImportOptions::default();
        options
            .apply_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(options.scratch_dir, Some(PathBuf::from("/scratch")));
        assert_eq!(options.filesystem_overhead, 0.1);
        assert!(options.preallocation);
    }

    #[test]
    fn test_env_rejects_bad_overhead() {
        let mut options = ImportOptions::default();
        let err = options
            .apply_vars(|key| (key == const_envs::FILESYSTEM_OVERHEAD).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ImportError::Config(_)));
    }

    #[test]
    fn test_validate_overhead_range_and_size() {
        let options = ImportOptions {
            filesystem_overhead: 1.5,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = ImportOptions {
            image_size: "ten gigs".into(),
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(ImportError::InvalidSize { .. })));
    }
}
