//! Wrapper around the `qemu-img` command-line tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use url::Url;
use volimport_shared::constants::formats;
use volimport_shared::errors::{ImportError, ImportResult};

use super::{ImageOperations, ImgInfo, path_url, tool_arg};
use crate::quantity::Quantity;

/// Cache mode used for conversion writes unless overridden.
const DEFAULT_CACHE_MODE: &str = "writeback";

/// `qemu-img` backed image operations.
#[derive(Debug, Clone)]
pub struct QemuImg {
    binary: PathBuf,
    cache_mode: String,
}

impl QemuImg {
    /// Use `qemu-img` from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("qemu-img")
    }

    /// Use a specific `qemu-img` binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cache_mode: DEFAULT_CACHE_MODE.to_string(),
        }
    }

    /// Cache mode passed to `convert -t` (e.g. "none" for O_DIRECT targets).
    pub fn with_cache_mode(mut self, cache_mode: impl Into<String>) -> Self {
        self.cache_mode = cache_mode.into();
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Check if the binary runs at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn run(
        &self,
        args: Vec<OsString>,
        to_error: fn(String) -> ImportError,
    ) -> ImportResult<Output> {
        let subcommand = args
            .first()
            .map(|a| a.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::debug!(binary = %self.binary.display(), ?args, "Running qemu-img");

        let output = Command::new(&self.binary).args(&args).output().map_err(|e| {
            to_error(format!(
                "failed to run {} (is qemu-img installed?): {}",
                self.binary.display(),
                e
            ))
        })?;

        if !output.status.success() {
            return Err(to_error(format!(
                "qemu-img {} failed: {}",
                subcommand,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }
}

impl Default for QemuImg {
    fn default() -> Self {
        Self::new()
    }
}

fn preallocation_option(preallocate: bool) -> Option<&'static str> {
    preallocate.then_some("preallocation=falloc")
}

impl ImageOperations for QemuImg {
    fn info(&self, url: &Url) -> ImportResult<ImgInfo> {
        let output = self.run(
            vec!["info".into(), "--output=json".into(), tool_arg(url).into()],
            ImportError::Validation,
        )?;
        serde_json::from_slice(&output.stdout).map_err(|e| {
            ImportError::Validation(format!("could not parse image info for {}: {}", url, e))
        })
    }

    fn convert_to_raw_stream(
        &self,
        url: &Url,
        dest: &Path,
        preallocate: bool,
        format: Option<&str>,
    ) -> ImportResult<()> {
        tracing::info!(src = %url, dest = %dest.display(), preallocate, "Converting image to raw");

        let mut args: Vec<OsString> = vec![
            "convert".into(),
            "-t".into(),
            self.cache_mode.clone().into(),
            "-p".into(),
            "-O".into(),
            formats::RAW.into(),
        ];
        if let Some(format) = format {
            args.push("-f".into());
            args.push(format.into());
        }
        if let Some(option) = preallocation_option(preallocate) {
            args.push("-o".into());
            args.push(option.into());
        }
        args.push(tool_arg(url).into());
        args.push(dest.into());

        self.run(args, ImportError::Conversion)?;
        Ok(())
    }

    fn validate(&self, url: &Url, available: u64) -> ImportResult<()> {
        let info = self.info(url)?;

        if !formats::SUPPORTED.contains(&info.format.as_str()) {
            return Err(ImportError::Validation(format!(
                "image {} has unsupported format {:?}",
                url, info.format
            )));
        }

        if !info.backing_file.is_empty() && !Path::new(&info.backing_file).exists() {
            return Err(ImportError::Validation(format!(
                "image {} is invalid because it has invalid backing file {}",
                url, info.backing_file
            )));
        }

        if info.virtual_size > available {
            return Err(ImportError::Validation(format!(
                "virtual image size {} is larger than the reported available storage {}; \
                 a larger volume is required",
                info.virtual_size, available
            )));
        }

        Ok(())
    }

    fn resize(&self, dest: &Path, size: Quantity, preallocate: bool) -> ImportResult<()> {
        let info = self.info(&path_url(dest)?)?;
        if info.virtual_size > size.bytes() {
            return Err(ImportError::Conversion(format!(
                "refusing to shrink {} from {} to {} bytes",
                dest.display(),
                info.virtual_size,
                size
            )));
        }

        tracing::info!(dest = %dest.display(), size = size.bytes(), preallocate, "Resizing image");

        let mut args: Vec<OsString> = vec!["resize".into(), "-f".into(), formats::RAW.into()];
        if preallocate {
            args.push("--preallocation=falloc".into());
        }
        args.push(dest.into());
        args.push(size.to_string().into());

        self.run(args, ImportError::Conversion)?;
        Ok(())
    }

    fn create_blank_image(
        &self,
        dest: &Path,
        size: Quantity,
        preallocate: bool,
    ) -> ImportResult<()> {
        tracing::info!(dest = %dest.display(), size = size.bytes(), preallocate, "Creating blank image");

        let mut args: Vec<OsString> = vec!["create".into(), "-f".into(), formats::RAW.into()];
        if let Some(option) = preallocation_option(preallocate) {
            args.push("-o".into());
            args.push(option.into());
        }
        args.push(dest.into());
        args.push(size.to_string().into());

        self.run(args, ImportError::Conversion)?;
        Ok(())
    }

    fn rebase(&self, backing_file: &Path, delta: &Url) -> ImportResult<()> {
        tracing::info!(backing = %backing_file.display(), delta = %delta, "Rebasing delta image");

        self.run(
            vec![
                "rebase".into(),
                "-p".into(),
                "-u".into(),
                "-F".into(),
                formats::RAW.into(),
                "-b".into(),
                backing_file.into(),
                tool_arg(delta).into(),
            ],
            ImportError::Conversion,
        )?;
        Ok(())
    }

    fn commit(&self, image: &Url) -> ImportResult<()> {
        tracing::info!(image = %image, "Committing delta image into its backing file");

        self.run(
            vec!["commit".into(), "-p".into(), tool_arg(image).into()],
            ImportError::Conversion,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Writing an executable while another test forks can fail with ETXTBSY.
    static SCRIPT_LOCK: Mutex<()> = Mutex::new(());

    /// Fake qemu-img: `info` prints `info_json`, everything else appends its
    /// arguments to `calls.log`. Exits 1 with a message when `fail` is set.
    fn fake_qemu_img(dir: &TempDir, info_json: &str, fail: bool) -> (QemuImg, PathBuf) {
        let log = dir.path().join("calls.log");
        let script = dir.path().join("qemu-img");
        let body = if fail {
            "echo 'qemu-img: Could not open image' >&2\nexit 1\n".to_string()
        } else {
            format!(
                "case \"$1\" in\n  info) echo '{}' ;;\n  *) echo \"$@\" >> '{}' ;;\nesac\n",
                info_json,
                log.display()
            )
        };
        std::fs::write(&script, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (QemuImg::with_binary(&script), log)
    }

    fn calls(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    const QCOW2_INFO: &str = r#"{"format":"qcow2","virtual-size":1048576,"actual-size":4096}"#;

    #[test]
    fn test_info_parses_json() {
        let _guard = SCRIPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let (qemu, _) = fake_qemu_img(&dir, QCOW2_INFO, false);

        let info = qemu.info(&path_url(Path::new("/images/disk.qcow2")).unwrap()).unwrap();
        assert_eq!(info.format, "qcow2");
        assert_eq!(info.virtual_size, 1048576);
        assert_eq!(info.actual_size, 4096);
    }

    #[test]
    fn test_validate_checks_available_space() {
        let _guard = SCRIPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let (qemu, _) = fake_qemu_img(&dir, QCOW2_INFO, false);
        let url = path_url(Path::new("/images/disk.qcow2")).unwrap();

        assert!(qemu.validate(&url, 1048576).is_ok());
        let err = qemu.validate(&url, 1024).unwrap_err();
        assert!(matches!(err, ImportError::Validation(_)));
        assert!(err.to_string().contains("larger volume is required"));
    }

    #[test]
    fn test_validate_rejects_unsupported_format_and_missing_backing() {
        let _guard = SCRIPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let url = path_url(Path::new("/images/disk")).unwrap();

        let dir = TempDir::new().unwrap();
        let (qemu, _) = fake_qemu_img(&dir, r#"{"format":"iso","virtual-size":1}"#, false);
        let err = qemu.validate(&url, u64::MAX).unwrap_err();
        assert!(err.to_string().contains("unsupported format"));

        let dir = TempDir::new().unwrap();
        let (qemu, _) = fake_qemu_img(
            &dir,
            r#"{"format":"qcow2","virtual-size":1,"backing-filename":"/nonexistent/base.img"}"#,
            false,
        );
        let err = qemu.validate(&url, u64::MAX).unwrap_err();
        assert!(err.to_string().contains("invalid backing file"));
    }

    #[test]
    fn test_convert_passes_options() {
        let _guard = SCRIPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let (qemu, log) = fake_qemu_img(&dir, QCOW2_INFO, false);
        let qemu = qemu.with_cache_mode("none");
        let url = path_url(Path::new("/scratch/tmpimage")).unwrap();

        qemu.convert_to_raw_stream(&url, Path::new("/data/disk.img"), true, Some("qcow2"))
            .unwrap();

        assert_eq!(
            calls(&log),
            vec![
                "convert -t none -p -O raw -f qcow2 -o preallocation=falloc /scratch/tmpimage /data/disk.img"
            ]
        );
    }

    #[test]
    fn test_resize_refuses_to_shrink() {
        let _guard = SCRIPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let (qemu, log) = fake_qemu_img(&dir, QCOW2_INFO, false);

        let err = qemu
            .resize(Path::new("/data/disk.img"), Quantity::from_bytes(1024), false)
            .unwrap_err();
        assert!(matches!(err, ImportError::Conversion(_)));
        assert!(calls(&log).is_empty());

        qemu.resize(Path::new("/data/disk.img"), Quantity::from_bytes(2097152), false)
            .unwrap();
        assert_eq!(calls(&log), vec!["resize -f raw /data/disk.img 2097152"]);
    }

    #[test]
    fn test_blank_rebase_and_commit_arguments() {
        let _guard = SCRIPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let (qemu, log) = fake_qemu_img(&dir, QCOW2_INFO, false);
        let delta = path_url(Path::new("/scratch/delta.qcow2")).unwrap();

        qemu.create_blank_image(Path::new("/data/disk.img"), Quantity::from_bytes(4096), false)
            .unwrap();
        qemu.rebase(Path::new("/data/disk.img"), &delta).unwrap();
        qemu.commit(&delta).unwrap();

        assert_eq!(
            calls(&log),
            vec![
                "create -f raw /data/disk.img 4096",
                "rebase -p -u -F raw -b /data/disk.img /scratch/delta.qcow2",
                "commit -p /scratch/delta.qcow2",
            ]
        );
    }

    #[test]
    fn test_tool_failure_carries_stderr() {
        let _guard = SCRIPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let (qemu, _) = fake_qemu_img(&dir, "", true);
        let url = path_url(Path::new("/scratch/delta.qcow2")).unwrap();

        let err = qemu.commit(&url).unwrap_err();
        assert!(matches!(err, ImportError::Conversion(_)));
        assert!(err.to_string().contains("Could not open image"));

        let err = qemu.info(&url).unwrap_err();
        assert!(matches!(err, ImportError::Validation(_)));
    }

    #[test]
    fn test_missing_binary() {
        let qemu = QemuImg::with_binary("/nonexistent/qemu-img");
        assert!(!qemu.is_available());
        let err = qemu
            .commit(&path_url(Path::new("/scratch/delta.qcow2")).unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("is qemu-img installed?"));
    }
}
