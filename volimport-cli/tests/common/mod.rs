#![allow(dead_code)]

use assert_cmd::Command;
use std::path::Path;
use std::time::Duration;

use volimport_test_utils::ImportDirs;

/// `volimport` with logging kept quiet so stderr only carries errors.
pub fn volimport() -> Command {
    let bin_path = env!("CARGO_BIN_EXE_volimport");
    let mut cmd = Command::new(bin_path);
    cmd.timeout(Duration::from_secs(60));
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("VOLIMPORT_LOG_DIR");
    cmd.args(["--log-level", "warn"]);
    cmd
}

/// `volimport` pointed at the data and scratch directories of `dirs`.
pub fn volimport_into(dirs: &ImportDirs, subcommand: &str) -> Command {
    let mut cmd = volimport();
    cmd.arg(subcommand)
        .arg("--data-dir")
        .arg(&dirs.data_dir)
        .arg("--dest")
        .arg(&dirs.dest);
    cmd
}

pub fn termination_log(dirs: &ImportDirs) -> std::path::PathBuf {
    dirs.root.path().join("termination-log")
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}
