//! Pause after transfer, then finish in a second invocation.
//!
//! Kept in its own test binary: it execs a freshly written script, which can
//! fail with ETXTBSY if another test thread forks while the file is open.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use predicates::prelude::*;
use volimport_test_utils::ImportDirs;

mod common;

/// qemu-img stand-in that reports a small raw image for `info`.
fn fake_qemu_img(dir: &Path) -> PathBuf {
    let script = dir.join("qemu-img");
    std::fs::write(
        &script,
        "#!/bin/sh\ncase \"$1\" in\n  info) echo '{\"format\":\"raw\",\"virtual-size\":8192}' ;;\nesac\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[test]
fn test_resumable_import_pauses_then_resumes() {
    let dirs = ImportDirs::new();
    let qemu_img = fake_qemu_img(dirs.root.path());
    let source = dirs.root.path().join("disk.raw");
    std::fs::write(&source, vec![3u8; 8192]).unwrap();
    let resume_file = dirs.root.path().join("resume.json");
    let log = common::termination_log(&dirs);

    common::volimport_into(&dirs, "import")
        .arg("--qemu-img")
        .arg(&qemu_img)
        .arg("--source")
        .arg(&source)
        .arg("--resumable")
        .arg("--resume-file")
        .arg(&resume_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("paused before Resize"));

    assert_eq!(std::fs::read(&dirs.dest).unwrap(), vec![3u8; 8192]);
    assert!(common::read(&resume_file).contains(r#""phase": "Resize""#));

    common::volimport_into(&dirs, "resume")
        .arg("--qemu-img")
        .arg(&qemu_img)
        .arg("--resume-file")
        .arg(&resume_file)
        .arg("--termination-log")
        .arg(&log)
        .assert()
        .success();

    assert!(!resume_file.exists());
    assert_eq!(std::fs::read(&dirs.dest).unwrap(), vec![3u8; 8192]);
}
