//! Imports whose destination is a device node rather than a regular file.
//!
//! Creating device nodes needs privileges; unprivileged runs skip.

use std::io::Cursor;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::sync::Arc;

use nix::sys::stat::{Mode, SFlag, makedev, mknod};
use url::Url;
use volimport::{ContentType, DataProcessor, ImageOperations, ProcessingPhase, StreamDataProvider};
use volimport_test_utils::{FakeImageOperations, FakeSpaceProbe, ImportDirs, MockDataProvider, Op};

const GIB: u64 = 1 << 30;

fn make_device(path: &Path, kind: SFlag, major: u64, minor: u64) -> bool {
    mknod(path, kind, Mode::from_bits_truncate(0o600), makedev(major, minor)).is_ok()
}

fn file_type(path: &Path) -> std::fs::FileType {
    std::fs::symlink_metadata(path).unwrap().file_type()
}

#[test]
fn test_convert_into_block_device_keeps_node() {
    let dirs = ImportDirs::new();
    if !make_device(&dirs.dest, SFlag::S_IFBLK, 7, 201) {
        eprintln!("skipping: cannot create device nodes");
        return;
    }

    let url = Url::parse("file:///scratch/tmpimage").unwrap();
    let provider = MockDataProvider::new(ProcessingPhase::TRANSFER_SCRATCH, ProcessingPhase::CONVERT)
        .needing_scratch()
        .with_url(url);
    let fake = Arc::new(FakeImageOperations::default());
    let ops: Arc<dyn ImageOperations> = fake.clone();
    let mut dp = DataProcessor::with_probe(
        provider,
        &dirs.options("1Gi"),
        ops,
        Box::new(FakeSpaceProbe::block_device(GIB)),
    );

    dp.process_data().unwrap();

    assert_eq!(dp.current_phase(), &ProcessingPhase::COMPLETE);
    assert_eq!(fake.calls(), vec![Op::Validate, Op::Convert]);
    assert!(file_type(&dirs.dest).is_block_device());
}

#[test]
fn test_stream_into_device_keeps_node() {
    let dirs = ImportDirs::new();
    // Same numbers as /dev/null, so writes succeed without a real disk.
    if !make_device(&dirs.dest, SFlag::S_IFCHR, 1, 3) {
        eprintln!("skipping: cannot create device nodes");
        return;
    }

    let provider = StreamDataProvider::new(Cursor::new(vec![0x11u8; 8192]), ContentType::Kubevirt);
    let fake = Arc::new(FakeImageOperations::default());
    let ops: Arc<dyn ImageOperations> = fake.clone();
    let mut dp = DataProcessor::with_probe(
        provider,
        &dirs.options("1Gi"),
        ops,
        Box::new(FakeSpaceProbe::block_device(GIB)),
    );

    dp.process_data().unwrap();

    assert_eq!(dp.current_phase(), &ProcessingPhase::COMPLETE);
    assert!(fake.calls().is_empty());
    assert!(file_type(&dirs.dest).is_char_device());
}
