//! Shipped providers driven end to end by the processor.

use std::io::{Cursor, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;
use volimport::{
    BlankDataProvider, ContentType, DataProcessor, ImageOperations, ImgInfo, ProcessingPhase,
    Quantity, StreamDataProvider,
};
use volimport_test_utils::fixtures::write_qcow2_image;
use volimport_test_utils::{FakeImageOperations, FakeSpaceProbe, ImportDirs, Op};

const GIB: u64 = 1 << 30;

fn fake_ops(info: ImgInfo) -> (Arc<FakeImageOperations>, Arc<dyn ImageOperations>) {
    let fake = Arc::new(FakeImageOperations::new(info));
    let ops: Arc<dyn ImageOperations> = fake.clone();
    (fake, ops)
}

#[test]
fn test_raw_stream_lands_in_dest() {
    let dirs = ImportDirs::new();
    let data: Vec<u8> = (0..64 * 1024u32).map(|i| (i % 251) as u8).collect();
    let provider = StreamDataProvider::new(Cursor::new(data.clone()), ContentType::Kubevirt);
    let (fake, ops) = fake_ops(ImgInfo::default());

    let mut dp = DataProcessor::with_probe(
        provider,
        &dirs.options(""),
        ops,
        Box::new(FakeSpaceProbe::filesystem(10 * GIB)),
    );
    dp.process_data().unwrap();

    assert_eq!(std::fs::read(&dirs.dest).unwrap(), data);
    assert!(fake.calls().is_empty());
    let message = dp.termination_message();
    assert_eq!(message.labels.get("sourceFormat").map(String::as_str), Some("raw"));
}

#[test]
fn test_gzip_raw_stream_is_decompressed() {
    let dirs = ImportDirs::new();
    let data = vec![0x5au8; 100_000];
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(&data).unwrap();
    let compressed = encoder.finish().unwrap();

    let provider = StreamDataProvider::new(Cursor::new(compressed), ContentType::Kubevirt);
    let (_fake, ops) = fake_ops(ImgInfo::default());
    let mut dp = DataProcessor::with_probe(
        provider,
        &dirs.options(""),
        ops,
        Box::new(FakeSpaceProbe::filesystem(10 * GIB)),
    );
    dp.process_data().unwrap();

    assert_eq!(std::fs::read(&dirs.dest).unwrap(), data);
}

#[test]
fn test_qcow2_file_is_converted_via_scratch() {
    let dirs = ImportDirs::new();
    let source = dirs.root.path().join("cirros.qcow2");
    write_qcow2_image(&source, 64 << 20);

    let provider = StreamDataProvider::open(&source, ContentType::Kubevirt).unwrap();
    let (fake, ops) = fake_ops(ImgInfo::default());
    let mut dp = DataProcessor::with_probe(
        provider,
        &dirs.options(""),
        ops,
        Box::new(FakeSpaceProbe::filesystem(10 * GIB)),
    );
    dp.process_data().unwrap();

    assert_eq!(fake.calls(), vec![Op::Validate, Op::Convert]);
    assert_eq!(
        std::fs::read(dirs.scratch_dir.join("tmpimage")).unwrap(),
        std::fs::read(&source).unwrap()
    );
}

#[test]
fn test_qcow2_without_scratch_requires_scratch_space() {
    let dirs = ImportDirs::new();
    let source = dirs.root.path().join("cirros.qcow2");
    write_qcow2_image(&source, 64 << 20);

    let mut options = dirs.options("");
    options.scratch_dir = None;
    let provider = StreamDataProvider::open(&source, ContentType::Kubevirt).unwrap();
    let (_fake, ops) = fake_ops(ImgInfo::default());
    let mut dp = DataProcessor::with_probe(
        provider,
        &options,
        ops,
        Box::new(FakeSpaceProbe::filesystem(10 * GIB)),
    );

    let err = dp.process_data().unwrap_err();
    assert!(err.requires_scratch_space());
}

#[test]
fn test_archive_is_unpacked_into_data_dir() {
    let dirs = ImportDirs::new();
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    let content = b"kernel args";
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "boot/cmdline", &content[..]).unwrap();
    let archive = builder.into_inner().unwrap();

    let provider = StreamDataProvider::new(Cursor::new(archive), ContentType::Archive);
    let (fake, ops) = fake_ops(ImgInfo::default());
    let mut dp = DataProcessor::with_probe(
        provider,
        &dirs.options("1Gi"),
        ops,
        Box::new(FakeSpaceProbe::filesystem(10 * GIB)),
    );
    dp.process_data().unwrap();

    assert_eq!(
        std::fs::read(dirs.data_dir.join("boot/cmdline")).unwrap(),
        content
    );
    assert!(fake.calls().is_empty());
}

#[test]
fn test_blank_image_is_created_at_requested_size() {
    let dirs = ImportDirs::new();
    let (fake, ops) = fake_ops(ImgInfo::default());
    let provider = BlankDataProvider::new(ops.clone(), Quantity::from_bytes(GIB));

    let mut options = dirs.options("1Gi");
    options.filesystem_overhead = 0.0;
    let mut dp = DataProcessor::with_probe(
        provider,
        &options,
        ops,
        Box::new(FakeSpaceProbe::filesystem(10 * GIB)),
    );
    dp.process_data().unwrap();

    assert_eq!(dp.current_phase(), &ProcessingPhase::COMPLETE);
    assert_eq!(fake.calls(), vec![Op::CreateBlank, Op::Info, Op::Validate]);
    assert_eq!(std::fs::metadata(&dirs.dest).unwrap().len(), GIB);
}
