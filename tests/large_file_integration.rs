use std::io::{Read, Seek, SeekFrom, Write};

use tempfile::NamedTempFile;
use windelta::io::{decode_file, inspect_reader};
use windelta::stream::DecoderOptions;
use windelta::window::BuilderKind;

#[test]
#[ignore = "multi-GB test is opt-in due runtime and disk requirements"]
fn multi_gb_sparse_file_roundtrip() {
    const LEN: u64 = 2 * 1024 * 1024 * 1024;

    let mut input = NamedTempFile::new().unwrap();
    let output = NamedTempFile::new().unwrap();

    input.as_file_mut().set_len(LEN).unwrap();
    for (off, marker) in [(64 * 1024, &b"first-block"[..]), (LEN / 2, &b"middle-chunk"[..])] {
        input.as_file_mut().seek(SeekFrom::Start(off)).unwrap();
        input.as_file_mut().write_all(marker).unwrap();
    }

    let stats = decode_file(
        input.path(),
        output.path(),
        None,
        DecoderOptions::default().with_capacity(1024 * 1024),
        0,
    )
    .unwrap();
    assert_eq!(stats.output_size, LEN);
    assert_eq!(stats.windows, LEN / (1024 * 1024));

    let mut out_f = std::fs::File::open(output.path()).unwrap();
    let mut in_f = std::fs::File::open(input.path()).unwrap();
    for off in [0u64, 64 * 1024, LEN / 2, LEN - 32] {
        out_f.seek(SeekFrom::Start(off)).unwrap();
        in_f.seek(SeekFrom::Start(off)).unwrap();
        let mut ob = [0u8; 32];
        let mut ib = [0u8; 32];
        out_f.read_exact(&mut ob).unwrap();
        in_f.read_exact(&mut ib).unwrap();
        assert_eq!(ob, ib, "mismatch at offset {off}");
    }
}

#[test]
fn zero_filled_file_collapses_to_runs() {
    let mut input = NamedTempFile::new().unwrap();
    input.as_file_mut().set_len(1024 * 1024).unwrap();

    let options = DecoderOptions::default()
        .with_capacity(64 * 1024)
        .with_builder(BuilderKind::RunLength { min_run: 8 });
    let file = std::fs::File::open(input.path()).unwrap();
    let (summaries, stats) = inspect_reader(file, options, 10_000).unwrap();

    assert_eq!(stats.windows_delivered, 16);
    assert!(summaries.iter().all(|s| s.instructions.len() == 1));
    assert!(summaries.iter().all(|s| s.target_len == 64 * 1024));
}

#[test]
fn edge_case_matrix() {
    let cases: &[(&[u8], usize, u64)] = &[
        (b"", 1, 0),
        (b"x", 1, 1),
        (b"xy", 1, 2),
        (b"\0\0\0\0\0", 5, 1),
        (b"\0\0\0\0\0\x01", 5, 2),
    ];

    for &(data, capacity, windows) in cases {
        let mut input = NamedTempFile::new().unwrap();
        input.write_all(data).unwrap();
        let output = NamedTempFile::new().unwrap();

        let stats = decode_file(
            input.path(),
            output.path(),
            None,
            DecoderOptions::default().with_capacity(capacity),
            0,
        )
        .unwrap();
        assert_eq!(stats.windows, windows, "input {data:?}");
        assert_eq!(std::fs::read(output.path()).unwrap(), data);
    }
}
