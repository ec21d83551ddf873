use std::{io::ErrorKind, sync::Arc};

use bytes::Bytes;

use super::*;
use crate::{
    align::HEADER_LEN,
    cipher::OVERHEAD,
    error::{AlignmentError, CryptoError, IoOp},
    partition::split_bytes,
    test_util::{config_for, dir_entries, random_bytes},
};

fn runner(dir: &std::path::Path, engine: EngineKind) -> Runner {
    Runner::new(config_for(dir).with_engine(engine)).unwrap()
}

#[test]
fn write_then_read_round_trip() {
    for engine in [EngineKind::Std, EngineKind::TokioSpawnBlocking] {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path(), engine);
        let key = Arc::new(Key::generate().unwrap());
        let data = Bytes::from(random_bytes(100 * 1024 + 3));
        let chunks = split_bytes(&data, 4).unwrap();

        let write = runner.write_phase(1, chunks.clone(), &key).unwrap();
        assert_eq!(write.outcomes.len(), 4);
        assert_eq!(write.failed().count(), 0);
        assert_eq!(write.bytes_written(), data.len() as u64);
        assert_eq!(write.files.len(), 4);
        for (i, outcome) in write.outcomes.iter().enumerate() {
            assert_eq!(outcome.worker.index, i);
            let written = outcome.result.as_ref().unwrap();
            let on_disk = std::fs::metadata(&written.path).unwrap().len() as usize;
            assert_eq!(on_disk, written.aligned_len);
            assert_eq!(on_disk % runner.config().block_size(), 0);
        }

        let read = runner.read_phase(&write.files, &key);
        assert_eq!(read.outcomes.len(), 4);
        assert_eq!(read.failed().count(), 0);
        for (outcome, chunk) in read.outcomes.iter().zip(&chunks) {
            let recovered = outcome.result.as_ref().unwrap();
            assert_eq!(recovered.plaintext, &chunk[..]);
            assert_eq!(recovered.ciphertext_len, chunk.len() + OVERHEAD);
            assert!(!recovered.truncated);
        }

        drop(write);
        assert!(dir_entries(dir.path()).is_empty(), "{engine:?}");
    }
}

#[test]
fn one_unwritable_worker_does_not_stop_the_phase() {
    for engine in [EngineKind::Std, EngineKind::TokioSpawnBlocking] {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path(), engine);
        let key = Arc::new(Key::generate().unwrap());
        let data = Bytes::from(random_bytes(64 * 1024));
        let chunks = split_bytes(&data, 4).unwrap();

        // a directory where worker 2 wants its file
        let blocked = WorkerId {
            run_id: 7,
            phase: Phase::Write,
            index: 2,
        };
        std::fs::create_dir(dir.path().join(blocked.file_name())).unwrap();

        let write = runner.write_phase(7, chunks.clone(), &key).unwrap();
        assert_eq!(write.outcomes.len(), 4);
        let failed: Vec<_> = write.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, blocked);
        assert!(matches!(failed[0].1, Error::Io { op: IoOp::Open, .. }));
        assert_eq!(write.files.len(), 3);
        assert_eq!(
            write.bytes_written(),
            (data.len() - chunks[2].len()) as u64
        );

        let read = runner.read_phase(&write.files, &key);
        assert_eq!(read.outcomes.len(), 3);
        assert_eq!(read.failed().count(), 0);
        let indices: Vec<_> = read.outcomes.iter().map(|o| o.worker.index).collect();
        assert_eq!(indices, vec![0, 1, 3]);
        for outcome in &read.outcomes {
            let recovered = outcome.result.as_ref().unwrap();
            assert_eq!(recovered.plaintext, &chunks[outcome.worker.index][..]);
        }

        drop(write);
        assert_eq!(dir_entries(dir.path()), vec![blocked.file_name()]);
    }
}

#[test]
fn fan_out_is_bounded_by_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Runner::new(config_for(dir.path()).with_worker_cap(2).unwrap()).unwrap();
    let key = Arc::new(Key::generate().unwrap());
    let data = Bytes::from(random_bytes(300));

    let err = runner
        .write_phase(1, split_bytes(&data, 3).unwrap(), &key)
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    let err = runner.write_phase(1, Vec::new(), &key).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(dir_entries(dir.path()).is_empty());

    let write = runner
        .write_phase(1, split_bytes(&data, 2).unwrap(), &key)
        .unwrap();
    assert_eq!(write.files.len(), 2);
}

#[test]
fn read_phase_over_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path(), EngineKind::Std);
    let key = Arc::new(Key::generate().unwrap());
    let read = runner.read_phase(&PhaseFiles::default(), &key);
    assert!(read.outcomes.is_empty());
}

fn worker_path(config: &RunnerConfig, index: usize) -> std::path::PathBuf {
    config.dir().join(
        WorkerId {
            run_id: 0,
            phase: Phase::Latency,
            index,
        }
        .file_name(),
    )
}

#[test]
fn tampered_file_fails_authentication() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let key = Key::generate().unwrap();
    let path = worker_path(&config, 0);
    write_one(&config, &path, &random_bytes(1000), &key).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[HEADER_LEN + 20] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();

    let err = read_one(&config, &path, &key).unwrap_err();
    assert!(matches!(err, Error::Crypto(CryptoError::Authentication)));
}

#[test]
fn truncated_file_is_reported_not_trusted() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let key = Key::generate().unwrap();
    let path = worker_path(&config, 0);
    let data = random_bytes(3 * config.block_size());
    let written = write_one(&config, &path, &data, &key).unwrap();
    assert!(written.aligned_len > config.block_size());

    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(config.block_size() as u64).unwrap();
    drop(file);

    let err = read_one(&config, &path, &key).unwrap_err();
    assert!(matches!(err, Error::Crypto(CryptoError::Authentication)));
}

#[test]
fn empty_file_has_no_header() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let path = worker_path(&config, 0);
    std::fs::write(&path, b"").unwrap();
    let err = read_one(&config, &path, &Key::generate().unwrap()).unwrap_err();
    assert!(matches!(
        err,
        Error::Alignment(AlignmentError::MissingHeader(0))
    ));
}

#[test]
fn file_ending_inside_the_header() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let path = worker_path(&config, 0);
    std::fs::write(&path, [1u8, 0, 0, 0, 0]).unwrap();
    let err = read_one(&config, &path, &Key::generate().unwrap()).unwrap_err();
    assert!(matches!(
        err,
        Error::Alignment(AlignmentError::MissingHeader(5))
    ));
}

#[test]
fn write_into_missing_dir_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let path = dir.path().join("missing").join("file.bin");
    let err = write_one(&config, &path, b"data", &Key::generate().unwrap()).unwrap_err();
    match err {
        Error::Io {
            op: IoOp::Open,
            source,
            ..
        } => assert_eq!(source.kind(), ErrorKind::NotFound),
        e => panic!("unexpected error {e}"),
    }
    assert!(dir_entries(dir.path()).is_empty());
}

#[test]
fn phase_files_remove_all_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let key = Key::generate().unwrap();
    let mut files = PhaseFiles::default();
    for index in 0..3 {
        let path = worker_path(&config, index);
        write_one(&config, &path, b"x", &key).unwrap();
        files.push(
            WorkerId {
                run_id: 0,
                phase: Phase::Latency,
                index,
            },
            path,
        );
    }
    assert_eq!(dir_entries(dir.path()).len(), 3);
    files.remove_all();
    assert!(files.is_empty());
    assert!(dir_entries(dir.path()).is_empty());
    files.remove_all();
}
