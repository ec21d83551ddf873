use std::path::Path;

use direct_io_common::{probe_direct_io, IoMode};
use rand::RngCore;

use crate::config::RunnerConfig;

/// Direct I/O where the filesystem supports it, cached otherwise, so the
/// same tests run on tmpfs and on real disks.
pub(crate) fn config_for(dir: &Path) -> RunnerConfig {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    let io_mode = if probe_direct_io(dir) {
        IoMode::Direct
    } else {
        IoMode::Cached
    };
    RunnerConfig::new(dir).unwrap().with_io_mode(io_mode)
}

pub(crate) fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

pub(crate) fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
