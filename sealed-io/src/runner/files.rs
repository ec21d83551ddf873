use std::path::{Path, PathBuf};

use tracing::warn;

use crate::runner::WorkerId;

/// The scratch files a write phase left on disk.
///
/// Dropping this removes them, so files never outlive the size bucket that
/// created them, whether it finished, failed or unwound.
#[derive(Debug, Default)]
pub struct PhaseFiles {
    files: Vec<(WorkerId, PathBuf)>,
}

impl PhaseFiles {
    pub(crate) fn push(&mut self, worker: WorkerId, path: PathBuf) {
        self.files.push((worker, path));
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WorkerId, &Path)> {
        self.files.iter().map(|(worker, path)| (*worker, path.as_path()))
    }

    pub fn remove_all(&mut self) {
        for (_, path) in self.files.drain(..) {
            remove_quietly(&path);
        }
    }
}

impl Drop for PhaseFiles {
    fn drop(&mut self) {
        self.remove_all();
    }
}

pub(crate) fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(?path, error = %e, "failed to remove scratch file"),
    }
}
