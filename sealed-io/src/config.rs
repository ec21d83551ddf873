use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use direct_io_common::IoMode;

use crate::{
    error::{AlignmentError, Error, IoOp, Result},
    runner::EngineKind,
};

/// Upper bound on concurrent workers per phase unless overridden.
pub const DEFAULT_WORKER_CAP: usize = 8;

/// Everything the [`crate::Runner`] and [`crate::Benchmark`] need to know
/// about where and how to do I/O.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    dir: PathBuf,
    worker_cap: NonZeroUsize,
    block_size: usize,
    io_mode: IoMode,
    engine: EngineKind,
    validate: bool,
}

impl RunnerConfig {
    /// Defaults for scratch files in `dir`. The block size is queried from
    /// the filesystem holding `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let block_size = direct_io_common::block_size(&dir)
            .map_err(|source| Error::io(IoOp::Stat, &dir, source))?;
        Ok(Self {
            dir,
            worker_cap: *crate::env_tunables::WORKER_CAP,
            block_size,
            io_mode: IoMode::Direct,
            engine: EngineKind::Std,
            validate: true,
        })
    }

    pub fn with_worker_cap(mut self, worker_cap: usize) -> Result<Self> {
        self.worker_cap = NonZeroUsize::new(worker_cap)
            .ok_or_else(|| Error::Config("worker cap must be at least 1".to_owned()))?;
        Ok(self)
    }

    pub fn with_block_size(mut self, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(AlignmentError::InvalidBlockSize.into());
        }
        self.block_size = block_size;
        Ok(self)
    }

    pub fn with_io_mode(mut self, io_mode: IoMode) -> Self {
        self.io_mode = io_mode;
        self
    }

    pub fn with_engine(mut self, engine: EngineKind) -> Self {
        self.engine = engine;
        self
    }

    /// Compare every recovered chunk with the chunk that was written.
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn worker_cap(&self) -> usize {
        self.worker_cap.get()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn io_mode(&self) -> IoMode {
        self.io_mode
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    pub fn validate(&self) -> bool {
        self.validate
    }

    /// Workers per phase: one per available CPU, saturating at the cap.
    pub fn worker_count(&self) -> usize {
        std::thread::available_parallelism()
            .map_or(1, NonZeroUsize::get)
            .min(self.worker_cap.get())
    }
}
