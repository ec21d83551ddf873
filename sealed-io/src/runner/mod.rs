//! The concurrent write and read phases.
//!
//! A phase fans out one worker per chunk (bounded by the worker cap), waits
//! for every worker to report, and only then stops the phase clock. The
//! reported time is therefore wall-clock time under concurrency, not the
//! sum of per-worker times.
//!
//! A failing worker only fails its own outcome. Its siblings keep running
//! and the phase still completes; the caller decides what to do with the
//! partial result.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use tracing::{debug, info};

use crate::{
    cipher::Key,
    config::RunnerConfig,
    error::{Error, Result},
};

mod engine;
mod files;
mod worker;

#[cfg(test)]
mod tests;

pub use engine::EngineKind;
pub use files::PhaseFiles;
pub use worker::{
    read_one, write_one, Phase, ReadOutcome, Recovered, WorkerId, WriteOutcome, Written,
};

pub(crate) use files::remove_quietly;

use engine::{Engine, Task};

pub struct Runner {
    config: Arc<RunnerConfig>,
    engine: Engine,
}

#[derive(Debug)]
pub struct WritePhase {
    pub elapsed: Duration,
    /// One per worker, in worker order.
    pub outcomes: Vec<WriteOutcome>,
    /// Files of the workers that succeeded; removed when dropped.
    pub files: PhaseFiles,
}

impl WritePhase {
    /// Plaintext bytes of the workers that succeeded.
    pub fn bytes_written(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|w| w.plaintext_len as u64)
            .sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = (WorkerId, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.worker, e)))
    }
}

#[derive(Debug)]
pub struct ReadPhase {
    pub elapsed: Duration,
    /// One per file of the preceding write phase, in worker order.
    pub outcomes: Vec<ReadOutcome>,
}

impl ReadPhase {
    pub fn failed(&self) -> impl Iterator<Item = (WorkerId, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.worker, e)))
    }
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Result<Self> {
        let engine = Engine::new(config.engine(), config.worker_cap())?;
        Ok(Self {
            config: Arc::new(config),
            engine,
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Writes each chunk to its own file, one worker per chunk.
    ///
    /// Fails only if the number of chunks is zero or exceeds the worker cap;
    /// worker failures are reported in the outcomes.
    pub fn write_phase(
        &self,
        run_id: u64,
        chunks: Vec<Bytes>,
        key: &Arc<Key>,
    ) -> Result<WritePhase> {
        if chunks.is_empty() || chunks.len() > self.config.worker_cap() {
            return Err(Error::Config(format!(
                "{} chunks for a worker cap of {}",
                chunks.len(),
                self.config.worker_cap()
            )));
        }

        let workers: Vec<WorkerId> = (0..chunks.len())
            .map(|index| WorkerId {
                run_id,
                phase: Phase::Write,
                index,
            })
            .collect();
        let tasks: Vec<Task<WriteOutcome>> = workers
            .iter()
            .copied()
            .zip(chunks)
            .map(|(worker, chunk)| {
                let config = Arc::clone(&self.config);
                let key = Arc::clone(key);
                Box::new(move || {
                    let path = config.dir().join(worker.file_name());
                    let start = Instant::now();
                    let result = write_one(&config, &path, &chunk, &key);
                    WriteOutcome {
                        worker,
                        duration: start.elapsed(),
                        result,
                    }
                }) as Task<WriteOutcome>
            })
            .collect();

        info!(run_id, workers = tasks.len(), "write phase starting");
        let start = Instant::now();
        let outcomes = self.engine.fan_out(tasks, |index, e| {
            let worker = workers[index];
            // a worker that died may have created its file
            remove_quietly(&self.config.dir().join(worker.file_name()));
            WriteOutcome {
                worker,
                duration: Duration::ZERO,
                result: Err(e),
            }
        });
        let elapsed = start.elapsed();

        let mut files = PhaseFiles::default();
        for outcome in &outcomes {
            if let Ok(written) = &outcome.result {
                files.push(outcome.worker, written.path.clone());
            }
        }
        info!(
            run_id,
            elapsed = %humantime::format_duration(elapsed),
            written = files.len(),
            failed = outcomes.len() - files.len(),
            "write phase done"
        );
        log_worker_durations("write", outcomes.iter().map(|o| o.duration));

        Ok(WritePhase {
            elapsed,
            outcomes,
            files,
        })
    }

    /// Reads back and decrypts every file in `files`, one worker per file.
    pub fn read_phase(&self, files: &PhaseFiles, key: &Arc<Key>) -> ReadPhase {
        let workers: Vec<WorkerId> = files.iter().map(|(worker, _)| worker).collect();
        let tasks: Vec<Task<ReadOutcome>> = files
            .iter()
            .map(|(worker, path)| {
                let config = Arc::clone(&self.config);
                let key = Arc::clone(key);
                let path = path.to_owned();
                Box::new(move || {
                    let start = Instant::now();
                    let result = read_one(&config, &path, &key);
                    ReadOutcome {
                        worker,
                        duration: start.elapsed(),
                        result,
                    }
                }) as Task<ReadOutcome>
            })
            .collect();

        info!(workers = tasks.len(), "read phase starting");
        let start = Instant::now();
        let outcomes = self.engine.fan_out(tasks, |index, e| ReadOutcome {
            worker: workers[index],
            duration: Duration::ZERO,
            result: Err(e),
        });
        let elapsed = start.elapsed();

        let ciphertext_bytes: usize = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|r| r.ciphertext_len)
            .sum();
        info!(
            elapsed = %humantime::format_duration(elapsed),
            ciphertext_bytes,
            failed = outcomes.iter().filter(|o| o.result.is_err()).count(),
            "read phase done"
        );
        log_worker_durations("read", outcomes.iter().map(|o| o.duration));

        ReadPhase { elapsed, outcomes }
    }
}

fn log_worker_durations(phase: &str, durations: impl Iterator<Item = Duration>) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    let Ok(mut histo) = hdrhistogram::Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) else {
        return;
    };
    for d in durations {
        histo.saturating_record(u64::try_from(d.as_micros()).unwrap_or(u64::MAX));
    }
    debug!(
        phase,
        workers = histo.len(),
        min_us = histo.min(),
        p50_us = histo.value_at_quantile(0.5),
        p99_us = histo.value_at_quantile(0.99),
        max_us = histo.max(),
        "worker durations"
    );
}
