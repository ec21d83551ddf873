//! One benchmark run per payload size.
//!
//! For every size: fresh random payload and key, a single-shot latency
//! measurement (one un-partitioned write + read), then the concurrent write
//! phase and the concurrent read phase over a partitioning of the same
//! payload.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use rand::RngCore;
use serde_with::serde_as;
use tracing::{error, info, info_span, warn};

use crate::{
    cipher::Key,
    config::RunnerConfig,
    error::{CryptoError, Result},
    partition::split_bytes,
    runner::{read_one, remove_quietly, write_one, Phase, ReadPhase, Runner, WorkerId},
};

const MIB: f64 = (1024 * 1024) as f64;

/// Distinguishes the scratch files of benchmarks running side by side in
/// one process.
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// Throughput in MiB/s; `0` for a zero duration instead of `inf`/`NaN`.
pub fn throughput_mibps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    bytes as f64 / secs / MIB
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BenchmarkResult {
    pub size: usize,
    pub workers: usize,
    #[serde_as(as = "serde_with::DurationMicroSeconds")]
    pub write_time: Duration,
    #[serde_as(as = "serde_with::DurationMicroSeconds")]
    pub read_time: Duration,
    /// `None` if the single-shot measurement failed.
    #[serde_as(as = "Option<serde_with::DurationMicroSeconds>")]
    pub latency: Option<Duration>,
    pub write_throughput_mibps: f64,
    pub read_throughput_mibps: f64,
    pub write_errors: usize,
    /// Failed reads plus, with validation on, chunks that came back different.
    pub read_errors: usize,
}

pub struct Benchmark {
    runner: Runner,
    stop: Arc<AtomicBool>,
    instance: u64,
    next_run: AtomicU64,
}

impl Benchmark {
    pub fn new(config: RunnerConfig) -> Result<Self> {
        Ok(Self {
            runner: Runner::new(config)?,
            stop: Arc::new(AtomicBool::new(false)),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            next_run: AtomicU64::new(0),
        })
    }

    /// Checked between sizes. Once set, the size in progress completes and
    /// cleans up, and the remaining sizes are skipped.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// One result per size, in input order.
    ///
    /// Only a failing random source aborts the whole run; I/O and crypto
    /// failures of individual workers are logged and counted.
    pub fn run(&self, sizes: &[usize]) -> Result<Vec<BenchmarkResult>> {
        let mut results = Vec::with_capacity(sizes.len());
        for &size in sizes {
            if self.stop.load(Ordering::Relaxed) {
                info!(
                    remaining = sizes.len() - results.len(),
                    "stop requested, skipping remaining sizes"
                );
                break;
            }
            let run_id = self.next_run_id();
            let _span = info_span!("size", run_id, size).entered();
            results.push(self.run_size(run_id, size)?);
        }
        Ok(results)
    }

    /// Instance in the upper half, sequence in the lower half.
    fn next_run_id(&self) -> u64 {
        (self.instance << 32) | (self.next_run.fetch_add(1, Ordering::Relaxed) & 0xffff_ffff)
    }

    fn run_size(&self, run_id: u64, size: usize) -> Result<BenchmarkResult> {
        let config = self.runner.config();
        let key = Arc::new(Key::generate()?);
        let data = {
            let mut data = vec![0u8; size];
            rand::thread_rng()
                .try_fill_bytes(&mut data)
                .map_err(CryptoError::RandomSource)?;
            Bytes::from(data)
        };

        let latency = match self.measure_latency(run_id, &data, &key) {
            Ok(latency) => Some(latency),
            Err(e) => {
                error!(error = %e, "latency measurement failed");
                None
            }
        };

        let workers = config.worker_count();
        let chunks = split_bytes(&data, workers)?;
        let write = self.runner.write_phase(run_id, chunks.clone(), &key)?;
        for (worker, e) in write.failed() {
            error!(%worker, error = %e, "write failed");
        }
        let read = self.runner.read_phase(&write.files, &key);
        let (bytes_read, read_errors) = self.check_reads(&read, &chunks);
        let write_errors = write.failed().count();
        let bytes_written = write.bytes_written();
        let (write_time, read_time) = (write.elapsed, read.elapsed);
        drop(write);

        let result = BenchmarkResult {
            size,
            workers,
            write_time,
            read_time,
            latency,
            write_throughput_mibps: throughput_mibps(bytes_written, write_time),
            read_throughput_mibps: throughput_mibps(bytes_read, read_time),
            write_errors,
            read_errors,
        };
        info!(
            write_mibps = result.write_throughput_mibps,
            read_mibps = result.read_throughput_mibps,
            latency = ?result.latency,
            write_errors,
            read_errors,
            "size done"
        );
        Ok(result)
    }

    /// Logs failed and (when validating) mismatching reads. Returns the
    /// plaintext bytes of good reads and the number of bad ones.
    fn check_reads(&self, read: &ReadPhase, chunks: &[Bytes]) -> (u64, usize) {
        let validate = self.runner.config().validate();
        let mut bytes = 0u64;
        let mut errors = 0;
        for outcome in &read.outcomes {
            match &outcome.result {
                Err(e) => {
                    error!(worker = %outcome.worker, error = %e, "read failed");
                    errors += 1;
                }
                Ok(recovered)
                    if validate && recovered.plaintext != chunks[outcome.worker.index] =>
                {
                    error!(
                        worker = %outcome.worker,
                        expected = chunks[outcome.worker.index].len(),
                        actual = recovered.plaintext.len(),
                        "recovered chunk differs from the written one"
                    );
                    errors += 1;
                }
                Ok(recovered) => {
                    if recovered.truncated {
                        warn!(worker = %outcome.worker, "read was truncated");
                    }
                    bytes += recovered.plaintext.len() as u64;
                }
            }
        }
        (bytes, errors)
    }

    /// One write plus one read of the whole payload on the calling thread.
    fn measure_latency(&self, run_id: u64, data: &[u8], key: &Key) -> Result<Duration> {
        let config = self.runner.config();
        let path = config.dir().join(
            WorkerId {
                run_id,
                phase: Phase::Latency,
                index: 0,
            }
            .file_name(),
        );

        let start = Instant::now();
        write_one(config, &path, data, key)?;
        scopeguard::defer! { remove_quietly(&path) };
        let recovered = read_one(config, &path, key)?;
        let elapsed = start.elapsed();

        if config.validate() && recovered.plaintext != data {
            error!("single-shot read returned different data");
        }
        Ok(elapsed)
    }
}
