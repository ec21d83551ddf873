//! Measure what it costs to encrypt data and persist it with direct I/O.
//!
//! The pipeline for one chunk of payload is
//!
//! 1. [`cipher::seal`]: AES-256-GCM with a fresh random nonce,
//! 2. [`align::pack`]: length header + zero padding up to the block size,
//!    in a buffer whose address is block-aligned too,
//! 3. a direct-I/O write followed by `fsync`,
//!
//! and the exact inverse for reading. The [`Runner`] fans this out over a
//! bounded number of workers and times each phase as a whole; the
//! [`Benchmark`] drives one run per payload size and produces a
//! [`BenchmarkResult`] for each.
//!
//! # Example
//!
//! ```rust,no_run
//! use sealed_io::{Benchmark, RunnerConfig};
//!
//! let config = RunnerConfig::new("/var/tmp").unwrap().with_worker_cap(4).unwrap();
//! let results = Benchmark::new(config).unwrap().run(&[1 << 20, 10 << 20]).unwrap();
//! for r in results {
//!     println!("{} bytes: write {:.2} MiB/s", r.size, r.write_throughput_mibps);
//! }
//! ```
//!
//! Neither [`Runner`] nor [`Benchmark`] may be used from within an async
//! context; the tokio engine drives its own runtime.

pub mod align;
pub mod bench;
pub mod cipher;
pub mod config;
pub mod error;
pub mod partition;
pub mod runner;

#[cfg(test)]
pub(crate) mod test_util;

pub use bench::{throughput_mibps, Benchmark, BenchmarkResult};
pub use cipher::Key;
pub use config::{RunnerConfig, DEFAULT_WORKER_CAP};
pub use direct_io_common::IoMode;
pub use error::{AlignmentError, CryptoError, Error, IoOp, Result};
pub use runner::{EngineKind, ReadPhase, Runner, WritePhase};

pub mod env_tunables {
    use std::num::NonZeroUsize;

    pub(crate) static WORKER_CAP: once_cell::sync::Lazy<NonZeroUsize> =
        once_cell::sync::Lazy::new(|| {
            std::env::var("SEALED_IO_WORKER_CAP")
                .map(|v| {
                    v.parse::<NonZeroUsize>().unwrap_or_else(|e| {
                        panic!("SEALED_IO_WORKER_CAP must be a positive integer: {e}: {v:?}")
                    })
                })
                .unwrap_or_else(|e| match e {
                    std::env::VarError::NotPresent => {
                        NonZeroUsize::new(crate::config::DEFAULT_WORKER_CAP)
                            .unwrap_or(NonZeroUsize::MIN)
                    }
                    std::env::VarError::NotUnicode(_) => {
                        panic!("SEALED_IO_WORKER_CAP must be a unicode string")
                    }
                })
        });

    pub fn assert_no_unknown_env_vars() {
        std::env::vars()
            .filter_map(|(v, _)| {
                if v.starts_with("SEALED_IO_") {
                    Some(v)
                } else {
                    None
                }
            })
            .for_each(|v| match v.as_str() {
                "SEALED_IO_WORKER_CAP" => {}
                x => panic!("env var starts with SEALED_IO but is not an env_tunable: {x:?}"),
            });
    }
}
