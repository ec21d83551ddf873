use std::{
    fmt,
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use direct_io_common::{open_for_read, open_for_write, AlignedBuf};
use tracing::warn;

use crate::{
    align::{self, memory_alignment, padded_len},
    cipher::{self, Key},
    config::RunnerConfig,
    error::{AlignmentError, Error, IoOp, Result},
    runner::files::remove_quietly,
};

/// Which part of a benchmark run a scratch file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Latency,
    Write,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Latency => "latency",
            Phase::Write => "write",
        })
    }
}

/// Identifies one worker and, through [`WorkerId::file_name`], its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId {
    pub run_id: u64,
    pub phase: Phase,
    pub index: usize,
}

impl WorkerId {
    /// Unique per process, run, phase and worker, so concurrent benchmark
    /// processes sharing a directory don't collide.
    pub fn file_name(&self) -> String {
        format!(
            "sealed-io-{}-{}-{}-{}.bin",
            std::process::id(),
            self.run_id,
            self.phase,
            self.index
        )
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {} {} worker {}", self.run_id, self.phase, self.index)
    }
}

#[derive(Debug)]
pub struct Written {
    pub path: PathBuf,
    pub plaintext_len: usize,
    /// Bytes that hit the disk, header and padding included.
    pub aligned_len: usize,
}

#[derive(Debug)]
pub struct Recovered {
    pub plaintext: Vec<u8>,
    pub ciphertext_len: usize,
    /// The file was shorter than its length header claimed.
    pub truncated: bool,
}

#[derive(Debug)]
pub struct WriteOutcome {
    pub worker: WorkerId,
    pub duration: Duration,
    pub result: Result<Written>,
}

#[derive(Debug)]
pub struct ReadOutcome {
    pub worker: WorkerId,
    pub duration: Duration,
    pub result: Result<Recovered>,
}

/// Encrypt `data`, align it, write it to a fresh file at `path` and flush
/// it to the device.
///
/// If anything fails after the file was created, the file is removed again.
pub fn write_one(config: &RunnerConfig, path: &Path, data: &[u8], key: &Key) -> Result<Written> {
    let ciphertext = cipher::seal(data, key)?;
    let aligned = align::pack(&ciphertext, config.block_size())?;
    drop(ciphertext);

    let mut file =
        open_for_write(path, config.io_mode()).map_err(|e| Error::io(IoOp::Open, path, e))?;
    let created = scopeguard::guard(path, |path| remove_quietly(path));

    file.write_all(&aligned)
        .map_err(|e| Error::io(IoOp::Write, path, e))?;
    file.sync_all().map_err(|e| Error::io(IoOp::Sync, path, e))?;

    scopeguard::ScopeGuard::into_inner(created);
    Ok(Written {
        path: path.to_owned(),
        plaintext_len: data.len(),
        aligned_len: aligned.len(),
    })
}

/// Read back a file produced by [`write_one`] and decrypt it.
pub fn read_one(config: &RunnerConfig, path: &Path, key: &Key) -> Result<Recovered> {
    let mut file =
        open_for_read(path, config.io_mode()).map_err(|e| Error::io(IoOp::Open, path, e))?;
    let file_len = file
        .metadata()
        .map_err(|e| Error::io(IoOp::Stat, path, e))?
        .len();
    let file_len = usize::try_from(file_len).map_err(|_| {
        Error::io(
            IoOp::Stat,
            path,
            io::Error::new(io::ErrorKind::InvalidData, "file does not fit in memory"),
        )
    })?;
    if file_len == 0 {
        return Err(AlignmentError::MissingHeader(0).into());
    }

    let block_size = config.block_size();
    let mut buf = AlignedBuf::zeroed(
        padded_len(file_len, block_size),
        memory_alignment(block_size),
    )
    .map_err(AlignmentError::Alloc)?;
    let filled =
        read_up_to(&mut file, &mut buf, file_len).map_err(|e| Error::io(IoOp::Read, path, e))?;

    let unpacked = align::unpack(&buf[..filled]);
    if unpacked.declared_len.is_none() {
        return Err(AlignmentError::MissingHeader(filled).into());
    }
    if unpacked.is_truncated() {
        warn!(
            ?path,
            declared = unpacked.declared_len,
            available = unpacked.data.len(),
            "aligned file is shorter than its header claims"
        );
    }
    let plaintext = cipher::open(unpacked.data, key)?;
    Ok(Recovered {
        plaintext,
        ciphertext_len: unpacked.data.len(),
        truncated: unpacked.is_truncated(),
    })
}

/// Reads until `want` bytes are in `buf` or the file ends.
///
/// Stops at `want` instead of probing for EOF: with `O_DIRECT`, a read at
/// the unaligned offset following a short read fails with `EINVAL`.
fn read_up_to(file: &mut File, buf: &mut [u8], want: usize) -> io::Result<usize> {
    let mut filled = 0;
    while filled < want {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled.min(want))
}
