use std::{fmt, path::PathBuf};

use crate::cipher::KEY_LEN;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
    #[error("alignment: {0}")]
    Alignment(#[from] AlignmentError),
    #[error("{op} {path:?}: {source}")]
    Io {
        op: IoOp,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config: {0}")]
    Config(String),
    #[error("spawning worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl Error {
    pub(crate) fn io(op: IoOp, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length {0}, expected {KEY_LEN}")]
    InvalidKeyLength(usize),
    #[error("random source unavailable: {0}")]
    RandomSource(#[source] rand::Error),
    #[error("ciphertext of {0} bytes is shorter than nonce and tag")]
    TooShort(usize),
    #[error("encryption failed")]
    Seal,
    #[error("authentication failed")]
    Authentication,
}

#[derive(Debug, thiserror::Error)]
pub enum AlignmentError {
    #[error("block size must be positive")]
    InvalidBlockSize,
    #[error("buffer of {0} bytes cannot hold the length header")]
    MissingHeader(usize),
    #[error("allocating aligned buffer: {0}")]
    Alloc(#[source] std::io::Error),
}

/// The file-system call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Open,
    Write,
    Sync,
    Stat,
    Read,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoOp::Open => "open",
            IoOp::Write => "write",
            IoOp::Sync => "sync",
            IoOp::Stat => "stat",
            IoOp::Read => "read",
        })
    }
}
