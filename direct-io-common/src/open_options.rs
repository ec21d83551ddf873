use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
};

use crate::{block_size, AlignedBuf};

/// Whether file data goes through the page cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoMode {
    /// `O_DIRECT` on Linux, `F_NOCACHE` on macOS.
    #[default]
    Direct,
    /// Plain buffered I/O.
    Cached,
}

/// Create (or truncate) `path` for writing.
pub fn open_for_write(path: &Path, mode: IoMode) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    open(options, path, mode)
}

/// Open `path` read-only.
pub fn open_for_read(path: &Path, mode: IoMode) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    open(options, path, mode)
}

#[cfg(target_os = "linux")]
fn open(mut options: OpenOptions, path: &Path, mode: IoMode) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    match mode {
        IoMode::Direct => {
            options.custom_flags(libc::O_DIRECT);
        }
        IoMode::Cached => {}
    }
    options.open(path)
}

#[cfg(target_os = "macos")]
fn open(options: OpenOptions, path: &Path, mode: IoMode) -> io::Result<File> {
    use std::os::fd::AsRawFd;
    let file = options.open(path)?;
    match mode {
        IoMode::Direct => {
            // SAFETY: the fd stays open for the lifetime of `file`.
            let ret = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) };
            if ret == -1 {
                return Err(io::Error::last_os_error());
            }
        }
        IoMode::Cached => {}
    }
    Ok(file)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn open(options: OpenOptions, path: &Path, mode: IoMode) -> io::Result<File> {
    match mode {
        IoMode::Direct => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "direct I/O is not supported on this platform",
        )),
        IoMode::Cached => options.open(path),
    }
}

/// Checks whether the filesystem holding `dir` accepts a direct-I/O write.
///
/// Some filesystems (older tmpfs, overlayfs setups) refuse `O_DIRECT` at
/// `open` time, others only at the first `write`, so this does both.
pub fn probe_direct_io(dir: &Path) -> bool {
    let path = dir.join(format!(".direct-io-probe-{}", std::process::id()));
    let res = (|| -> io::Result<()> {
        let block_size = block_size(dir)?;
        let buf = AlignedBuf::zeroed(block_size, block_size)?;
        let mut file = open_for_write(&path, IoMode::Direct)?;
        file.write_all(&buf)?;
        file.sync_all()
    })();
    let _ = std::fs::remove_file(&path);
    match res {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(?dir, error = %e, "direct I/O probe failed");
            false
        }
    }
}
