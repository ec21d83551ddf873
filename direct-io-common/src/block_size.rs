use std::{io, path::Path};

/// Used when the filesystem reports nothing usable. Matches the logical
/// block size of virtually every modern device and the page size on x86/arm64.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// The smallest logical sector size `O_DIRECT` has ever accepted.
const MIN_BLOCK_SIZE: usize = 512;

/// Returns the block size buffers and offsets must be aligned to for direct
/// I/O on the filesystem that holds `dir`.
pub fn block_size(dir: &Path) -> io::Result<usize> {
    #[cfg(unix)]
    {
        let stat = nix::sys::statvfs::statvfs(dir)?;
        let reported = usize::try_from(stat.block_size()).unwrap_or(0);
        let block_size = sanitize(reported);
        if block_size != reported {
            tracing::debug!(
                ?dir,
                reported,
                block_size,
                "filesystem block size unusable, falling back"
            );
        }
        Ok(block_size)
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
        Ok(DEFAULT_BLOCK_SIZE)
    }
}

fn sanitize(reported: usize) -> usize {
    if reported >= MIN_BLOCK_SIZE && reported.is_power_of_two() {
        reported
    } else {
        DEFAULT_BLOCK_SIZE
    }
}
