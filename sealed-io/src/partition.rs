//! Splitting one payload into per-worker chunks.
//!
//! Chunks are contiguous, in order and non-overlapping; every chunk but the
//! last has `len / n` bytes and the last one absorbs the remainder. When
//! `len < n` the leading chunks are empty.

use std::ops::Range;

use bytes::Bytes;

use crate::error::{Error, Result};

fn ranges(len: usize, n: usize) -> Result<Vec<Range<usize>>> {
    if n == 0 {
        return Err(Error::Config("partition count must be at least 1".to_owned()));
    }
    let part = len / n;
    Ok((0..n)
        .map(|i| {
            let start = i * part;
            let end = if i == n - 1 { len } else { start + part };
            start..end
        })
        .collect())
}

/// Borrowing views over `data`.
pub fn split(data: &[u8], n: usize) -> Result<Vec<&[u8]>> {
    Ok(ranges(data.len(), n)?
        .into_iter()
        .map(|r| &data[r])
        .collect())
}

/// Same partition as [`split`], as reference-counted views that can move
/// into `'static` worker tasks without copying.
pub fn split_bytes(data: &Bytes, n: usize) -> Result<Vec<Bytes>> {
    Ok(ranges(data.len(), n)?
        .into_iter()
        .map(|r| data.slice(r))
        .collect())
}
