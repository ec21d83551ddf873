//! Framing of arbitrary byte strings into block-aligned buffers.
//!
//! Layout of a packed buffer:
//!
//! ```text
//! +----------------+-----------------+-------------------+
//! | len: u64 (LE)  | data (len bytes)| zero padding      |
//! +----------------+-----------------+-------------------+
//! |<--------- multiple of the block size --------------->|
//! ```
//!
//! The header is what makes padding removable: a payload may legitimately
//! end in zero bytes, so the padding can't be stripped by looking at it.

use direct_io_common::AlignedBuf;

use crate::error::AlignmentError;

pub const HEADER_LEN: usize = 8;

/// Smallest multiple of `block_size` that is `>= len`.
pub fn padded_len(len: usize, block_size: usize) -> usize {
    len.div_ceil(block_size) * block_size
}

/// Memory alignment used for a packed buffer: the largest power of two
/// dividing `block_size`, i.e. `block_size` itself for every real device.
pub(crate) fn memory_alignment(block_size: usize) -> usize {
    1 << block_size.trailing_zeros()
}

/// Prefixes `data` with its length and zero-pads the result to a multiple
/// of `block_size`. The returned buffer's address is aligned as well.
pub fn pack(data: &[u8], block_size: usize) -> Result<AlignedBuf, AlignmentError> {
    if block_size == 0 {
        return Err(AlignmentError::InvalidBlockSize);
    }
    let framed_len = HEADER_LEN + data.len();
    let mut buf = AlignedBuf::zeroed(
        padded_len(framed_len, block_size),
        memory_alignment(block_size),
    )
    .map_err(AlignmentError::Alloc)?;
    buf[..HEADER_LEN].copy_from_slice(&(data.len() as u64).to_le_bytes());
    buf[HEADER_LEN..framed_len].copy_from_slice(data);
    Ok(buf)
}

/// The payload recovered by [`unpack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unpacked<'a> {
    pub data: &'a [u8],
    /// The length the header claims; `None` if the buffer ends inside the
    /// header.
    pub declared_len: Option<u64>,
}

impl Unpacked<'_> {
    /// The buffer held less than its header claims, or no full header.
    pub fn is_truncated(&self) -> bool {
        match self.declared_len {
            Some(declared) => (self.data.len() as u64) < declared,
            None => true,
        }
    }
}

/// Inverse of [`pack`].
///
/// Never fails and never reads past the end of `buf`. If the buffer is
/// shorter than its header claims, everything after the header is returned;
/// if it ends inside the header, the data is empty. Both cases are reported
/// by [`Unpacked::is_truncated`] and callers decide whether that is
/// acceptable.
pub fn unpack(buf: &[u8]) -> Unpacked<'_> {
    let Some((header, body)) = buf.split_first_chunk::<HEADER_LEN>() else {
        return Unpacked {
            data: &[],
            declared_len: None,
        };
    };
    let declared_len = u64::from_le_bytes(*header);
    let len = usize::try_from(declared_len).map_or(body.len(), |l| l.min(body.len()));
    Unpacked {
        data: &body[..len],
        declared_len: Some(declared_len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_SIZES: [usize; 7] = [1, 3, 8, 512, 1000, 4096, 65536];

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn pack_unpack_round_trip() {
        for bs in BLOCK_SIZES {
            for len in [0, 1, 7, 8, 9, 511, 512, 4088, 4089, 10_000] {
                let data = sample(len);
                let packed = pack(&data, bs).unwrap();
                assert_eq!(packed.len() % bs, 0, "bs={bs} len={len}");
                assert!(packed.len() >= HEADER_LEN + len);
                assert!(packed.len() < HEADER_LEN + len + bs);
                let unpacked = unpack(&packed);
                assert_eq!(unpacked.data, &data[..]);
                assert!(!unpacked.is_truncated());
            }
        }
    }

    #[test]
    fn trailing_zeros_survive() {
        let data = [1u8, 2, 0, 0, 0];
        let packed = pack(&data, 512).unwrap();
        assert_eq!(unpack(&packed).data, &data);
    }

    #[test]
    fn header_is_little_endian_length() {
        let packed = pack(&[9u8; 300], 512).unwrap();
        assert_eq!(&packed[..HEADER_LEN], &300u64.to_le_bytes());
        assert!(packed[HEADER_LEN + 300..].iter().all(|b| *b == 0));
    }

    #[test]
    fn packed_buffer_address_is_aligned() {
        let packed = pack(&sample(100), 4096).unwrap();
        assert_eq!(packed.as_ptr() as usize % 4096, 0);
        assert_eq!(memory_alignment(1000), 8);
        assert_eq!(memory_alignment(3), 1);
    }

    #[test]
    fn zero_block_size_is_rejected() {
        assert!(matches!(
            pack(b"x", 0),
            Err(AlignmentError::InvalidBlockSize)
        ));
    }

    #[test]
    fn truncated_tail_is_tolerated() {
        let bs = 512;
        for len in [0, 100, 504, 505, 1000] {
            let data = sample(len);
            let packed = pack(&data, bs).unwrap();
            for k in 0..bs {
                let cut = &packed[..packed.len() - k];
                let unpacked = unpack(cut);
                if cut.len() < HEADER_LEN {
                    assert_eq!(unpacked.data, b"", "len={len} k={k}");
                    assert_eq!(unpacked.declared_len, None);
                    assert!(unpacked.is_truncated());
                    continue;
                }
                let expect = len.min(cut.len() - HEADER_LEN);
                assert_eq!(unpacked.data, &data[..expect], "len={len} k={k}");
                assert_eq!(unpacked.is_truncated(), expect < len);
                assert_eq!(unpacked.declared_len, Some(len as u64));
            }
        }
    }

    #[test]
    fn corrupt_header_does_not_overread() {
        let mut packed = pack(b"abc", 64).unwrap();
        packed[..HEADER_LEN].copy_from_slice(&u64::MAX.to_le_bytes());
        let unpacked = unpack(&packed);
        assert_eq!(unpacked.data.len(), 64 - HEADER_LEN);
        assert!(unpacked.is_truncated());
    }

    #[test]
    fn cut_inside_the_header() {
        // block sizes up to the header length leave nothing after the cut
        for bs in [1, 4, 8] {
            let packed = pack(b"", bs).unwrap();
            for keep in 0..HEADER_LEN {
                let unpacked = unpack(&packed[..keep]);
                assert_eq!(unpacked.data, b"");
                assert!(unpacked.is_truncated(), "bs={bs} keep={keep}");
            }
        }
        let packed = pack(b"", 512).unwrap();
        let unpacked = unpack(&packed[..5]);
        assert_eq!(unpacked.declared_len, None);
        assert!(unpacked.is_truncated());
        assert!(!unpack(&packed[..HEADER_LEN]).is_truncated());
    }

    #[test]
    fn padded_len_rounds_up() {
        assert_eq!(padded_len(0, 512), 0);
        assert_eq!(padded_len(1, 512), 512);
        assert_eq!(padded_len(512, 512), 512);
        assert_eq!(padded_len(513, 512), 1024);
        assert_eq!(padded_len(10, 3), 12);
    }
}
