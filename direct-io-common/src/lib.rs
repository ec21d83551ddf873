//! Building blocks for unbuffered ("direct") file I/O.
//!
//! Direct I/O bypasses the page cache, which means the kernel DMAs straight
//! from and into user memory. That only works if the buffer address, the
//! transfer length and the file offset are all multiples of the device's
//! block size. This crate provides the three pieces needed to honor that:
//!
//! - [`AlignedBuf`], a heap buffer with a caller-chosen alignment,
//! - [`open_for_write`] / [`open_for_read`], which apply the platform's
//!   cache-bypass flag according to an [`IoMode`],
//! - [`block_size`], which asks the filesystem what "aligned" means.

pub mod block_size;
pub mod buf;
pub mod open_options;

pub use block_size::{block_size, DEFAULT_BLOCK_SIZE};
pub use buf::AlignedBuf;
pub use open_options::{open_for_read, open_for_write, probe_direct_io, IoMode};
