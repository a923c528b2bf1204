//! Data sources for bytecode containers and low-level reading primitives.
//!
//! A container reaches the reader either as a memory-mapped file or as a buffer already held
//! in memory. Both are abstracted by the [`crate::file::Backend`] trait, so the provider owns
//! one `Arc<dyn Backend>` regardless of origin and can share it with the warmup worker.
//!
//! # Key Components
//!
//! - [`crate::file::Backend`] - Trait over contiguous, immutable byte sources
//! - [`crate::file::Memory`] - In-memory backend over a `Vec<u8>`
//! - [`crate::file::Physical`] - Memory-mapped file backend (memmap2)
//! - [`crate::file::parser::Parser`] - Bounds-checked cursor used by every decoder
//! - [`crate::file::io`] - Little-endian primitive reads and writes
//!
//! # Examples
//!
//! ```rust,no_run
//! use hbcscope::file::{Backend, Physical};
//!
//! let mapped = Physical::new("bundle.hbc")?;
//! println!("{} bytes, file backed: {}", mapped.len(), mapped.is_mapped());
//! # Ok::<(), hbcscope::Error>(())
//! ```

pub mod io;
pub mod parser;

mod memory;
mod physical;

pub use memory::Memory;
pub use physical::Physical;

use crate::Result;

/// Backend trait for container data sources.
///
/// Implementations expose one contiguous, immutable byte region. All implementations must be
/// thread-safe because the warmup worker reads the buffer concurrently with the owner.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the buffer is a read-only file mapping.
    ///
    /// Only such buffers may receive advice that discards resident pages, since the kernel
    /// can always read them back from the file.
    fn is_mapped(&self) -> bool {
        false
    }
}

/// Bounds-checked sub-slice shared by the backends.
pub(crate) fn checked_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let Some(offset_end) = offset.checked_add(len) else {
        return Err(crate::Error::OutOfBounds);
    };

    data.get(offset..offset_end)
        .ok_or(crate::Error::OutOfBounds)
}
