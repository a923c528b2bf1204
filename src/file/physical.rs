//! Physical file backend for memory-mapped I/O.
//!
//! [`crate::file::physical::Physical`] maps a container file read-only into the address
//! space. Pages are faulted in on first touch, which is exactly what the residency advice and
//! warmup in [`crate::provider`] shape: a freshly mapped container costs nothing until the
//! interpreter or the warmup worker reads it.
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use hbcscope::file::{Backend, Physical};
//!
//! let physical = Physical::new("index.android.bundle")?;
//! let header = physical.data_slice(0, 8)?;
//! println!("magic bytes: {:02x?}", header);
//! # Ok::<(), hbcscope::Error>(())
//! ```

use super::{checked_slice, Backend};
use crate::{
    Error::{Error, FileError},
    Result,
};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A file backend that uses memory-mapped I/O for efficient access to files on disk.
#[derive(Debug)]
pub struct Physical {
    /// Memory-mapped file data
    data: Mmap,
}

impl Physical {
    /// Create a new physical file backend by memory-mapping the specified file.
    ///
    /// # Arguments
    /// * `path` - Path to the container on disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or
    /// [`crate::Error::Error`] if memory mapping fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        Self::from_std_file(file)
    }

    /// Creates a new physical file backend from an opened [`std::fs::File`].
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] if memory mapping fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn from_std_file(file: fs::File) -> Result<Physical> {
        // SAFETY: the mapping is read-only; the container must not be truncated or rewritten
        // by another process while it is mapped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|error| Error(error.to_string()))?;

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        checked_slice(&self.data, offset, len)
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn is_mapped(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("hbcscope_{}_{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn physical() {
        let contents: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let path = temp_file("physical.bin", &contents);

        let physical = Physical::new(&path).unwrap();
        assert_eq!(physical.len(), 10_000);
        assert!(physical.is_mapped());
        assert_eq!(physical.data()[255], 255);
        assert_eq!(physical.data_slice(12, 3).unwrap(), &[12, 13, 14]);

        assert!(physical.data_slice(usize::MAX, 1).is_err());
        assert!(physical.data_slice(9_999, 2).is_err());
        assert_eq!(physical.data_slice(10_000, 0).unwrap().len(), 0);

        drop(physical);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_physical_invalid_file_path() {
        let result = Physical::new("/nonexistent/path/to/file.hbc");
        match result.unwrap_err() {
            FileError(io_error) => {
                assert_eq!(io_error.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("Expected FileError, got {other:?}"),
        }
    }

    #[test]
    fn test_physical_from_std_file() {
        let path = temp_file("from_std.bin", &[0xAA, 0xBB, 0xCC]);
        let file = fs::File::open(&path).unwrap();

        let physical = Physical::from_std_file(file).unwrap();
        assert_eq!(physical.data(), &[0xAA, 0xBB, 0xCC]);

        drop(physical);
        std::fs::remove_file(&path).unwrap();
    }
}
