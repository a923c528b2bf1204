//! Little-endian, bounds-checked primitive reads and writes.
//!
//! Every multi-byte field of a bytecode container is stored little-endian. The
//! [`crate::file::io::BinIO`] trait abstracts over the primitive integer types so that
//! [`crate::file::io::read_le_at`] and [`crate::file::io::write_le_at`] can decode and encode
//! any of them with one bounds check, advancing a caller-owned offset.
//!
//! # Usage Examples
//!
//! ```rust
//! use hbcscope::file::io::{read_le, read_le_at, write_le_at};
//!
//! let data = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00];
//! let mut offset = 0;
//! let first: u16 = read_le_at(&data, &mut offset)?;
//! let second: u16 = read_le_at(&data, &mut offset)?;
//! let third: u32 = read_le_at(&data, &mut offset)?;
//! assert_eq!((first, second, third, offset), (1, 2, 3, 8));
//!
//! let mut out = [0u8; 4];
//! write_le_at(&mut out, &mut 0, 0xAABB_CCDDu32)?;
//! assert_eq!(read_le::<u32>(&out)?, 0xAABB_CCDD);
//! # Ok::<(), hbcscope::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All functions return [`crate::Error::OutOfBounds`] if the buffer cannot hold the value,
//! including when `offset + size` would overflow `usize`.

use crate::{Error::OutOfBounds, Result};

/// Primitive types that can be read from and written to little-endian byte buffers.
pub trait BinIO: Sized + Copy {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_binio {
    ($($ty:ty),*) => {
        $(
            impl BinIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_binio!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Reads a value of type `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_le<T: BinIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a value of type `T` at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit in `data` at `offset`.
pub fn read_le_at<T: BinIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    let Some(bytes) = data.get(*offset..end) else {
        return Err(OutOfBounds);
    };
    let Ok(read) = bytes.try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Writes `value` at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit in `data` at `offset`.
pub fn write_le_at<T: BinIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    let Some(target) = data.get_mut(*offset..end) else {
        return Err(OutOfBounds);
    };

    target.copy_from_slice(bytes);
    *offset = end;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_primitives() {
        assert_eq!(read_le::<u8>(&TEST_BUFFER).unwrap(), 0x01);
        assert_eq!(read_le::<u16>(&TEST_BUFFER).unwrap(), 0x0201);
        assert_eq!(read_le::<u32>(&TEST_BUFFER).unwrap(), 0x0403_0201);
        assert_eq!(read_le::<u64>(&TEST_BUFFER).unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(read_le::<i8>(&[0xFF]).unwrap(), -1);
    }

    #[test]
    fn read_advances_offset() {
        let mut offset = 2;
        let value: u32 = read_le_at(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(value, 0x0605_0403);
        assert_eq!(offset, 6);
    }

    #[test]
    fn read_out_of_bounds() {
        let mut offset = 6;
        assert!(matches!(
            read_le_at::<u32>(&TEST_BUFFER, &mut offset),
            Err(OutOfBounds)
        ));
        assert_eq!(offset, 6);

        let mut offset = usize::MAX;
        assert!(read_le_at::<u16>(&TEST_BUFFER, &mut offset).is_err());
    }

    #[test]
    fn write_then_read() {
        let mut buffer = [0u8; 6];
        let mut offset = 0;
        write_le_at(&mut buffer, &mut offset, 0xBEEFu16).unwrap();
        write_le_at(&mut buffer, &mut offset, 0xDEAD_C0DEu32).unwrap();
        assert_eq!(offset, 6);
        assert_eq!(buffer, [0xEF, 0xBE, 0xDE, 0xC0, 0xAD, 0xDE]);

        assert!(write_le_at(&mut buffer, &mut offset, 1u8).is_err());
    }
}
