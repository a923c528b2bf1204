//! Cursor-based, bounds-checked reader over a borrowed byte slice.
//!
//! The [`crate::file::parser::Parser`] is the single primitive through which the rest of the
//! crate walks container bytes: it aligns, reads little-endian primitives, hands out borrowed
//! sub-slices without copying, and decodes signed LEB128 values used by the debug data stream.
//! Every operation checks the remaining length first, so malformed input surfaces as
//! [`crate::Error::OutOfBounds`] rather than a panic.
//!
//! # Usage Examples
//!
//! ```rust
//! use hbcscope::Parser;
//!
//! let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
//! let mut parser = Parser::new(&data);
//!
//! let first = parser.read_le::<u8>()?;
//! parser.align(4)?;
//! let rest = parser.take(4)?;
//! assert_eq!(first, 1);
//! assert_eq!(rest, &[0x05, 0x06, 0x07, 0x08]);
//! # Ok::<(), hbcscope::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, BinIO},
    utils::align_up,
    Error::OutOfBounds,
    Result,
};

/// A binary data parser with a position cursor.
///
/// Slices returned by [`Parser::take`] borrow from the parsed buffer with lifetime `'a`,
/// not from the parser, so they outlive it.
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] from a byte slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Create a new [`Parser`] positioned at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `offset` is beyond the data length.
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self> {
        let mut parser = Parser::new(data);
        parser.seek(offset)?;
        Ok(parser)
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of bytes between the cursor and the end of the data.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Get access to the underlying data buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Move the current position to the specified index. Seeking to the end is allowed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing by step would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if step > self.remaining() {
            return Err(OutOfBounds);
        }

        self.position += step;
        Ok(())
    }

    /// Align the position up to the next multiple of `alignment` (a power of two).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if aligning would exceed the data length.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hbcscope::Parser;
    /// let data = [0u8; 8];
    /// let mut parser = Parser::new(&data);
    ///
    /// parser.advance_by(1)?;
    /// parser.align(4)?;
    /// assert_eq!(parser.pos(), 4);
    /// # Ok::<(), hbcscope::Error>(())
    /// ```
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let aligned = align_up(self.position, alignment).ok_or(OutOfBounds)?;
        self.seek(aligned)
    }

    /// Read a type `T` from the current position in little-endian format and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_le<T: BinIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `len` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(OutOfBounds);
        }

        let slice = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Read a signed LEB128 value of at most 64 bits.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the encoding runs past the data, and
    /// [`crate::Error::Malformed`] if it does not terminate within ten bytes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hbcscope::Parser;
    /// let data = [0x7F, 0x80, 0x01, 0xC0, 0xBB, 0x78];
    /// let mut parser = Parser::new(&data);
    /// assert_eq!(parser.read_sleb128()?, -1);
    /// assert_eq!(parser.read_sleb128()?, 128);
    /// assert_eq!(parser.read_sleb128()?, -123_456);
    /// # Ok::<(), hbcscope::Error>(())
    /// ```
    pub fn read_sleb128(&mut self) -> Result<i64> {
        let mut result = 0_i64;
        let mut shift = 0_u32;

        loop {
            let byte = self.read_le::<u8>()?;
            if shift >= 64 {
                return Err(malformed_error!(
                    "LEB128 value at offset {} exceeds 64 bits",
                    self.position
                ));
            }

            result |= i64::from(byte & 0x7F) << shift;
            shift += 7;

            if byte & 0x80 == 0 {
                if shift < 64 && (byte & 0x40) != 0 {
                    result |= -1_i64 << shift;
                }
                return Ok(result);
            }
        }
    }
}
