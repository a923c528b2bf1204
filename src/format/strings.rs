//! String, regular expression and CJS module table records.
//!
//! Strings are described by a compact 4-byte [`SmallStringTableEntry`] each. Entries whose
//! offset or length do not fit are marked overflowed and redirect to an 8-byte
//! [`OverflowStringTableEntry`]. [`StringTableEntry`] is the resolved form handed out by the
//! provider. UTF-16 string lengths count code units, not bytes.

use crate::{
    file::io::{read_le_at, write_le_at},
    format::Record,
    Result,
};

/// Whether a run of strings is plain strings or identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum StringKind {
    /// Ordinary string literal
    String = 0,
    /// Property name or identifier; has an entry in the identifier translation table
    Identifier = 1,
}

/// Run-length encoded string kind: `count` consecutive strings of one [`StringKind`].
///
/// Encoded as a single u32, `count` in bits 0-30 and the kind in bit 31.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringKindEntry(u32);

impl StringKindEntry {
    /// Largest run a single entry can describe.
    pub const MAX_COUNT: u32 = (1 << 31) - 1;

    /// Create an entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `count` exceeds [`StringKindEntry::MAX_COUNT`].
    pub fn new(kind: StringKind, count: u32) -> Result<Self> {
        if count > Self::MAX_COUNT {
            return Err(malformed_error!("string kind run of {} is too long", count));
        }
        Ok(StringKindEntry(count | (u32::from(kind as u8) << 31)))
    }

    /// Number of strings in the run.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.0 & Self::MAX_COUNT
    }

    /// Kind of every string in the run.
    #[must_use]
    pub fn kind(&self) -> StringKind {
        if self.0 >> 31 == 0 {
            StringKind::String
        } else {
            StringKind::Identifier
        }
    }
}

impl Record for StringKindEntry {
    const SIZE: usize = 4;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        Ok(StringKindEntry(read_le_at(data, offset)?))
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        write_le_at(data, offset, self.0)
    }
}

/// Compact string table entry: `is_utf16`:1, `offset`:23, `length`:8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SmallStringTableEntry {
    /// Storage holds UTF-16 code units instead of Latin-1 bytes
    pub is_utf16: bool,
    /// Offset into string storage, or the overflow table index if overflowed
    pub offset: u32,
    /// Length in characters, or [`SmallStringTableEntry::INVALID_LENGTH`] if overflowed
    pub length: u32,
}

impl SmallStringTableEntry {
    /// Length value marking an overflowed entry.
    pub const INVALID_LENGTH: u32 = 255;

    /// Largest storage offset or overflow index an entry can hold.
    pub const MAX_OFFSET: u32 = (1 << 23) - 1;

    /// Entry that redirects to `overflow_index` in the overflow string table.
    #[must_use]
    pub fn overflowed(is_utf16: bool, overflow_index: u32) -> Self {
        SmallStringTableEntry {
            is_utf16,
            offset: overflow_index,
            length: Self::INVALID_LENGTH,
        }
    }

    /// Returns `true` if the entry redirects to the overflow table.
    #[must_use]
    pub fn is_overflowed(&self) -> bool {
        self.length == Self::INVALID_LENGTH
    }
}

impl Record for SmallStringTableEntry {
    const SIZE: usize = 4;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        let word: u32 = read_le_at(data, offset)?;
        Ok(SmallStringTableEntry {
            is_utf16: word & 1 != 0,
            offset: (word >> 1) & Self::MAX_OFFSET,
            length: word >> 24,
        })
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        if self.offset > Self::MAX_OFFSET || self.length > 0xFF {
            return Err(malformed_error!(
                "string entry ({}, {}) does not fit the compact encoding",
                self.offset,
                self.length
            ));
        }

        let word = u32::from(self.is_utf16) | (self.offset << 1) | (self.length << 24);
        write_le_at(data, offset, word)
    }
}

/// Out-of-line string entry for strings that do not fit [`SmallStringTableEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverflowStringTableEntry {
    /// Offset into string storage
    pub offset: u32,
    /// Length in characters
    pub length: u32,
}

impl Record for OverflowStringTableEntry {
    const SIZE: usize = 8;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        Ok(OverflowStringTableEntry {
            offset: read_le_at(data, offset)?,
            length: read_le_at(data, offset)?,
        })
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        write_le_at(data, offset, self.offset)?;
        write_le_at(data, offset, self.length)
    }
}

/// A fully resolved string table entry.
///
/// Also usable as an 8-byte record: u32 offset, then u32 with the length in bits 0-30 and
/// `is_utf16` in bit 31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StringTableEntry {
    /// Offset into string storage
    pub offset: u32,
    /// Length in characters (code units for UTF-16)
    pub length: u32,
    /// Storage holds UTF-16 code units
    pub is_utf16: bool,
}

impl StringTableEntry {
    /// Number of storage bytes the string occupies.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        let length = self.length as usize;
        if self.is_utf16 {
            length * 2
        } else {
            length
        }
    }
}

impl Record for StringTableEntry {
    const SIZE: usize = 8;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        let start: u32 = read_le_at(data, offset)?;
        let word: u32 = read_le_at(data, offset)?;
        Ok(StringTableEntry {
            offset: start,
            length: word & 0x7FFF_FFFF,
            is_utf16: word >> 31 != 0,
        })
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        if self.length > 0x7FFF_FFFF {
            return Err(malformed_error!("string length {} too big", self.length));
        }
        write_le_at(data, offset, self.offset)?;
        write_le_at(data, offset, self.length | (u32::from(self.is_utf16) << 31))
    }
}

/// Location of one compiled regular expression in regexp storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegExpTableEntry {
    /// Offset into regexp storage
    pub offset: u32,
    /// Length in bytes
    pub length: u32,
}

impl Record for RegExpTableEntry {
    const SIZE: usize = 8;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        Ok(RegExpTableEntry {
            offset: read_le_at(data, offset)?,
            length: read_le_at(data, offset)?,
        })
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        write_le_at(data, offset, self.offset)?;
        write_le_at(data, offset, self.length)
    }
}

/// Dynamically resolved CJS module: the module's filename string and its function.
///
/// Statically resolved modules are plain u32 function indices instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CjsModuleEntry {
    /// String id of the module filename
    pub filename_id: u32,
    /// Index of the module's function
    pub function_id: u32,
}

impl Record for CjsModuleEntry {
    const SIZE: usize = 8;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        Ok(CjsModuleEntry {
            filename_id: read_le_at(data, offset)?,
            function_id: read_le_at(data, offset)?,
        })
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        write_le_at(data, offset, self.filename_id)?;
        write_le_at(data, offset, self.function_id)
    }
}
