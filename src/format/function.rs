//! Per-function records: compact and large function headers, exception handlers and debug
//! offsets.
//!
//! Every function owns one [`SmallFuncHeader`] in the function header section. When a field
//! does not fit its bitfield the compiler sets [`FunctionHeaderFlags::OVERFLOWED`] and stores
//! a full [`FunctionHeader`] out of line; the small header's `offset` and `info_offset` then
//! combine into the large header's position. [`RuntimeFunctionHeader`] hides the difference.
//!
//! The function's info block follows its large header (or starts at `info_offset` for
//! compact functions). It holds, each 4-byte aligned and in this order, an optional exception
//! handler table and optional [`DebugOffsets`].

use bitflags::bitflags;

use crate::{
    file::io::{read_le_at, write_le_at},
    format::Record,
    Result,
};

bitflags! {
    /// Flags byte shared by [`SmallFuncHeader`] and [`FunctionHeader`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct FunctionHeaderFlags: u8 {
        /// Two-bit [`ProhibitInvoke`] field
        const PROHIBIT_INVOKE = 0b0000_0011;
        /// The function is in strict mode
        const STRICT_MODE = 0b0000_0100;
        /// The info block carries an exception handler table
        const HAS_EXCEPTION_HANDLER = 0b0000_1000;
        /// The info block carries [`DebugOffsets`]
        const HAS_DEBUG_INFO = 0b0001_0000;
        /// The compact header redirects to a large header
        const OVERFLOWED = 0b0010_0000;
    }
}

/// How a function may not be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum ProhibitInvoke {
    /// May not be called, only constructed
    Call = 0,
    /// May not be constructed, only called
    Construct = 1,
    /// No restriction
    None = 2,
}

impl FunctionHeaderFlags {
    /// Decode the two-bit invoke restriction; `None` for the unused value 3.
    #[must_use]
    pub fn prohibit_invoke(self) -> Option<ProhibitInvoke> {
        ProhibitInvoke::from_repr(self.bits() & Self::PROHIBIT_INVOKE.bits())
    }

    /// Returns `true` if the function is in strict mode.
    #[must_use]
    pub fn strict_mode(self) -> bool {
        self.contains(Self::STRICT_MODE)
    }

    /// Returns `true` if the info block carries an exception handler table.
    #[must_use]
    pub fn has_exception_handler(self) -> bool {
        self.contains(Self::HAS_EXCEPTION_HANDLER)
    }

    /// Returns `true` if the info block carries debug offsets.
    #[must_use]
    pub fn has_debug_info(self) -> bool {
        self.contains(Self::HAS_DEBUG_INFO)
    }

    /// Returns `true` if the compact header redirects to a large header.
    #[must_use]
    pub fn overflowed(self) -> bool {
        self.contains(Self::OVERFLOWED)
    }
}

/// Packs `value` into `bits` bits at `shift`, rejecting values that do not fit.
fn pack(word: &mut u32, value: u32, bits: u32, shift: u32, field: &str) -> Result<()> {
    let mask = (1u32 << bits) - 1;
    if value > mask {
        return Err(malformed_error!(
            "{} {} does not fit in {} bits",
            field,
            value,
            bits
        ));
    }

    *word |= value << shift;
    Ok(())
}

fn unpack(word: u32, bits: u32, shift: u32) -> u32 {
    (word >> shift) & ((1u32 << bits) - 1)
}

/// Compact 16-byte function header.
///
/// | Word | Bits |
/// |---|---|
/// | 0 | `offset`:25, `param_count`:7 |
/// | 1 | `bytecode_size`:15, `function_name`:17 |
/// | 2 | `info_offset`:25, `frame_size`:7 |
/// | 3 | `environment_size`, `highest_read_cache_index`, `highest_write_cache_index`, `flags` (u8 each) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct SmallFuncHeader {
    pub offset: u32,
    pub param_count: u32,
    pub bytecode_size: u32,
    pub function_name: u32,
    pub info_offset: u32,
    pub frame_size: u32,
    pub environment_size: u8,
    pub highest_read_cache_index: u8,
    pub highest_write_cache_index: u8,
    pub flags: FunctionHeaderFlags,
}

impl SmallFuncHeader {
    /// Position of the large header of an overflowed function.
    #[must_use]
    pub fn large_header_offset(&self) -> usize {
        ((self.info_offset as usize) << 16) | self.offset as usize
    }

    /// Compact header redirecting to a large header at `large_offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `large_offset` is beyond the addressable range.
    #[allow(clippy::cast_possible_truncation)]
    pub fn overflowed_at(large_offset: usize, flags: FunctionHeaderFlags) -> Result<Self> {
        let wide = u64::try_from(large_offset).unwrap_or(u64::MAX);
        if wide >= 1 << 41 {
            return Err(malformed_error!(
                "large header offset {} too big",
                large_offset
            ));
        }

        Ok(SmallFuncHeader {
            offset: (wide & 0xFFFF) as u32,
            info_offset: (wide >> 16) as u32,
            flags: flags | FunctionHeaderFlags::OVERFLOWED,
            ..SmallFuncHeader::default()
        })
    }
}

impl Record for SmallFuncHeader {
    const SIZE: usize = 16;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        let word0: u32 = read_le_at(data, offset)?;
        let word1: u32 = read_le_at(data, offset)?;
        let word2: u32 = read_le_at(data, offset)?;

        Ok(SmallFuncHeader {
            offset: unpack(word0, 25, 0),
            param_count: unpack(word0, 7, 25),
            bytecode_size: unpack(word1, 15, 0),
            function_name: unpack(word1, 17, 15),
            info_offset: unpack(word2, 25, 0),
            frame_size: unpack(word2, 7, 25),
            environment_size: read_le_at(data, offset)?,
            highest_read_cache_index: read_le_at(data, offset)?,
            highest_write_cache_index: read_le_at(data, offset)?,
            flags: FunctionHeaderFlags::from_bits_retain(read_le_at(data, offset)?),
        })
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        let mut word0 = 0;
        pack(&mut word0, self.offset, 25, 0, "offset")?;
        pack(&mut word0, self.param_count, 7, 25, "param_count")?;
        let mut word1 = 0;
        pack(&mut word1, self.bytecode_size, 15, 0, "bytecode_size")?;
        pack(&mut word1, self.function_name, 17, 15, "function_name")?;
        let mut word2 = 0;
        pack(&mut word2, self.info_offset, 25, 0, "info_offset")?;
        pack(&mut word2, self.frame_size, 7, 25, "frame_size")?;

        write_le_at(data, offset, word0)?;
        write_le_at(data, offset, word1)?;
        write_le_at(data, offset, word2)?;
        write_le_at(data, offset, self.environment_size)?;
        write_le_at(data, offset, self.highest_read_cache_index)?;
        write_le_at(data, offset, self.highest_write_cache_index)?;
        write_le_at(data, offset, self.flags.bits())
    }
}

/// Full 32-byte function header used when a compact header overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct FunctionHeader {
    pub offset: u32,
    pub param_count: u32,
    pub bytecode_size: u32,
    pub function_name: u32,
    pub info_offset: u32,
    pub frame_size: u32,
    pub environment_size: u32,
    pub highest_read_cache_index: u8,
    pub highest_write_cache_index: u8,
    pub flags: FunctionHeaderFlags,
}

impl Record for FunctionHeader {
    const SIZE: usize = 32;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        let header = FunctionHeader {
            offset: read_le_at(data, offset)?,
            param_count: read_le_at(data, offset)?,
            bytecode_size: read_le_at(data, offset)?,
            function_name: read_le_at(data, offset)?,
            info_offset: read_le_at(data, offset)?,
            frame_size: read_le_at(data, offset)?,
            environment_size: read_le_at(data, offset)?,
            highest_read_cache_index: read_le_at(data, offset)?,
            highest_write_cache_index: read_le_at(data, offset)?,
            flags: FunctionHeaderFlags::from_bits_retain(read_le_at(data, offset)?),
        };
        // padding
        read_le_at::<u8>(data, offset)?;
        Ok(header)
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        for value in [
            self.offset,
            self.param_count,
            self.bytecode_size,
            self.function_name,
            self.info_offset,
            self.frame_size,
            self.environment_size,
        ] {
            write_le_at(data, offset, value)?;
        }
        write_le_at(data, offset, self.highest_read_cache_index)?;
        write_le_at(data, offset, self.highest_write_cache_index)?;
        write_le_at(data, offset, self.flags.bits())?;
        write_le_at(data, offset, 0u8)
    }
}

/// A function header normalized over its two physical encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFunctionHeader {
    /// The compact header held everything
    Small(SmallFuncHeader),
    /// The compact header overflowed; this is the out-of-line large header
    Large(FunctionHeader),
}

impl RuntimeFunctionHeader {
    /// Offset of the function's bytecode from the start of the container.
    #[must_use]
    pub fn offset(&self) -> u32 {
        match self {
            RuntimeFunctionHeader::Small(h) => h.offset,
            RuntimeFunctionHeader::Large(h) => h.offset,
        }
    }

    /// Size of the function's bytecode in bytes.
    #[must_use]
    pub fn bytecode_size_in_bytes(&self) -> u32 {
        match self {
            RuntimeFunctionHeader::Small(h) => h.bytecode_size,
            RuntimeFunctionHeader::Large(h) => h.bytecode_size,
        }
    }

    /// Number of declared parameters, including `this`.
    #[must_use]
    pub fn param_count(&self) -> u32 {
        match self {
            RuntimeFunctionHeader::Small(h) => h.param_count,
            RuntimeFunctionHeader::Large(h) => h.param_count,
        }
    }

    /// String id of the function name.
    #[must_use]
    pub fn function_name(&self) -> u32 {
        match self {
            RuntimeFunctionHeader::Small(h) => h.function_name,
            RuntimeFunctionHeader::Large(h) => h.function_name,
        }
    }

    /// Offset of the function's info block.
    #[must_use]
    pub fn info_offset(&self) -> u32 {
        match self {
            RuntimeFunctionHeader::Small(h) => h.info_offset,
            RuntimeFunctionHeader::Large(h) => h.info_offset,
        }
    }

    /// Number of registers.
    #[must_use]
    pub fn frame_size(&self) -> u32 {
        match self {
            RuntimeFunctionHeader::Small(h) => h.frame_size,
            RuntimeFunctionHeader::Large(h) => h.frame_size,
        }
    }

    /// Number of environment slots.
    #[must_use]
    pub fn environment_size(&self) -> u32 {
        match self {
            RuntimeFunctionHeader::Small(h) => u32::from(h.environment_size),
            RuntimeFunctionHeader::Large(h) => h.environment_size,
        }
    }

    /// Highest property read cache index used by the function.
    #[must_use]
    pub fn highest_read_cache_index(&self) -> u8 {
        match self {
            RuntimeFunctionHeader::Small(h) => h.highest_read_cache_index,
            RuntimeFunctionHeader::Large(h) => h.highest_read_cache_index,
        }
    }

    /// Highest property write cache index used by the function.
    #[must_use]
    pub fn highest_write_cache_index(&self) -> u8 {
        match self {
            RuntimeFunctionHeader::Small(h) => h.highest_write_cache_index,
            RuntimeFunctionHeader::Large(h) => h.highest_write_cache_index,
        }
    }

    /// The function's flags.
    #[must_use]
    pub fn flags(&self) -> FunctionHeaderFlags {
        match self {
            RuntimeFunctionHeader::Small(h) => h.flags,
            RuntimeFunctionHeader::Large(h) => h.flags,
        }
    }
}

/// One exception handler: bytecode range `[start, end)` jumps to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExceptionHandlerInfo {
    /// First covered bytecode offset
    pub start: u32,
    /// One past the last covered bytecode offset
    pub end: u32,
    /// Handler offset
    pub target: u32,
}

impl ExceptionHandlerInfo {
    /// Returns `true` if `offset` lies in `[start, end)`.
    #[must_use]
    pub fn covers(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }
}

impl Record for ExceptionHandlerInfo {
    const SIZE: usize = 12;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        Ok(ExceptionHandlerInfo {
            start: read_le_at(data, offset)?,
            end: read_le_at(data, offset)?,
            target: read_le_at(data, offset)?,
        })
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        write_le_at(data, offset, self.start)?;
        write_le_at(data, offset, self.end)?;
        write_le_at(data, offset, self.target)
    }
}

/// Offsets of a function's data inside the debug info region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugOffsets {
    /// Offset of the function's source location stream in the debug data
    pub source_locations: u32,
    /// Offset of the function's lexical data in the debug data
    pub lexical_data: u32,
}

impl DebugOffsets {
    /// Marks an absent stream.
    pub const NO_OFFSET: u32 = u32::MAX;

    /// The source location offset, unless absent.
    #[must_use]
    pub fn source_locations(&self) -> Option<u32> {
        (self.source_locations != Self::NO_OFFSET).then_some(self.source_locations)
    }

    /// The lexical data offset, unless absent.
    #[must_use]
    pub fn lexical_data(&self) -> Option<u32> {
        (self.lexical_data != Self::NO_OFFSET).then_some(self.lexical_data)
    }
}

impl Default for DebugOffsets {
    fn default() -> Self {
        DebugOffsets {
            source_locations: Self::NO_OFFSET,
            lexical_data: Self::NO_OFFSET,
        }
    }
}

impl Record for DebugOffsets {
    const SIZE: usize = 8;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        Ok(DebugOffsets {
            source_locations: read_le_at(data, offset)?,
            lexical_data: read_le_at(data, offset)?,
        })
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        write_le_at(data, offset, self.source_locations)?;
        write_le_at(data, offset, self.lexical_data)
    }
}
