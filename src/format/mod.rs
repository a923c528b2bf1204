//! Binary layout of compiled bytecode containers.
//!
//! A container starts with a fixed 128-byte [`crate::format::FileHeader`] followed by a fixed,
//! versioned sequence of sections (see [`crate::layout`]). Every section holds elements of one
//! fixed-size record type, all little-endian and none requiring more than 4-byte alignment.
//!
//! # Key Components
//!
//! - [`crate::format::FileHeader`] and [`crate::format::validate`] - Header decoding and the
//!   validation gate run before any section is touched
//! - [`crate::format::Record`], [`crate::format::Section`], [`crate::format::SectionMut`] -
//!   Typed, zero-copy views over a run of records
//! - Function records: [`crate::format::SmallFuncHeader`], [`crate::format::FunctionHeader`],
//!   [`crate::format::RuntimeFunctionHeader`], [`crate::format::ExceptionHandlerInfo`],
//!   [`crate::format::DebugOffsets`]
//! - String records: [`crate::format::StringKindEntry`], [`crate::format::SmallStringTableEntry`],
//!   [`crate::format::OverflowStringTableEntry`], [`crate::format::StringTableEntry`]
//! - Misc tables: [`crate::format::RegExpTableEntry`], [`crate::format::CjsModuleEntry`]

mod function;
mod header;
mod record;
mod strings;

pub use function::{
    DebugOffsets, ExceptionHandlerInfo, FunctionHeader, FunctionHeaderFlags, ProhibitInvoke,
    RuntimeFunctionHeader, SmallFuncHeader,
};
pub use header::{bytecode_stream_sanity_check, validate, FileHeader, SourceHash};
pub use record::{Record, Section, SectionIter, SectionMut};
pub use strings::{
    CjsModuleEntry, OverflowStringTableEntry, RegExpTableEntry, SmallStringTableEntry, StringKind,
    StringKindEntry, StringTableEntry,
};

use bitflags::bitflags;

/// Magic number of an executable container.
pub const MAGIC: u64 = 0x1F19_03C1_03BC_1FC6;

/// Magic number of a delta (patch) container.
pub const DELTA_MAGIC: u64 = !MAGIC;

/// The only bytecode version this reader accepts.
pub const BYTECODE_VERSION: u32 = 74;

/// Size of the fixed file header at offset 0.
pub const FILE_HEADER_SIZE: usize = 128;

/// Number of bytes of the SHA-1 source hash stored in the header.
pub const SOURCE_HASH_SIZE: usize = 20;

/// Every section starts at a multiple of this many bytes.
pub const SECTION_ALIGNMENT: usize = 4;

/// Which flavour of container a buffer is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumIter)]
pub enum BytecodeForm {
    /// A complete, executable container
    #[default]
    Execution,
    /// A delta container to be applied on top of a previous execution container
    Delta,
}

impl BytecodeForm {
    /// The magic number a header of this form carries.
    #[must_use]
    pub fn magic(self) -> u64 {
        match self {
            BytecodeForm::Execution => MAGIC,
            BytecodeForm::Delta => DELTA_MAGIC,
        }
    }
}

bitflags! {
    /// Container-wide compilation options stored in the header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct BytecodeOptions: u8 {
        /// Builtins were resolved statically by the compiler
        const STATIC_BUILTINS = 0b0000_0001;
        /// The CJS module table holds function indices instead of (filename, function) pairs
        const CJS_MODULES_STATICALLY_RESOLVED = 0b0000_0010;
        /// The container contains async functions
        const HAS_ASYNC = 0b0000_0100;
    }
}

impl BytecodeOptions {
    /// Returns `true` if CJS modules were resolved to function indices at compile time.
    #[must_use]
    pub fn cjs_modules_statically_resolved(self) -> bool {
        self.contains(BytecodeOptions::CJS_MODULES_STATICALLY_RESOLVED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forms_use_distinct_magics() {
        assert_eq!(BytecodeForm::Execution.magic(), MAGIC);
        assert_eq!(BytecodeForm::Delta.magic(), DELTA_MAGIC);
        assert_ne!(MAGIC, DELTA_MAGIC);
        assert_eq!(BytecodeForm::default(), BytecodeForm::Execution);
    }

    #[test]
    fn options_keep_unknown_bits() {
        let options = BytecodeOptions::from_bits_retain(0b1000_0010);
        assert!(options.cjs_modules_statically_resolved());
        assert!(!options.contains(BytecodeOptions::HAS_ASYNC));
        assert_eq!(options.bits(), 0b1000_0010);
    }
}
