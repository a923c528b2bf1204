//! Section layout of a validated container.
//!
//! After the file header, a container holds a fixed sequence of sections. Each starts at the
//! next 4-byte boundary after the previous one and holds `count` fixed-size elements, where
//! the count (or byte size for blobs) comes from the header. A zero-count section still
//! realigns the cursor, so every start offset depends only on the sections before it.
//!
//! [`layout`] walks that sequence once and records one byte range per [`SectionKind`] in a
//! [`Layout`]. The layout owns no data; [`Layout::fields`] and [`Layout::fields_mut`] turn it
//! into typed views over a buffer.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hbcscope::layout::{layout, SectionKind};
//! use hbcscope::BytecodeForm;
//!
//! let data = std::fs::read("index.hbc")?;
//! let layout = layout(&data, BytecodeForm::Execution)?;
//! for kind in SectionKind::all() {
//!     println!("{kind}: {:?}", layout.range(kind));
//! }
//!
//! let fields = layout.fields(&data)?;
//! assert_eq!(fields.function_headers.len() as u32, layout.header().function_count);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod fields;

pub use fields::{CjsModuleTable, CjsModuleTableMut, FileFields, FileFieldsMut};

use std::ops::Range;

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    format::{
        validate, BytecodeForm, CjsModuleEntry, FileHeader, OverflowStringTableEntry, Record,
        RegExpTableEntry, SmallFuncHeader, SmallStringTableEntry, StringKindEntry,
        FILE_HEADER_SIZE, SECTION_ALIGNMENT,
    },
    utils::align_up,
    Result,
};

/// The sections of a container, in file order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::EnumIter,
    strum::EnumCount,
    strum::Display,
)]
pub enum SectionKind {
    /// One [`SmallFuncHeader`] per function
    FunctionHeaders,
    /// Run-length encoded [`StringKindEntry`] records
    StringKinds,
    /// One u32 hash per identifier
    IdentifierTranslations,
    /// One [`SmallStringTableEntry`] per string
    StringTable,
    /// [`OverflowStringTableEntry`] records for strings that did not fit
    OverflowStringTable,
    /// Raw string characters
    StringStorage,
    /// Serialized array literals
    ArrayBuffer,
    /// Serialized object literal keys
    ObjectKeyBuffer,
    /// Serialized object literal values
    ObjectValueBuffer,
    /// One [`RegExpTableEntry`] per regular expression
    RegExpTable,
    /// Compiled regular expression bytecode
    RegExpStorage,
    /// CJS modules, static or dynamic depending on the container options
    CjsModuleTable,
}

impl SectionKind {
    /// Every section in file order.
    pub fn all() -> impl Iterator<Item = SectionKind> {
        SectionKind::iter()
    }
}

/// Shape of one section as declared by the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDescriptor {
    /// Size of one element in bytes
    pub element_size: usize,
    /// Alignment the element type needs
    pub alignment: usize,
    /// Number of elements
    pub count: u32,
}

impl SectionDescriptor {
    fn of<T: Record>(count: u32) -> Self {
        let () = T::ASSERT_ALIGN;
        SectionDescriptor {
            element_size: T::SIZE,
            alignment: T::ALIGN,
            count,
        }
    }

    fn bytes(size: u32) -> Self {
        SectionDescriptor {
            element_size: 1,
            alignment: 1,
            count: size,
        }
    }

    /// Describe `kind` as declared by `header`.
    #[must_use]
    pub fn for_section(kind: SectionKind, header: &FileHeader) -> Self {
        match kind {
            SectionKind::FunctionHeaders => Self::of::<SmallFuncHeader>(header.function_count),
            SectionKind::StringKinds => Self::of::<StringKindEntry>(header.string_kind_count),
            SectionKind::IdentifierTranslations => Self::of::<u32>(header.identifier_count),
            SectionKind::StringTable => Self::of::<SmallStringTableEntry>(header.string_count),
            SectionKind::OverflowStringTable => {
                Self::of::<OverflowStringTableEntry>(header.overflow_string_count)
            }
            SectionKind::StringStorage => Self::bytes(header.string_storage_size),
            SectionKind::ArrayBuffer => Self::bytes(header.array_buffer_size),
            SectionKind::ObjectKeyBuffer => Self::bytes(header.obj_key_buffer_size),
            SectionKind::ObjectValueBuffer => Self::bytes(header.obj_value_buffer_size),
            SectionKind::RegExpTable => Self::of::<RegExpTableEntry>(header.reg_exp_count),
            SectionKind::RegExpStorage => Self::bytes(header.reg_exp_storage_size),
            SectionKind::CjsModuleTable => {
                if header.options.cjs_modules_statically_resolved() {
                    Self::of::<u32>(header.cjs_module_count)
                } else {
                    Self::of::<CjsModuleEntry>(header.cjs_module_count)
                }
            }
        }
    }

    /// Total byte length, or `None` on overflow.
    #[must_use]
    pub fn byte_len(&self) -> Option<usize> {
        (self.count as usize).checked_mul(self.element_size)
    }
}

/// Byte ranges of every section of one container, plus its decoded header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    header: FileHeader,
    sections: [Range<usize>; SectionKind::COUNT],
}

impl Layout {
    /// The decoded file header.
    #[must_use]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Byte range of `kind` within the buffer.
    #[must_use]
    pub fn range(&self, kind: SectionKind) -> Range<usize> {
        self.sections[kind as usize].clone()
    }

    /// Offset one past the last section.
    #[must_use]
    pub fn end(&self) -> usize {
        self.sections[SectionKind::COUNT - 1].end
    }

    /// Read-only typed views over `buffer`, which must be the buffer this layout came from.
    ///
    /// # Errors
    /// Returns [`crate::Error::InternalConsistency`] if `buffer` is too short for the layout.
    pub fn fields<'a>(&'a self, buffer: &'a [u8]) -> Result<FileFields<'a>> {
        FileFields::new(self, buffer)
    }

    /// Mutable typed views over `buffer`, which must be laid out like the buffer this layout
    /// came from.
    ///
    /// # Errors
    /// Returns [`crate::Error::InternalConsistency`] if `buffer` is too short for the layout.
    pub fn fields_mut<'a>(&'a self, buffer: &'a mut [u8]) -> Result<FileFieldsMut<'a>> {
        FileFieldsMut::new(self, buffer)
    }
}

/// Validate `buffer` as a container of the given form and locate all of its sections.
///
/// # Errors
/// Propagates every failure of [`validate`]. Returns [`crate::Error::InternalConsistency`]
/// if a section declared by the header extends past the end of the buffer.
pub fn layout(buffer: &[u8], form: BytecodeForm) -> Result<Layout> {
    validate(buffer, form)?;
    let header = FileHeader::read(buffer)?;

    let mut sections: [Range<usize>; SectionKind::COUNT] = std::array::from_fn(|_| 0..0);
    let mut cursor = FILE_HEADER_SIZE;
    for kind in SectionKind::iter() {
        let descriptor = SectionDescriptor::for_section(kind, &header);
        debug_assert!(descriptor.alignment <= SECTION_ALIGNMENT);

        let start = align_up(cursor, SECTION_ALIGNMENT);
        let end = start.zip(descriptor.byte_len()).and_then(|(s, l)| s.checked_add(l));
        let (Some(start), Some(end)) = (start, end) else {
            return Err(internal_consistency_error!("{} section size overflows", kind));
        };
        if end > buffer.len() {
            return Err(internal_consistency_error!(
                "{} section [{}, {}) exceeds the {}-byte buffer",
                kind,
                start,
                end,
                buffer.len()
            ));
        }

        sections[kind as usize] = start..end;
        cursor = end;
    }

    tracing::debug!(
        functions = header.function_count,
        strings = header.string_count,
        identifiers = header.identifier_count,
        len = buffer.len(),
        "laid out bytecode container"
    );

    Ok(Layout { header, sections })
}
