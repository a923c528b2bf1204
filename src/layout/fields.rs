use std::ops::Range;

use crate::{
    format::{
        CjsModuleEntry, FileHeader, OverflowStringTableEntry, RegExpTableEntry, Section,
        SectionMut, SmallFuncHeader, SmallStringTableEntry, StringKindEntry,
    },
    layout::{Layout, SectionKind},
    Result,
};

/// The CJS module table; its record type is fixed by the container options.
#[derive(Debug, Clone, Copy)]
pub enum CjsModuleTable<'a> {
    /// Statically resolved modules: one function index each
    Static(Section<'a, u32>),
    /// Dynamically resolved modules: (filename string id, function id) pairs
    Dynamic(Section<'a, CjsModuleEntry>),
}

impl CjsModuleTable<'_> {
    /// Number of modules.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            CjsModuleTable::Static(section) => section.len(),
            CjsModuleTable::Dynamic(section) => section.len(),
        }
    }

    /// Returns `true` if the container has no CJS modules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The function implementing module `index`, whichever encoding is used.
    #[must_use]
    pub fn function_id(&self, index: usize) -> Option<u32> {
        match self {
            CjsModuleTable::Static(section) => section.get(index),
            CjsModuleTable::Dynamic(section) => section.get(index).map(|e| e.function_id),
        }
    }
}

/// Mutable counterpart of [`CjsModuleTable`].
pub enum CjsModuleTableMut<'a> {
    /// Statically resolved modules
    Static(SectionMut<'a, u32>),
    /// Dynamically resolved modules
    Dynamic(SectionMut<'a, CjsModuleEntry>),
}

/// Read-only, zero-copy views of every section of a container.
#[derive(Debug, Clone, Copy)]
#[allow(missing_docs)]
pub struct FileFields<'a> {
    pub header: &'a FileHeader,
    pub function_headers: Section<'a, SmallFuncHeader>,
    pub string_kinds: Section<'a, StringKindEntry>,
    pub identifier_translations: Section<'a, u32>,
    pub string_table: Section<'a, SmallStringTableEntry>,
    pub overflow_string_table: Section<'a, OverflowStringTableEntry>,
    pub string_storage: &'a [u8],
    pub array_buffer: &'a [u8],
    pub object_key_buffer: &'a [u8],
    pub object_value_buffer: &'a [u8],
    pub regexp_table: Section<'a, RegExpTableEntry>,
    pub regexp_storage: &'a [u8],
    pub cjs_module_table: CjsModuleTable<'a>,
}

impl<'a> FileFields<'a> {
    pub(crate) fn new(layout: &'a Layout, buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < layout.end() {
            return Err(internal_consistency_error!(
                "buffer of {} bytes is shorter than its layout ({} bytes)",
                buffer.len(),
                layout.end()
            ));
        }
        let bytes = |kind: SectionKind| &buffer[layout.range(kind)];

        let cjs = bytes(SectionKind::CjsModuleTable);
        let cjs_module_table = if layout.header().options.cjs_modules_statically_resolved() {
            CjsModuleTable::Static(Section::new(cjs)?)
        } else {
            CjsModuleTable::Dynamic(Section::new(cjs)?)
        };

        Ok(FileFields {
            header: layout.header(),
            function_headers: Section::new(bytes(SectionKind::FunctionHeaders))?,
            string_kinds: Section::new(bytes(SectionKind::StringKinds))?,
            identifier_translations: Section::new(bytes(SectionKind::IdentifierTranslations))?,
            string_table: Section::new(bytes(SectionKind::StringTable))?,
            overflow_string_table: Section::new(bytes(SectionKind::OverflowStringTable))?,
            string_storage: bytes(SectionKind::StringStorage),
            array_buffer: bytes(SectionKind::ArrayBuffer),
            object_key_buffer: bytes(SectionKind::ObjectKeyBuffer),
            object_value_buffer: bytes(SectionKind::ObjectValueBuffer),
            regexp_table: Section::new(bytes(SectionKind::RegExpTable))?,
            regexp_storage: bytes(SectionKind::RegExpStorage),
            cjs_module_table,
        })
    }
}

/// Hands out disjoint mutable slices of ascending, non-overlapping ranges.
struct Splitter<'a> {
    rest: &'a mut [u8],
    consumed: usize,
}

impl<'a> Splitter<'a> {
    fn take(&mut self, range: Range<usize>) -> Result<&'a mut [u8]> {
        let rest = std::mem::take(&mut self.rest);
        let Some(skip) = range.start.checked_sub(self.consumed) else {
            return Err(internal_consistency_error!(
                "section at {} overlaps the previous one ending at {}",
                range.start,
                self.consumed
            ));
        };
        if skip + range.len() > rest.len() {
            return Err(internal_consistency_error!(
                "section [{}, {}) exceeds the buffer",
                range.start,
                range.end
            ));
        }

        let (_, rest) = rest.split_at_mut(skip);
        let (section, rest) = rest.split_at_mut(range.len());
        self.rest = rest;
        self.consumed = range.end;
        Ok(section)
    }
}

/// Mutable views of every section over a caller-owned buffer.
///
/// Built from the same [`Layout`] as [`FileFields`]; each section borrows a disjoint part of
/// the buffer so they can be edited independently.
#[allow(missing_docs)]
pub struct FileFieldsMut<'a> {
    pub header: &'a FileHeader,
    pub function_headers: SectionMut<'a, SmallFuncHeader>,
    pub string_kinds: SectionMut<'a, StringKindEntry>,
    pub identifier_translations: SectionMut<'a, u32>,
    pub string_table: SectionMut<'a, SmallStringTableEntry>,
    pub overflow_string_table: SectionMut<'a, OverflowStringTableEntry>,
    pub string_storage: &'a mut [u8],
    pub array_buffer: &'a mut [u8],
    pub object_key_buffer: &'a mut [u8],
    pub object_value_buffer: &'a mut [u8],
    pub regexp_table: SectionMut<'a, RegExpTableEntry>,
    pub regexp_storage: &'a mut [u8],
    pub cjs_module_table: CjsModuleTableMut<'a>,
}

impl<'a> FileFieldsMut<'a> {
    pub(crate) fn new(layout: &'a Layout, buffer: &'a mut [u8]) -> Result<Self> {
        let mut splitter = Splitter {
            rest: buffer,
            consumed: 0,
        };

        let function_headers =
            SectionMut::new(splitter.take(layout.range(SectionKind::FunctionHeaders))?)?;
        let string_kinds = SectionMut::new(splitter.take(layout.range(SectionKind::StringKinds))?)?;
        let identifier_translations =
            SectionMut::new(splitter.take(layout.range(SectionKind::IdentifierTranslations))?)?;
        let string_table = SectionMut::new(splitter.take(layout.range(SectionKind::StringTable))?)?;
        let overflow_string_table =
            SectionMut::new(splitter.take(layout.range(SectionKind::OverflowStringTable))?)?;
        let string_storage = splitter.take(layout.range(SectionKind::StringStorage))?;
        let array_buffer = splitter.take(layout.range(SectionKind::ArrayBuffer))?;
        let object_key_buffer = splitter.take(layout.range(SectionKind::ObjectKeyBuffer))?;
        let object_value_buffer = splitter.take(layout.range(SectionKind::ObjectValueBuffer))?;
        let regexp_table = SectionMut::new(splitter.take(layout.range(SectionKind::RegExpTable))?)?;
        let regexp_storage = splitter.take(layout.range(SectionKind::RegExpStorage))?;

        let cjs = splitter.take(layout.range(SectionKind::CjsModuleTable))?;
        let cjs_module_table = if layout.header().options.cjs_modules_statically_resolved() {
            CjsModuleTableMut::Static(SectionMut::new(cjs)?)
        } else {
            CjsModuleTableMut::Dynamic(SectionMut::new(cjs)?)
        };

        Ok(FileFieldsMut {
            header: layout.header(),
            function_headers,
            string_kinds,
            identifier_translations,
            string_table,
            overflow_string_table,
            string_storage,
            array_buffer,
            object_key_buffer,
            object_value_buffer,
            regexp_table,
            regexp_storage,
            cjs_module_table,
        })
    }
}
