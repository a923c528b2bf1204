//! Debug information: filenames, file regions and per-function source location streams.
//!
//! The debug info region starts at the header's `debug_info_offset`:
//!
//! | Part | Size |
//! |---|---|
//! | [`DebugInfoHeader`] | 20 bytes |
//! | filename table | `filename_count` x 8-byte [`StringTableEntry`] |
//! | filename storage | `filename_storage_size` bytes |
//! | file regions | `file_region_count` x 12-byte [`DebugFileRegion`], not aligned |
//! | debug data | `debug_data_size` bytes |
//!
//! Debug data bytes before `lexical_data_offset` are the source location streams, the rest is
//! lexical scope data which this crate hands out as raw bytes.
//!
//! A function's stream (located by its [`crate::format::DebugOffsets`]) is a sequence of signed
//! LEB128 values: function index, start line and start column, followed by records of
//! `(address delta, line delta, column delta[, statement delta])`. Bit 0 of the encoded line
//! delta announces the statement delta and the line delta itself is the remaining bits. An
//! address delta of -1 ends the stream.

use std::{ops::Range, sync::Arc};

use widestring::U16Str;

use crate::{
    file::{
        io::{read_le_at, write_le_at},
        parser::Parser,
        Backend,
    },
    format::{Record, StringTableEntry},
    Error, Result,
};

/// Header of the debug info region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugInfoHeader {
    /// Number of filename table entries
    pub filename_count: u32,
    /// Byte size of filename storage
    pub filename_storage_size: u32,
    /// Number of file regions
    pub file_region_count: u32,
    /// Offset of the lexical data within the debug data
    pub lexical_data_offset: u32,
    /// Byte size of the debug data
    pub debug_data_size: u32,
}

impl Record for DebugInfoHeader {
    const SIZE: usize = 20;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        Ok(DebugInfoHeader {
            filename_count: read_le_at(data, offset)?,
            filename_storage_size: read_le_at(data, offset)?,
            file_region_count: read_le_at(data, offset)?,
            lexical_data_offset: read_le_at(data, offset)?,
            debug_data_size: read_le_at(data, offset)?,
        })
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        for value in [
            self.filename_count,
            self.filename_storage_size,
            self.file_region_count,
            self.lexical_data_offset,
            self.debug_data_size,
        ] {
            write_le_at(data, offset, value)?;
        }
        Ok(())
    }
}

/// Maps the source location streams starting at `from_address` to one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugFileRegion {
    /// First debug data offset covered by this region
    pub from_address: u32,
    /// Filename table index
    pub filename_id: u32,
    /// Filename table index of the source map URL
    pub source_mapping_url_id: u32,
}

impl Record for DebugFileRegion {
    const SIZE: usize = 12;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        Ok(DebugFileRegion {
            from_address: read_le_at(data, offset)?,
            filename_id: read_le_at(data, offset)?,
            source_mapping_url_id: read_le_at(data, offset)?,
        })
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        write_le_at(data, offset, self.from_address)?;
        write_le_at(data, offset, self.filename_id)?;
        write_le_at(data, offset, self.source_mapping_url_id)
    }
}

/// A fully decoded source location record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugSourceLocation {
    /// Bytecode offset within the function
    pub address: u32,
    /// Filename table index, if a file region covers the stream
    pub filename_id: Option<u32>,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
    /// Statement counter within the function
    pub statement: u32,
}

/// Source position of a bytecode address, with the filename resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Source file name; empty if no file region covers the function
    pub file: String,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

/// Decoded view of the debug info region.
///
/// Filenames and debug data stay in the container buffer; only the file regions are copied
/// out, since they are not guaranteed to be aligned.
pub struct DebugInfo {
    data: Arc<dyn Backend>,
    filename_table: Range<usize>,
    filename_storage: Range<usize>,
    files: Vec<DebugFileRegion>,
    lexical_data_offset: usize,
    debug_data: Range<usize>,
}

impl std::fmt::Debug for DebugInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugInfo")
            .field("filenames", &self.filename_count())
            .field("files", &self.files)
            .field("lexical_data_offset", &self.lexical_data_offset)
            .field("debug_data", &self.debug_data)
            .finish_non_exhaustive()
    }
}

impl DebugInfo {
    /// Decode the debug info region at `offset` of `data`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if any part of the region lies outside the buffer or the
    /// lexical data offset points past the debug data.
    pub fn read(data: Arc<dyn Backend>, offset: usize) -> Result<Self> {
        let truncated = |_| malformed_error!("debug info at offset {} is truncated", offset);
        let buffer = data.data();
        let mut parser = Parser::at(buffer, offset).map_err(truncated)?;

        let mut cursor = parser.pos();
        let header = DebugInfoHeader::read(buffer, &mut cursor).map_err(truncated)?;
        parser.seek(cursor)?;

        let filename_table = take_range(&mut parser, header.filename_count as usize * 8)
            .map_err(truncated)?;
        let filename_storage = take_range(&mut parser, header.filename_storage_size as usize)
            .map_err(truncated)?;

        let mut files = Vec::with_capacity((header.file_region_count as usize).min(1024));
        let mut cursor = parser.pos();
        for _ in 0..header.file_region_count {
            files.push(DebugFileRegion::read(buffer, &mut cursor).map_err(truncated)?);
        }
        parser.seek(cursor)?;

        let debug_data =
            take_range(&mut parser, header.debug_data_size as usize).map_err(truncated)?;
        if header.lexical_data_offset > header.debug_data_size {
            return Err(malformed_error!(
                "lexical data offset {} is beyond the {} bytes of debug data",
                header.lexical_data_offset,
                header.debug_data_size
            ));
        }

        Ok(DebugInfo {
            filename_table,
            filename_storage,
            files,
            lexical_data_offset: header.lexical_data_offset as usize,
            debug_data,
            data,
        })
    }

    /// Number of filename table entries.
    #[must_use]
    pub fn filename_count(&self) -> usize {
        self.filename_table.len() / StringTableEntry::SIZE
    }

    /// The file regions, ordered by `from_address`.
    #[must_use]
    pub fn file_regions(&self) -> &[DebugFileRegion] {
        &self.files
    }

    /// All debug data.
    #[must_use]
    pub fn debug_data(&self) -> &[u8] {
        &self.data.data()[self.debug_data.clone()]
    }

    /// The source location streams.
    #[must_use]
    pub fn source_locations_data(&self) -> &[u8] {
        &self.debug_data()[..self.lexical_data_offset]
    }

    /// The lexical scope data.
    #[must_use]
    pub fn lexical_data(&self) -> &[u8] {
        &self.debug_data()[self.lexical_data_offset..]
    }

    /// Decode filename `id`. Latin-1 names are widened, UTF-16 names decoded lossily.
    ///
    /// Returns `None` if `id` or the entry's storage range is out of bounds.
    #[must_use]
    pub fn filename_by_id(&self, id: u32) -> Option<String> {
        let table = self
            .data
            .data_slice(self.filename_table.start, self.filename_table.len())
            .ok()?;
        let storage = self
            .data
            .data_slice(self.filename_storage.start, self.filename_storage.len())
            .ok()?;

        let mut offset = (id as usize).checked_mul(StringTableEntry::SIZE)?;
        let entry = StringTableEntry::read(table, &mut offset).ok()?;
        let start = entry.offset as usize;
        let bytes = storage.get(start..start.checked_add(entry.byte_len())?)?;

        Some(decode_string(bytes, entry.is_utf16))
    }

    /// Filename of the stream starting at `debug_offset`: the last file region starting at
    /// or before it.
    #[must_use]
    pub fn filename_for_address(&self, debug_offset: u32) -> Option<u32> {
        self.files
            .iter()
            .take_while(|region| region.from_address <= debug_offset)
            .last()
            .map(|region| region.filename_id)
    }

    /// Iterate the source location records of the stream at `debug_offset`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if `debug_offset` is outside the source location data or
    /// the stream prologue is truncated.
    pub fn locations(&self, debug_offset: u32) -> Result<LocationStream<'_>> {
        let data = self.source_locations_data();
        let mut parser = Parser::at(data, debug_offset as usize).map_err(|_| {
            malformed_error!(
                "source location offset {} is outside the {} bytes of location data",
                debug_offset,
                data.len()
            )
        })?;

        let function_index = parser.read_sleb128()?;
        let line = parser.read_sleb128()?;
        let column = parser.read_sleb128()?;

        Ok(LocationStream {
            parser,
            filename_id: self.filename_for_address(debug_offset),
            function_index,
            address: 0,
            line,
            column,
            statement: 0,
            done: false,
        })
    }

    /// The location recorded for exactly `offset_in_function`, in the stream at
    /// `debug_offset`.
    ///
    /// Streams are ordered by address, so the scan stops at the first greater address.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the stream is damaged before a match is found.
    pub fn location_for_address(
        &self,
        debug_offset: u32,
        offset_in_function: u32,
    ) -> Result<Option<DebugSourceLocation>> {
        for location in self.locations(debug_offset)? {
            let location = location?;
            if location.address == offset_in_function {
                return Ok(Some(location));
            }
            if location.address > offset_in_function {
                break;
            }
        }
        Ok(None)
    }

    /// Like [`DebugInfo::location_for_address`], with the filename resolved.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the stream is damaged before a match is found.
    pub fn source_location_for_address(
        &self,
        debug_offset: u32,
        offset_in_function: u32,
    ) -> Result<Option<SourceLocation>> {
        Ok(self
            .location_for_address(debug_offset, offset_in_function)?
            .map(|location| SourceLocation {
                file: location
                    .filename_id
                    .and_then(|id| self.filename_by_id(id))
                    .unwrap_or_default(),
                line: location.line,
                column: location.column,
            }))
    }
}

/// Iterator over one function's source location records.
pub struct LocationStream<'a> {
    parser: Parser<'a>,
    filename_id: Option<u32>,
    function_index: i64,
    address: i64,
    line: i64,
    column: i64,
    statement: i64,
    done: bool,
}

impl LocationStream<'_> {
    /// Function index recorded in the stream prologue.
    #[must_use]
    pub fn function_index(&self) -> i64 {
        self.function_index
    }

    fn next_location(&mut self) -> Result<Option<DebugSourceLocation>> {
        let address_delta = self.parser.read_sleb128()?;
        if address_delta == -1 {
            return Ok(None);
        }

        let line_delta = self.parser.read_sleb128()?;
        let column_delta = self.parser.read_sleb128()?;
        if line_delta & 1 != 0 {
            self.statement = self.statement.wrapping_add(self.parser.read_sleb128()?);
        }

        self.address = self.address.wrapping_add(address_delta);
        self.line = self.line.wrapping_add(line_delta >> 1);
        self.column = self.column.wrapping_add(column_delta);

        Ok(Some(DebugSourceLocation {
            address: to_u32(self.address, "address")?,
            filename_id: self.filename_id,
            line: to_u32(self.line, "line")?,
            column: to_u32(self.column, "column")?,
            statement: to_u32(self.statement, "statement")?,
        }))
    }
}

impl Iterator for LocationStream<'_> {
    type Item = Result<DebugSourceLocation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let next = self.next_location();
        if !matches!(next, Ok(Some(_))) {
            self.done = true;
        }
        next.transpose()
    }
}

fn to_u32(value: i64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| malformed_error!("source location {} {} out of range", what, value))
}

fn take_range(parser: &mut Parser<'_>, len: usize) -> Result<Range<usize>> {
    let start = parser.pos();
    parser.advance_by(len)?;
    Ok(start..parser.pos())
}

/// Decode string storage bytes: Latin-1 or little-endian UTF-16 code units.
pub(crate) fn decode_string(bytes: &[u8], is_utf16: bool) -> String {
    if is_utf16 {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        U16Str::from_slice(&units).to_string_lossy()
    } else {
        bytes.iter().map(|&b| char::from(b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{file::Memory, test::ContainerBuilder, test::FunctionSpec};

    fn debug_info(data: Vec<u8>) -> DebugInfo {
        let header = crate::format::FileHeader::read(&data).unwrap();
        DebugInfo::read(Arc::new(Memory::new(data)), header.debug_info_offset as usize).unwrap()
    }

    fn offsets(data: &[u8], function: u32) -> u32 {
        let layout = crate::layout::layout(data, crate::BytecodeForm::Execution).unwrap();
        let fields = layout.fields(data).unwrap();
        let small = fields.function_headers.get(function as usize).unwrap();
        let mut cursor = crate::utils::align_up(small.info_offset as usize, 4).unwrap();
        crate::format::DebugOffsets::read(data, &mut cursor)
            .unwrap()
            .source_locations
    }

    #[test]
    fn decodes_filenames_and_regions() {
        let data = ContainerBuilder::new()
            .function_spec(FunctionSpec::new(8).locations("main.js", &[(0, 1, 1)]))
            .function_spec(FunctionSpec::new(8).locations("lib.js", &[(0, 4, 2)]))
            .build();
        let info = debug_info(data);

        assert_eq!(info.filename_count(), 2);
        assert_eq!(info.filename_by_id(0).as_deref(), Some("main.js"));
        assert_eq!(info.filename_by_id(1).as_deref(), Some("lib.js"));
        assert_eq!(info.filename_by_id(2), None);
        assert_eq!(info.file_regions().len(), 2);
        assert!(info.lexical_data().is_empty());
    }

    #[test]
    fn exact_address_lookup() {
        let data = ContainerBuilder::new()
            .function_spec(
                FunctionSpec::new(32).locations("a.js", &[(0, 1, 1), (4, 2, 5), (9, 2, 9)]),
            )
            .build();
        let debug_offset = offsets(&data, 0);
        let info = debug_info(data);

        let location = info.location_for_address(debug_offset, 4).unwrap().unwrap();
        assert_eq!((location.line, location.column), (2, 5));
        assert_eq!(location.statement, 1);
        assert_eq!(location.filename_id, Some(0));

        let location = info.location_for_address(debug_offset, 9).unwrap().unwrap();
        assert_eq!((location.line, location.column, location.statement), (2, 9, 2));

        assert_eq!(info.location_for_address(debug_offset, 5).unwrap(), None);
        assert_eq!(info.location_for_address(debug_offset, 100).unwrap(), None);

        let resolved = info
            .source_location_for_address(debug_offset, 4)
            .unwrap()
            .unwrap();
        assert_eq!(
            resolved,
            SourceLocation {
                file: "a.js".to_string(),
                line: 2,
                column: 5
            }
        );
    }

    #[test]
    fn stream_iteration() {
        let data = ContainerBuilder::new()
            .function(4)
            .function_spec(FunctionSpec::new(16).locations("b.js", &[(0, 10, 1), (2, 8, 3)]))
            .build();
        let debug_offset = offsets(&data, 1);
        let info = debug_info(data);

        let stream = info.locations(debug_offset).unwrap();
        assert_eq!(stream.function_index(), 1);
        let all: Vec<_> = stream.map(|l| l.unwrap()).collect();
        assert_eq!(all.len(), 2);
        assert_eq!((all[1].address, all[1].line, all[1].column), (2, 8, 3));
    }

    #[test]
    fn filename_region_lookup() {
        let data = ContainerBuilder::new()
            .function_spec(FunctionSpec::new(8).locations("x.js", &[(0, 1, 1)]))
            .function_spec(FunctionSpec::new(8).locations("y.js", &[(0, 1, 1)]))
            .build();
        let second = offsets(&data, 1);
        let info = debug_info(data);

        assert_eq!(info.filename_for_address(0), Some(0));
        assert_eq!(info.filename_for_address(second), Some(1));
        assert_eq!(info.filename_for_address(u32::MAX), Some(1));
    }

    #[test]
    fn truncated_region_is_malformed() {
        let data = ContainerBuilder::new()
            .function_spec(FunctionSpec::new(8).locations("x.js", &[(0, 1, 1)]))
            .build();
        let header = crate::format::FileHeader::read(&data).unwrap();
        let cut = header.debug_info_offset as usize + 10;
        let result = DebugInfo::read(
            Arc::new(Memory::new(data[..cut].to_vec())),
            header.debug_info_offset as usize,
        );
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn utf16_names() {
        let bytes: Vec<u8> = "héllo"
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        assert_eq!(decode_string(&bytes, true), "héllo");
        assert_eq!(decode_string(&[0x68, 0xE9], false), "hé");
    }
}
