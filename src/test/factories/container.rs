//! Factory for well-formed bytecode containers.
//!
//! [`ContainerBuilder`] lays out a complete container the way the compiler does: header,
//! the twelve sections, function bodies with their info blocks, then the debug info region
//! and an optional epilogue.

use crate::{
    debuginfo::{DebugFileRegion, DebugInfoHeader},
    format::{
        BytecodeOptions, CjsModuleEntry, DebugOffsets, ExceptionHandlerInfo, FileHeader,
        FunctionHeader, FunctionHeaderFlags, OverflowStringTableEntry, Record, RegExpTableEntry,
        SmallFuncHeader, SmallStringTableEntry, SourceHash, StringKind, StringKindEntry,
        StringTableEntry, BYTECODE_VERSION, FILE_HEADER_SIZE, MAGIC,
    },
};

/// One function of a container under construction.
#[derive(Debug, Clone, Default)]
pub struct FunctionSpec {
    size: u32,
    handlers: Vec<(u32, u32, u32)>,
    locations: Option<(String, Vec<(u32, u32, u32)>)>,
    overflowed: bool,
}

impl FunctionSpec {
    /// A function with `size` bytes of bytecode.
    pub fn new(size: u32) -> Self {
        FunctionSpec {
            size,
            ..FunctionSpec::default()
        }
    }

    /// Exception handlers as `(start, end, target)`, in table order.
    pub fn handlers(mut self, handlers: &[(u32, u32, u32)]) -> Self {
        self.handlers = handlers.to_vec();
        self
    }

    /// Source locations as `(address, line, column)`, ascending by address.
    pub fn locations(mut self, file: &str, locations: &[(u32, u32, u32)]) -> Self {
        self.locations = Some((file.to_string(), locations.to_vec()));
        self
    }

    /// Store the header out of line.
    pub fn overflowed(mut self) -> Self {
        self.overflowed = true;
        self
    }
}

#[derive(Debug, Clone)]
struct StringSpec {
    text: String,
    utf16: bool,
    identifier: bool,
    force_overflow: bool,
}

#[derive(Debug, Clone)]
enum CjsSpec {
    Static(Vec<u32>),
    Dynamic(Vec<(u32, u32)>),
}

/// Builds container bytes for tests.
#[derive(Debug, Clone, Default)]
pub struct ContainerBuilder {
    functions: Vec<FunctionSpec>,
    strings: Vec<StringSpec>,
    array_buffer: Vec<u8>,
    object_keys: Vec<u8>,
    object_values: Vec<u8>,
    regexps: Vec<Vec<u8>>,
    cjs: Option<CjsSpec>,
    epilogue: Vec<u8>,
    source: Vec<u8>,
    global_code_index: u32,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        ContainerBuilder::default()
    }

    /// A plain function with `size` bytes of bytecode.
    pub fn function(self, size: u32) -> Self {
        self.function_spec(FunctionSpec::new(size))
    }

    pub fn function_spec(mut self, spec: FunctionSpec) -> Self {
        self.functions.push(spec);
        self
    }

    pub fn global_code_index(mut self, index: u32) -> Self {
        self.global_code_index = index;
        self
    }

    fn push_string(mut self, text: &str, utf16: bool, identifier: bool, force: bool) -> Self {
        self.strings.push(StringSpec {
            text: text.to_string(),
            utf16,
            identifier,
            force_overflow: force,
        });
        self
    }

    /// A Latin-1 string literal.
    pub fn string(self, text: &str) -> Self {
        self.push_string(text, false, false, false)
    }

    /// A string literal stored as UTF-16.
    pub fn utf16_string(self, text: &str) -> Self {
        self.push_string(text, true, false, false)
    }

    /// An identifier, which also gets an identifier translation entry.
    pub fn identifier(self, text: &str) -> Self {
        self.push_string(text, false, true, false)
    }

    /// A string literal stored through the overflow table.
    pub fn overflow_string(self, text: &str) -> Self {
        self.push_string(text, false, false, true)
    }

    pub fn array_buffer(mut self, bytes: &[u8]) -> Self {
        self.array_buffer = bytes.to_vec();
        self
    }

    pub fn object_keys(mut self, bytes: &[u8]) -> Self {
        self.object_keys = bytes.to_vec();
        self
    }

    pub fn object_values(mut self, bytes: &[u8]) -> Self {
        self.object_values = bytes.to_vec();
        self
    }

    pub fn regexp(mut self, bytecode: &[u8]) -> Self {
        self.regexps.push(bytecode.to_vec());
        self
    }

    /// Statically resolved CJS modules; sets the container option.
    pub fn cjs_static(mut self, function_ids: &[u32]) -> Self {
        self.cjs = Some(CjsSpec::Static(function_ids.to_vec()));
        self
    }

    /// Dynamically resolved CJS modules as `(filename_id, function_id)`.
    pub fn cjs_dynamic(mut self, modules: &[(u32, u32)]) -> Self {
        self.cjs = Some(CjsSpec::Dynamic(modules.to_vec()));
        self
    }

    /// Bytes appended after the declared file length.
    pub fn epilogue(mut self, bytes: &[u8]) -> Self {
        self.epilogue = bytes.to_vec();
        self
    }

    /// Source text whose SHA-1 goes into the header.
    pub fn source(mut self, source: &[u8]) -> Self {
        self.source = source.to_vec();
        self
    }

    /// Lay out the container.
    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; FILE_HEADER_SIZE];
        let mut header = FileHeader {
            magic: MAGIC,
            version: BYTECODE_VERSION,
            source_hash: SourceHash::of_source(&self.source),
            file_length: 0,
            global_code_index: self.global_code_index,
            function_count: count(self.functions.len()),
            string_kind_count: 0,
            identifier_count: 0,
            string_count: count(self.strings.len()),
            overflow_string_count: 0,
            string_storage_size: 0,
            reg_exp_count: count(self.regexps.len()),
            reg_exp_storage_size: 0,
            array_buffer_size: count(self.array_buffer.len()),
            obj_key_buffer_size: count(self.object_keys.len()),
            obj_value_buffer_size: count(self.object_values.len()),
            cjs_module_offset: 0,
            cjs_module_count: 0,
            debug_info_offset: 0,
            options: BytecodeOptions::empty(),
        };

        pad4(&mut out);
        let function_headers_at = out.len();
        out.resize(out.len() + self.functions.len() * SmallFuncHeader::SIZE, 0);

        let (kinds, identifiers, table, overflow, storage) = self.string_sections();
        header.string_kind_count = count(kinds.len());
        header.identifier_count = count(identifiers.len());
        header.overflow_string_count = count(overflow.len());
        header.string_storage_size = count(storage.len());

        pad4(&mut out);
        kinds.iter().for_each(|k| push_record(&mut out, k));
        pad4(&mut out);
        identifiers.iter().for_each(|i| push_record(&mut out, i));
        pad4(&mut out);
        table.iter().for_each(|e| push_record(&mut out, e));
        pad4(&mut out);
        overflow.iter().for_each(|e| push_record(&mut out, e));
        pad4(&mut out);
        out.extend_from_slice(&storage);
        pad4(&mut out);
        out.extend_from_slice(&self.array_buffer);
        pad4(&mut out);
        out.extend_from_slice(&self.object_keys);
        pad4(&mut out);
        out.extend_from_slice(&self.object_values);

        let mut regexp_storage = Vec::new();
        pad4(&mut out);
        for regexp in &self.regexps {
            let entry = RegExpTableEntry {
                offset: count(regexp_storage.len()),
                length: count(regexp.len()),
            };
            push_record(&mut out, &entry);
            regexp_storage.extend_from_slice(regexp);
        }
        header.reg_exp_storage_size = count(regexp_storage.len());
        pad4(&mut out);
        out.extend_from_slice(&regexp_storage);

        pad4(&mut out);
        match &self.cjs {
            Some(CjsSpec::Static(ids)) => {
                header.options |= BytecodeOptions::CJS_MODULES_STATICALLY_RESOLVED;
                header.cjs_module_count = count(ids.len());
                ids.iter().for_each(|id| push_record(&mut out, id));
            }
            Some(CjsSpec::Dynamic(modules)) => {
                header.cjs_module_count = count(modules.len());
                for &(filename_id, function_id) in modules {
                    push_record(
                        &mut out,
                        &CjsModuleEntry {
                            filename_id,
                            function_id,
                        },
                    );
                }
            }
            None => {}
        }

        let mut filenames: Vec<String> = Vec::new();
        let mut regions = Vec::new();
        let mut locations = Vec::new();
        for (index, function) in self.functions.iter().enumerate() {
            pad4(&mut out);
            let body = count(out.len());
            out.extend(std::iter::repeat((index as u8).wrapping_add(1)).take(function.size as usize));

            let mut flags = FunctionHeaderFlags::from_bits_retain(2);
            if !function.handlers.is_empty() {
                flags |= FunctionHeaderFlags::HAS_EXCEPTION_HANDLER;
            }
            if function.locations.is_some() {
                flags |= FunctionHeaderFlags::HAS_DEBUG_INFO;
            }

            pad4(&mut out);
            let small = if function.overflowed {
                let large_at = out.len();
                let large = FunctionHeader {
                    offset: body,
                    param_count: 1,
                    bytecode_size: function.size,
                    function_name: 0,
                    info_offset: count(large_at + FunctionHeader::SIZE),
                    frame_size: 200,
                    environment_size: 1000,
                    highest_read_cache_index: 0,
                    highest_write_cache_index: 0,
                    flags,
                };
                push_record(&mut out, &large);
                SmallFuncHeader::overflowed_at(large_at, flags).unwrap()
            } else {
                SmallFuncHeader {
                    offset: body,
                    param_count: 1,
                    bytecode_size: function.size,
                    function_name: 0,
                    info_offset: count(out.len()),
                    frame_size: 4,
                    environment_size: 0,
                    highest_read_cache_index: 0,
                    highest_write_cache_index: 0,
                    flags,
                }
            };

            if !function.handlers.is_empty() {
                pad4(&mut out);
                push_record(&mut out, &count(function.handlers.len()));
                for &(start, end, target) in &function.handlers {
                    push_record(&mut out, &ExceptionHandlerInfo { start, end, target });
                }
            }

            if let Some((file, points)) = &function.locations {
                let filename_id = match filenames.iter().position(|f| f == file) {
                    Some(id) => id,
                    None => {
                        filenames.push(file.clone());
                        filenames.len() - 1
                    }
                };
                let stream_at = count(locations.len());
                regions.push(DebugFileRegion {
                    from_address: stream_at,
                    filename_id: count(filename_id),
                    source_mapping_url_id: 0,
                });
                encode_locations(&mut locations, index, points);

                pad4(&mut out);
                push_record(
                    &mut out,
                    &DebugOffsets {
                        source_locations: stream_at,
                        lexical_data: DebugOffsets::NO_OFFSET,
                    },
                );
            }

            let mut cursor = function_headers_at + index * SmallFuncHeader::SIZE;
            small.write(&mut out, &mut cursor).unwrap();
        }

        pad4(&mut out);
        header.debug_info_offset = count(out.len());
        let mut filename_storage = Vec::new();
        let mut filename_table = Vec::new();
        for name in &filenames {
            filename_table.push(StringTableEntry {
                offset: count(filename_storage.len()),
                length: count(name.len()),
                is_utf16: false,
            });
            filename_storage.extend_from_slice(name.as_bytes());
        }
        push_record(
            &mut out,
            &DebugInfoHeader {
                filename_count: count(filename_table.len()),
                filename_storage_size: count(filename_storage.len()),
                file_region_count: count(regions.len()),
                lexical_data_offset: count(locations.len()),
                debug_data_size: count(locations.len()),
            },
        );
        filename_table.iter().for_each(|e| push_record(&mut out, e));
        out.extend_from_slice(&filename_storage);
        regions.iter().for_each(|r| push_record(&mut out, r));
        out.extend_from_slice(&locations);

        header.file_length = count(out.len());
        header.write_to(&mut out).unwrap();
        out.extend_from_slice(&self.epilogue);
        out
    }

    #[allow(clippy::type_complexity)]
    fn string_sections(
        &self,
    ) -> (
        Vec<StringKindEntry>,
        Vec<u32>,
        Vec<SmallStringTableEntry>,
        Vec<OverflowStringTableEntry>,
        Vec<u8>,
    ) {
        let mut kinds: Vec<(StringKind, u32)> = Vec::new();
        let mut identifiers = Vec::new();
        let mut table = Vec::new();
        let mut overflow = Vec::new();
        let mut storage = Vec::new();

        for string in &self.strings {
            let kind = if string.identifier {
                StringKind::Identifier
            } else {
                StringKind::String
            };
            match kinds.last_mut() {
                Some((last, run)) if *last == kind => *run += 1,
                _ => kinds.push((kind, 1)),
            }
            if string.identifier {
                identifiers.push(string.text.bytes().fold(17u32, |h, b| {
                    h.wrapping_mul(31).wrapping_add(u32::from(b))
                }));
            }

            let offset = count(storage.len());
            let length = if string.utf16 {
                let units: Vec<u16> = string.text.encode_utf16().collect();
                units
                    .iter()
                    .for_each(|u| storage.extend_from_slice(&u.to_le_bytes()));
                count(units.len())
            } else {
                storage.extend(string.text.chars().map(|c| c as u8));
                count(string.text.chars().count())
            };

            if string.force_overflow
                || length >= SmallStringTableEntry::INVALID_LENGTH
                || offset > SmallStringTableEntry::MAX_OFFSET
            {
                table.push(SmallStringTableEntry::overflowed(
                    string.utf16,
                    count(overflow.len()),
                ));
                overflow.push(OverflowStringTableEntry { offset, length });
            } else {
                table.push(SmallStringTableEntry {
                    is_utf16: string.utf16,
                    offset,
                    length,
                });
            }
        }

        let kinds = kinds
            .into_iter()
            .map(|(kind, run)| StringKindEntry::new(kind, run).unwrap())
            .collect();
        (kinds, identifiers, table, overflow, storage)
    }
}

fn count(value: usize) -> u32 {
    u32::try_from(value).unwrap()
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn push_record<T: Record>(out: &mut Vec<u8>, record: &T) {
    let mut cursor = out.len();
    out.resize(cursor + T::SIZE, 0);
    record.write(out, &mut cursor).unwrap();
}

fn push_sleb128(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Encode a location stream; record `i` carries statement `i`.
fn encode_locations(out: &mut Vec<u8>, function: usize, points: &[(u32, u32, u32)]) {
    let (mut address, mut line, mut column) = points
        .first()
        .map_or((0, 1, 1), |&(_, line, column)| (0, i64::from(line), i64::from(column)));
    push_sleb128(out, function as i64);
    push_sleb128(out, line);
    push_sleb128(out, column);

    for (index, &(at, to_line, to_column)) in points.iter().enumerate() {
        let line_delta = i64::from(to_line) - line;
        let has_statement = index > 0;
        push_sleb128(out, i64::from(at) - address);
        push_sleb128(out, (line_delta << 1) | i64::from(has_statement));
        push_sleb128(out, i64::from(to_column) - column);
        if has_statement {
            push_sleb128(out, 1);
        }
        address = i64::from(at);
        line = i64::from(to_line);
        column = i64::from(to_column);
    }
    push_sleb128(out, -1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::parser::Parser;

    #[test]
    fn sleb128_matches_parser() {
        let mut out = Vec::new();
        for value in [0, 1, -1, 63, 64, -64, -65, 1 << 20, -(1 << 40)] {
            push_sleb128(&mut out, value);
        }
        let mut parser = Parser::new(&out);
        for value in [0, 1, -1, 63, 64, -64, -65, 1 << 20, -(1 << 40)] {
            assert_eq!(parser.read_sleb128().unwrap(), value);
        }
    }

    #[test]
    fn header_is_valid() {
        let data = ContainerBuilder::new().function(1).epilogue(b"tail").build();
        let header = FileHeader::read(&data).unwrap();
        assert_eq!(header.file_length as usize, data.len() - 4);
        assert!(crate::format::bytecode_stream_sanity_check(&data).is_ok());
    }
}
