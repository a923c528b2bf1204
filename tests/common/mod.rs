//! Minimal container writer for integration tests, built on the public record types.
#![allow(dead_code)]

use hbcscope::format::{
    BytecodeOptions, FileHeader, FunctionHeaderFlags, Record, SmallFuncHeader, SourceHash,
    BYTECODE_VERSION, FILE_HEADER_SIZE, MAGIC,
};

/// Size of an all-zero debug info header: no filenames, no regions, no debug data.
const EMPTY_DEBUG_INFO: usize = 20;

fn pad4(out: &mut Vec<u8>) {
    out.resize(out.len().next_multiple_of(4), 0);
}

/// A container with one plain function per entry of `sizes`, followed by `epilogue`.
///
/// Function `i` has `sizes[i]` bytes of bytecode, each set to `i + 1`.
pub fn container(sizes: &[u32], source: &[u8], epilogue: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; FILE_HEADER_SIZE];
    let headers_at = out.len();
    out.resize(headers_at + sizes.len() * SmallFuncHeader::SIZE, 0);

    for (index, &size) in sizes.iter().enumerate() {
        pad4(&mut out);
        let small = SmallFuncHeader {
            offset: u32::try_from(out.len()).unwrap(),
            param_count: 1,
            bytecode_size: size,
            frame_size: 1,
            flags: FunctionHeaderFlags::from_bits_retain(2),
            ..SmallFuncHeader::default()
        };
        out.extend(std::iter::repeat(index as u8 + 1).take(size as usize));
        small
            .write(&mut out, &mut (headers_at + index * SmallFuncHeader::SIZE))
            .unwrap();
    }

    pad4(&mut out);
    let debug_info_offset = u32::try_from(out.len()).unwrap();
    out.resize(out.len() + EMPTY_DEBUG_INFO, 0);

    let header = FileHeader {
        magic: MAGIC,
        version: BYTECODE_VERSION,
        source_hash: SourceHash::of_source(source),
        file_length: u32::try_from(out.len()).unwrap(),
        global_code_index: 0,
        function_count: u32::try_from(sizes.len()).unwrap(),
        string_kind_count: 0,
        identifier_count: 0,
        string_count: 0,
        overflow_string_count: 0,
        string_storage_size: 0,
        reg_exp_count: 0,
        reg_exp_storage_size: 0,
        array_buffer_size: 0,
        obj_key_buffer_size: 0,
        obj_value_buffer_size: 0,
        cjs_module_offset: 0,
        cjs_module_count: 0,
        debug_info_offset,
        options: BytecodeOptions::empty(),
    };
    header.write_to(&mut out).unwrap();
    out.extend_from_slice(epilogue);
    out
}
