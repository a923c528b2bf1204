//! The long-lived owner of a bytecode container.
//!
//! A [`BytecodeProvider`] takes ownership of a buffer, validates and lays it out once, and then
//! answers structured queries about it for as long as the engine runs. Construction never
//! fails: a buffer that does not validate yields an *invalid* provider that keeps the reason,
//! and every query on it returns [`Error::Unavailable`].
//!
//! # Architecture
//!
//! - The buffer lives behind an `Arc<dyn Backend>` so the warmup worker can read it
//!   without borrowing the provider.
//! - The [`Layout`] stores section ranges, not slices; typed views are rebuilt on demand
//!   through [`BytecodeProvider::fields`] and borrow from the provider.
//! - Debug info and the virtual offset table are computed on first use and cached in
//!   [`OnceLock`]s, which makes concurrent first calls safe and allocates once.
//! - Residency advice lives in `residency`, background warmup in `warmup`.
//!
//! # Thread Safety
//!
//! [`BytecodeProvider`] is [`Send`] and [`Sync`]. All queries take `&self`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hbcscope::BytecodeProvider;
//!
//! let provider = BytecodeProvider::from_file("index.hbc")?;
//! provider.start_warmup(50);
//!
//! let global = provider.global_function_index()?;
//! let header = provider.function_header(global)?;
//! println!("global function: {} bytes at {:#x}", header.bytecode_size_in_bytes(), header.offset());
//!
//! if let Some(handler) = provider.find_catch_target_offset(global, 12)? {
//!     println!("exception at 12 is caught at {handler}");
//! }
//! provider.stop_warmup();
//! # Ok::<(), hbcscope::Error>(())
//! ```

mod config;
mod residency;
mod warmup;

pub use config::{Hardening, ProviderConfig};

use std::{
    path::Path,
    sync::{Arc, Mutex, OnceLock},
};

use crate::{
    debuginfo::{decode_string, DebugInfo, SourceLocation},
    file::{parser::Parser, Backend, Memory, Physical},
    format::{
        BytecodeOptions, DebugOffsets, ExceptionHandlerInfo, FileHeader, FunctionHeader, Record,
        RegExpTableEntry, RuntimeFunctionHeader, Section, SmallFuncHeader, SourceHash,
        StringKindEntry, StringTableEntry, SECTION_ALIGNMENT,
    },
    layout::{layout, CjsModuleTable, FileFields, Layout},
    Error, Result,
};

use warmup::Warmup;

enum State {
    Valid(Layout),
    Invalid(String),
}

/// Owns a bytecode container and answers queries about it.
pub struct BytecodeProvider {
    data: Arc<dyn Backend>,
    state: State,
    config: ProviderConfig,
    debug_info: OnceLock<std::result::Result<DebugInfo, String>>,
    virtual_offsets: OnceLock<std::result::Result<Vec<u32>, String>>,
    warmup: Mutex<Option<Warmup>>,
}

impl std::fmt::Debug for BytecodeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BytecodeProvider")
            .field("len", &self.data.len())
            .field("valid", &self.is_valid())
            .field("error", &self.error())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BytecodeProvider {
    /// Take ownership of an in-memory container.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hbcscope::{BytecodeProvider, Error};
    ///
    /// let provider = BytecodeProvider::from_mem(vec![0u8; 16]);
    /// assert!(!provider.is_valid());
    /// assert!(matches!(provider.function_count(), Err(Error::Unavailable(_))));
    /// ```
    #[must_use]
    pub fn from_mem(data: Vec<u8>) -> Self {
        Self::from_mem_with_config(data, ProviderConfig::default())
    }

    /// Take ownership of an in-memory container, using `config`.
    #[must_use]
    pub fn from_mem_with_config(data: Vec<u8>, config: ProviderConfig) -> Self {
        Self::from_backend_with_config(Arc::new(Memory::new(data)), config)
    }

    /// Memory-map a container from disk.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if the file cannot be opened or mapped. A file that opens
    /// but does not validate produces an invalid provider instead.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_config(path, ProviderConfig::default())
    }

    /// Memory-map a container from disk, using `config`.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if the file cannot be opened or mapped.
    pub fn from_file_with_config(path: impl AsRef<Path>, config: ProviderConfig) -> Result<Self> {
        let mapped = Physical::new(path)?;
        Ok(Self::from_backend_with_config(Arc::new(mapped), config))
    }

    /// Take shared ownership of any backend.
    #[must_use]
    pub fn from_backend(data: Arc<dyn Backend>) -> Self {
        Self::from_backend_with_config(data, ProviderConfig::default())
    }

    /// Take shared ownership of any backend, using `config`.
    #[must_use]
    pub fn from_backend_with_config(data: Arc<dyn Backend>, config: ProviderConfig) -> Self {
        let state = match layout(data.data(), config.form) {
            Ok(layout) => State::Valid(layout),
            Err(error) => {
                tracing::warn!(
                    len = data.len(),
                    form = %config.form,
                    %error,
                    "bytecode container rejected"
                );
                State::Invalid(error.to_string())
            }
        };

        BytecodeProvider {
            data,
            state,
            config,
            debug_info: OnceLock::new(),
            virtual_offsets: OnceLock::new(),
            warmup: Mutex::new(None),
        }
    }

    /// Returns `true` if the container validated and was laid out.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self.state, State::Valid(_))
    }

    /// The reason the container was rejected, if it was.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            State::Valid(_) => None,
            State::Invalid(reason) => Some(reason),
        }
    }

    /// The configuration this provider was built with.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// The whole container buffer, epilogue included.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// The section layout.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn layout(&self) -> Result<&Layout> {
        match &self.state {
            State::Valid(layout) => Ok(layout),
            State::Invalid(reason) => Err(Error::Unavailable(reason.clone())),
        }
    }

    /// Typed views of every section.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn fields(&self) -> Result<FileFields<'_>> {
        self.layout()?.fields(self.data.data())
    }

    /// The decoded file header.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn header(&self) -> Result<&FileHeader> {
        Ok(self.layout()?.header())
    }

    /// Number of functions.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn function_count(&self) -> Result<u32> {
        Ok(self.header()?.function_count)
    }

    /// Index of the global (entry) function.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn global_function_index(&self) -> Result<u32> {
        Ok(self.header()?.global_code_index)
    }

    /// Container options.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn options(&self) -> Result<BytecodeOptions> {
        Ok(self.header()?.options)
    }

    /// Number of strings.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn string_count(&self) -> Result<u32> {
        Ok(self.header()?.string_count)
    }

    fn small_header(&self, id: u32) -> Result<SmallFuncHeader> {
        let fields = self.fields()?;
        let count = fields.header.function_count;
        fields
            .function_headers
            .get(id as usize)
            .ok_or(Error::FunctionOutOfRange { id, count })
    }

    /// The header of function `id`, whichever encoding the container used.
    ///
    /// # Errors
    /// Returns [`Error::FunctionOutOfRange`] if `id` is not below the function count, and
    /// [`Error::Malformed`] if an overflowed header points outside the buffer.
    pub fn function_header(&self, id: u32) -> Result<RuntimeFunctionHeader> {
        resolve_function_header(self.data.data(), self.small_header(id)?)
    }

    /// The bytecode of function `id`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the bytecode range lies outside the buffer.
    pub fn function_bytecode(&self, id: u32) -> Result<&[u8]> {
        let header = self.function_header(id)?;
        self.data
            .data_slice(
                header.offset() as usize,
                header.bytecode_size_in_bytes() as usize,
            )
            .map_err(|_| malformed_error!("bytecode of function {} is out of bounds", id))
    }

    /// The exception handler table and debug offsets of function `id`.
    ///
    /// The function's info block follows its large header when overflowed and starts at
    /// `info_offset` otherwise. The exception table, then the debug offsets, each 4-byte
    /// aligned, are read only when the corresponding flag is set.
    ///
    /// # Errors
    /// Returns [`Error::FunctionOutOfRange`] for a bad `id` and [`Error::Malformed`] if the
    /// info block lies outside the buffer.
    pub fn exception_table_and_debug_offsets(
        &self,
        id: u32,
    ) -> Result<(Section<'_, ExceptionHandlerInfo>, Option<DebugOffsets>)> {
        let small = self.small_header(id)?;
        let data = self.data.data();

        read_info_block(data, &small).map_err(|error| match error {
            Error::OutOfBounds => {
                malformed_error!("info block of function {} lies outside the buffer", id)
            }
            other => other,
        })
    }

    /// The exception handler table of function `id`, empty if it has none.
    ///
    /// # Errors
    /// See [`BytecodeProvider::exception_table_and_debug_offsets`].
    pub fn exception_table(&self, id: u32) -> Result<Section<'_, ExceptionHandlerInfo>> {
        Ok(self.exception_table_and_debug_offsets(id)?.0)
    }

    /// The debug offsets of function `id`, if it has any.
    ///
    /// # Errors
    /// See [`BytecodeProvider::exception_table_and_debug_offsets`].
    pub fn debug_offsets(&self, id: u32) -> Result<Option<DebugOffsets>> {
        Ok(self.exception_table_and_debug_offsets(id)?.1)
    }

    /// The handler for an exception thrown at `exception_offset` in function `id`.
    ///
    /// Scans the exception table in order and returns the target of the first handler whose
    /// `[start, end)` range contains the offset. Nested handlers are expressed by table order.
    ///
    /// # Errors
    /// See [`BytecodeProvider::exception_table_and_debug_offsets`].
    pub fn find_catch_target_offset(&self, id: u32, exception_offset: u32) -> Result<Option<u32>> {
        Ok(self
            .exception_table(id)?
            .iter()
            .find(|handler| handler.covers(exception_offset))
            .map(|handler| handler.target))
    }

    /// Sum of the bytecode sizes of all functions before `id`.
    ///
    /// Gives each function a stable start in one flat address space. The prefix sums are
    /// computed once, on first call; the sum wraps at `u32::MAX`.
    ///
    /// # Errors
    /// Returns [`Error::FunctionOutOfRange`] for a bad `id` and [`Error::Malformed`] if any
    /// function header is damaged.
    pub fn virtual_offset_for_function(&self, id: u32) -> Result<u32> {
        let count = self.function_count()?;
        if id >= count {
            return Err(Error::FunctionOutOfRange { id, count });
        }

        let offsets = self.virtual_offsets.get_or_init(|| {
            let mut offsets = Vec::with_capacity(count as usize);
            let mut sum = 0u32;
            for function in 0..count {
                offsets.push(sum);
                let header = self.function_header(function).map_err(|e| e.to_string())?;
                sum = sum.wrapping_add(header.bytecode_size_in_bytes());
            }
            Ok(offsets)
        });

        match offsets {
            Ok(offsets) => Ok(offsets[id as usize]),
            Err(reason) => Err(malformed_error!("{}", reason)),
        }
    }

    /// The debug info region, decoded on first use.
    ///
    /// Concurrent first calls decode it once and all observe the same result.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider and [`Error::Malformed`] if the
    /// region is damaged.
    pub fn debug_info(&self) -> Result<&DebugInfo> {
        let offset = self.header()?.debug_info_offset as usize;
        let debug_info = self.debug_info.get_or_init(|| {
            let result = DebugInfo::read(Arc::clone(&self.data), offset);
            tracing::debug!(offset, ok = result.is_ok(), "decoded debug info");
            result.map_err(|e| e.to_string())
        });

        debug_info
            .as_ref()
            .map_err(|reason| malformed_error!("{}", reason))
    }

    /// Source position of bytecode offset `offset_in_function` in function `id`.
    ///
    /// Returns `None` if the function has no source locations or none is recorded for exactly
    /// this offset.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the function's info block or the debug info is damaged.
    pub fn location_for_address(
        &self,
        id: u32,
        offset_in_function: u32,
    ) -> Result<Option<SourceLocation>> {
        let Some(source_locations) = self
            .debug_offsets(id)?
            .and_then(|offsets| offsets.source_locations())
        else {
            return Ok(None);
        };

        self.debug_info()?
            .source_location_for_address(source_locations, offset_in_function)
    }

    /// SHA-1 of the source the container was compiled from.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn source_hash(&self) -> Result<SourceHash> {
        Ok(self.header()?.source_hash)
    }

    /// Bytes after the declared file length.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider, and [`Error::Malformed`] if the
    /// declared length exceeds the buffer.
    pub fn epilogue(&self) -> Result<&[u8]> {
        self.layout()?;
        Self::epilogue_from_bytecode(self.data.data())
    }

    /// Source hash of a raw container, without building a provider.
    ///
    /// # Errors
    /// Returns [`Error::TooSmall`] if `buffer` cannot hold the header.
    pub fn source_hash_from_bytecode(buffer: &[u8]) -> Result<SourceHash> {
        Ok(FileHeader::read(buffer)?.source_hash)
    }

    /// Epilogue of a raw container, without building a provider.
    ///
    /// # Errors
    /// Returns [`Error::TooSmall`] if `buffer` cannot hold the header, and
    /// [`Error::Malformed`] if the declared file length exceeds the buffer.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use hbcscope::{format::FileHeader, BytecodeProvider};
    ///
    /// let data = std::fs::read("index.hbc")?;
    /// let header = FileHeader::read(&data)?;
    /// let epilogue = BytecodeProvider::epilogue_from_bytecode(&data)?;
    /// assert_eq!(header.file_length as usize + epilogue.len(), data.len());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn epilogue_from_bytecode(buffer: &[u8]) -> Result<&[u8]> {
        let file_length = FileHeader::read(buffer)?.file_length as usize;
        buffer.get(file_length..).ok_or_else(|| {
            malformed_error!(
                "declared file length {} exceeds the {}-byte buffer",
                file_length,
                buffer.len()
            )
        })
    }

    /// Run-length encoded string kinds.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn string_kinds(&self) -> Result<Section<'_, StringKindEntry>> {
        Ok(self.fields()?.string_kinds)
    }

    /// Identifier hashes, one per identifier string.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn identifier_translations(&self) -> Result<Section<'_, u32>> {
        Ok(self.fields()?.identifier_translations)
    }

    /// The resolved table entry of string `id`, following overflow redirection.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if `id` is not below the string count, and
    /// [`Error::Malformed`] if an overflowed entry points past the overflow table.
    pub fn string_table_entry(&self, id: u32) -> Result<StringTableEntry> {
        let fields = self.fields()?;
        let small = fields
            .string_table
            .get(id as usize)
            .ok_or(Error::OutOfBounds)?;

        if !small.is_overflowed() {
            return Ok(StringTableEntry {
                offset: small.offset,
                length: small.length,
                is_utf16: small.is_utf16,
            });
        }

        let overflow = fields
            .overflow_string_table
            .get(small.offset as usize)
            .ok_or_else(|| {
                malformed_error!(
                    "string {} points to overflow entry {} of {}",
                    id,
                    small.offset,
                    fields.overflow_string_table.len()
                )
            })?;
        Ok(StringTableEntry {
            offset: overflow.offset,
            length: overflow.length,
            is_utf16: small.is_utf16,
        })
    }

    /// Raw storage bytes of string `id`: Latin-1 bytes or little-endian UTF-16 code units.
    ///
    /// # Errors
    /// See [`BytecodeProvider::string_table_entry`]; also [`Error::Malformed`] if the
    /// characters lie outside string storage.
    pub fn string_bytes(&self, id: u32) -> Result<&[u8]> {
        let entry = self.string_table_entry(id)?;
        let storage = self.fields()?.string_storage;
        let start = entry.offset as usize;
        start
            .checked_add(entry.byte_len())
            .and_then(|end| storage.get(start..end))
            .ok_or_else(|| malformed_error!("string {} lies outside string storage", id))
    }

    /// String `id`, decoded.
    ///
    /// # Errors
    /// See [`BytecodeProvider::string_bytes`].
    pub fn string(&self, id: u32) -> Result<String> {
        let entry = self.string_table_entry(id)?;
        Ok(decode_string(self.string_bytes(id)?, entry.is_utf16))
    }

    /// The regular expression table.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn regexp_table(&self) -> Result<Section<'_, RegExpTableEntry>> {
        Ok(self.fields()?.regexp_table)
    }

    /// Compiled bytecode of regular expression `index`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] for a bad `index` and [`Error::Malformed`] if the entry
    /// points outside regexp storage.
    pub fn regexp_bytecode(&self, index: u32) -> Result<&[u8]> {
        let fields = self.fields()?;
        let entry = fields
            .regexp_table
            .get(index as usize)
            .ok_or(Error::OutOfBounds)?;
        let start = entry.offset as usize;
        start
            .checked_add(entry.length as usize)
            .and_then(|end| fields.regexp_storage.get(start..end))
            .ok_or_else(|| malformed_error!("regexp {} lies outside regexp storage", index))
    }

    /// Serialized array literals.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn array_buffer(&self) -> Result<&[u8]> {
        Ok(self.fields()?.array_buffer)
    }

    /// Serialized object literal keys.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn object_key_buffer(&self) -> Result<&[u8]> {
        Ok(self.fields()?.object_key_buffer)
    }

    /// Serialized object literal values.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn object_value_buffer(&self) -> Result<&[u8]> {
        Ok(self.fields()?.object_value_buffer)
    }

    /// The CJS module table in whichever encoding the container uses.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn cjs_module_table(&self) -> Result<CjsModuleTable<'_>> {
        Ok(self.fields()?.cjs_module_table)
    }

    /// Module id of the first CJS module in this container.
    ///
    /// # Errors
    /// Returns [`Error::Unavailable`] on an invalid provider.
    pub fn cjs_module_offset(&self) -> Result<u32> {
        Ok(self.header()?.cjs_module_offset)
    }
}

impl Drop for BytecodeProvider {
    fn drop(&mut self) {
        self.stop_warmup();
    }
}

/// Follow an overflowed compact header to its large header.
fn resolve_function_header(data: &[u8], small: SmallFuncHeader) -> Result<RuntimeFunctionHeader> {
    if !small.flags.overflowed() {
        return Ok(RuntimeFunctionHeader::Small(small));
    }

    let mut offset = small.large_header_offset();
    FunctionHeader::read(data, &mut offset)
        .map(RuntimeFunctionHeader::Large)
        .map_err(|_| {
            malformed_error!(
                "large function header at {} lies outside the buffer",
                small.large_header_offset()
            )
        })
}

/// Read the exception table and debug offsets that follow a function's header.
fn read_info_block<'a>(
    data: &'a [u8],
    small: &SmallFuncHeader,
) -> Result<(Section<'a, ExceptionHandlerInfo>, Option<DebugOffsets>)> {
    let start = if small.flags.overflowed() {
        small
            .large_header_offset()
            .checked_add(FunctionHeader::SIZE)
            .ok_or(Error::OutOfBounds)?
    } else {
        small.info_offset as usize
    };
    let mut parser = Parser::at(data, start)?;

    let mut handlers = Section::empty();
    if small.flags.has_exception_handler() {
        parser.align(SECTION_ALIGNMENT)?;
        let count = parser.read_le::<u32>()? as usize;
        let len = count
            .checked_mul(ExceptionHandlerInfo::SIZE)
            .ok_or(Error::OutOfBounds)?;
        handlers = Section::new(parser.take(len)?)?;
    }

    let mut offsets = None;
    if small.flags.has_debug_info() {
        parser.align(SECTION_ALIGNMENT)?;
        let mut cursor = parser.pos();
        offsets = Some(DebugOffsets::read(data, &mut cursor)?);
    }

    Ok((handlers, offsets))
}
