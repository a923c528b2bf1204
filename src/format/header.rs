//! The fixed file header and the validation gate in front of every other decoder.
//!
//! The header occupies the first [`FILE_HEADER_SIZE`] bytes of a container. It carries the
//! magic and version, the element count or byte size of every section, the container options
//! and the SHA-1 of the source text the container was compiled from.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hbcscope::format::{validate, FileHeader};
//! use hbcscope::BytecodeForm;
//!
//! let data = std::fs::read("index.hbc")?;
//! validate(&data, BytecodeForm::Execution)?;
//! let header = FileHeader::read(&data)?;
//! println!("{} functions, hash {}", header.function_count, header.source_hash);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;

use sha1::{Digest, Sha1};

use crate::{
    file::{
        io::{read_le, write_le_at},
        parser::Parser,
    },
    format::{
        BytecodeForm, BytecodeOptions, BYTECODE_VERSION, FILE_HEADER_SIZE, SOURCE_HASH_SIZE,
    },
    Error, Result,
};

/// The SHA-1 digest of the source text a container was compiled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceHash([u8; SOURCE_HASH_SIZE]);

impl SourceHash {
    /// Hash `source` the same way the compiler does.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hbcscope::format::SourceHash;
    ///
    /// let hash = SourceHash::of_source(b"abc");
    /// assert_eq!(hash.to_string(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    /// ```
    #[must_use]
    pub fn of_source(source: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(source);
        let digest = hasher.finalize();

        let mut bytes = [0u8; SOURCE_HASH_SIZE];
        bytes.copy_from_slice(&digest);
        SourceHash(bytes)
    }

    /// Returns `true` if this hash was computed from `source`.
    #[must_use]
    pub fn matches_source(&self, source: &[u8]) -> bool {
        *self == SourceHash::of_source(source)
    }

    /// The raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SOURCE_HASH_SIZE] {
        &self.0
    }
}

impl From<[u8; SOURCE_HASH_SIZE]> for SourceHash {
    fn from(bytes: [u8; SOURCE_HASH_SIZE]) -> Self {
        SourceHash(bytes)
    }
}

impl fmt::Display for SourceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// The decoded 128-byte file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Magic number, selects execution or delta form
    pub magic: u64,
    /// Bytecode format version
    pub version: u32,
    /// SHA-1 of the source text
    pub source_hash: SourceHash,
    /// Length of the container proper; bytes past it form the epilogue
    pub file_length: u32,
    /// Index of the global (entry) function
    pub global_code_index: u32,
    /// Number of function headers
    pub function_count: u32,
    /// Number of string kind runs
    pub string_kind_count: u32,
    /// Number of identifier hashes in the translation table
    pub identifier_count: u32,
    /// Number of small string table entries
    pub string_count: u32,
    /// Number of overflow string table entries
    pub overflow_string_count: u32,
    /// Byte size of string storage
    pub string_storage_size: u32,
    /// Number of regular expression table entries
    pub reg_exp_count: u32,
    /// Byte size of regular expression bytecode storage
    pub reg_exp_storage_size: u32,
    /// Byte size of the array literal buffer
    pub array_buffer_size: u32,
    /// Byte size of the object key buffer
    pub obj_key_buffer_size: u32,
    /// Byte size of the object value buffer
    pub obj_value_buffer_size: u32,
    /// First CJS module id of this container (segment offset)
    pub cjs_module_offset: u32,
    /// Number of CJS module table entries
    pub cjs_module_count: u32,
    /// Absolute offset of the debug info region
    pub debug_info_offset: u32,
    /// Container options
    pub options: BytecodeOptions,
}

impl FileHeader {
    /// Decode the header at the start of `data`.
    ///
    /// No semantic checks are performed here; see [`validate`].
    ///
    /// # Errors
    /// Returns [`Error::TooSmall`] if `data` is shorter than [`FILE_HEADER_SIZE`].
    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < FILE_HEADER_SIZE {
            return Err(Error::TooSmall {
                len: data.len(),
                required: FILE_HEADER_SIZE,
            });
        }

        let mut parser = Parser::new(&data[..FILE_HEADER_SIZE]);
        let magic = parser.read_le::<u64>()?;
        let version = parser.read_le::<u32>()?;

        let mut hash = [0u8; SOURCE_HASH_SIZE];
        hash.copy_from_slice(parser.take(SOURCE_HASH_SIZE)?);

        Ok(FileHeader {
            magic,
            version,
            source_hash: SourceHash(hash),
            file_length: parser.read_le::<u32>()?,
            global_code_index: parser.read_le::<u32>()?,
            function_count: parser.read_le::<u32>()?,
            string_kind_count: parser.read_le::<u32>()?,
            identifier_count: parser.read_le::<u32>()?,
            string_count: parser.read_le::<u32>()?,
            overflow_string_count: parser.read_le::<u32>()?,
            string_storage_size: parser.read_le::<u32>()?,
            reg_exp_count: parser.read_le::<u32>()?,
            reg_exp_storage_size: parser.read_le::<u32>()?,
            array_buffer_size: parser.read_le::<u32>()?,
            obj_key_buffer_size: parser.read_le::<u32>()?,
            obj_value_buffer_size: parser.read_le::<u32>()?,
            cjs_module_offset: parser.read_le::<u32>()?,
            cjs_module_count: parser.read_le::<u32>()?,
            debug_info_offset: parser.read_le::<u32>()?,
            options: BytecodeOptions::from_bits_retain(parser.read_le::<u8>()?),
        })
    }

    /// Encode the header into the first [`FILE_HEADER_SIZE`] bytes of `out`.
    ///
    /// Padding bytes are zeroed.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if `out` is shorter than [`FILE_HEADER_SIZE`].
    pub fn write_to(&self, out: &mut [u8]) -> Result<()> {
        let Some(out) = out.get_mut(..FILE_HEADER_SIZE) else {
            return Err(Error::OutOfBounds);
        };
        out.fill(0);

        let mut offset = 0;
        write_le_at(out, &mut offset, self.magic)?;
        write_le_at(out, &mut offset, self.version)?;
        out[offset..offset + SOURCE_HASH_SIZE].copy_from_slice(self.source_hash.as_bytes());
        offset += SOURCE_HASH_SIZE;

        for value in [
            self.file_length,
            self.global_code_index,
            self.function_count,
            self.string_kind_count,
            self.identifier_count,
            self.string_count,
            self.overflow_string_count,
            self.string_storage_size,
            self.reg_exp_count,
            self.reg_exp_storage_size,
            self.array_buffer_size,
            self.obj_key_buffer_size,
            self.obj_value_buffer_size,
            self.cjs_module_offset,
            self.cjs_module_count,
            self.debug_info_offset,
        ] {
            write_le_at(out, &mut offset, value)?;
        }
        write_le_at(out, &mut offset, self.options.bits())
    }
}

/// Check that `buffer` holds a usable container of the given form.
///
/// Checks run in a fixed order and the first failure wins: length, magic, version, then the
/// function count. Never panics, whatever the input.
///
/// # Errors
/// - [`Error::TooSmall`] if the buffer cannot hold the header
/// - [`Error::BadMagic`] if the magic does not belong to `form`
/// - [`Error::VersionMismatch`] if the version is not [`BYTECODE_VERSION`]
/// - [`Error::Empty`] if the container declares no functions
///
/// # Examples
///
/// ```rust
/// use hbcscope::format::validate;
/// use hbcscope::{BytecodeForm, Error};
///
/// let short = [0u8; 16];
/// assert!(matches!(
///     validate(&short, BytecodeForm::Execution),
///     Err(Error::TooSmall { len: 16, .. })
/// ));
/// ```
pub fn validate(buffer: &[u8], form: BytecodeForm) -> Result<()> {
    if buffer.len() < FILE_HEADER_SIZE {
        return Err(Error::TooSmall {
            len: buffer.len(),
            required: FILE_HEADER_SIZE,
        });
    }

    let magic = read_le::<u64>(buffer)?;
    if magic != form.magic() {
        return Err(Error::BadMagic {
            expected: form.magic(),
            found: magic,
        });
    }

    let header = FileHeader::read(buffer)?;
    if header.version != BYTECODE_VERSION {
        return Err(Error::VersionMismatch {
            expected: BYTECODE_VERSION,
            found: header.version,
        });
    }

    if header.function_count == 0 {
        return Err(Error::Empty);
    }

    Ok(())
}

/// Quick check that `buffer` is an executable container this reader can open.
///
/// # Errors
/// Returns the first failure of [`validate`] for [`BytecodeForm::Execution`].
pub fn bytecode_stream_sanity_check(buffer: &[u8]) -> Result<()> {
    validate(buffer, BytecodeForm::Execution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DELTA_MAGIC, MAGIC};

    fn header() -> FileHeader {
        FileHeader {
            magic: MAGIC,
            version: BYTECODE_VERSION,
            source_hash: SourceHash::of_source(b"print(1)"),
            file_length: 128,
            global_code_index: 0,
            function_count: 1,
            string_kind_count: 2,
            identifier_count: 3,
            string_count: 4,
            overflow_string_count: 5,
            string_storage_size: 6,
            reg_exp_count: 7,
            reg_exp_storage_size: 8,
            array_buffer_size: 9,
            obj_key_buffer_size: 10,
            obj_value_buffer_size: 11,
            cjs_module_offset: 12,
            cjs_module_count: 13,
            debug_info_offset: 14,
            options: BytecodeOptions::HAS_ASYNC,
        }
    }

    fn encoded(header: &FileHeader) -> Vec<u8> {
        let mut data = vec![0xAA; FILE_HEADER_SIZE];
        header.write_to(&mut data).unwrap();
        data
    }

    #[test]
    fn header_field_offsets() {
        let data = encoded(&header());
        assert_eq!(&data[0..8], &MAGIC.to_le_bytes());
        assert_eq!(&data[8..12], &74u32.to_le_bytes());
        assert_eq!(&data[32..36], &128u32.to_le_bytes());
        assert_eq!(&data[40..44], &1u32.to_le_bytes());
        assert_eq!(&data[92..96], &14u32.to_le_bytes());
        assert_eq!(data[96], BytecodeOptions::HAS_ASYNC.bits());
        assert!(data[97..].iter().all(|b| *b == 0));

        let decoded = FileHeader::read(&data).unwrap();
        assert_eq!(decoded, header());
    }

    #[test]
    fn validate_order() {
        assert!(matches!(
            validate(&[], BytecodeForm::Execution),
            Err(Error::TooSmall { len: 0, required: 128 })
        ));

        let mut bad = header();
        bad.magic = DELTA_MAGIC;
        bad.version = 1;
        assert!(matches!(
            validate(&encoded(&bad), BytecodeForm::Execution),
            Err(Error::BadMagic { found, .. }) if found == DELTA_MAGIC
        ));
        assert!(matches!(
            validate(&encoded(&bad), BytecodeForm::Delta),
            Err(Error::VersionMismatch { expected: 74, found: 1 })
        ));

        let mut empty = header();
        empty.function_count = 0;
        assert!(matches!(
            validate(&encoded(&empty), BytecodeForm::Execution),
            Err(Error::Empty)
        ));

        assert!(bytecode_stream_sanity_check(&encoded(&header())).is_ok());
    }

    #[test]
    fn version_message_names_both_versions() {
        let mut old = header();
        old.version = 73;
        let message = validate(&encoded(&old), BytecodeForm::Execution)
            .unwrap_err()
            .to_string();
        assert_eq!(message, "Wrong bytecode version. Expected 74 but got 73");
    }

    #[test]
    fn source_hash_roundtrip() {
        let hash = SourceHash::of_source(b"print(1)");
        assert!(hash.matches_source(b"print(1)"));
        assert!(!hash.matches_source(b"print(2)"));
        assert_eq!(hash.to_string().len(), 40);
        assert_eq!(SourceHash::from(*hash.as_bytes()), hash);
    }
}
