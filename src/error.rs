use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! internal_consistency_error {
    ($msg:expr) => {
        crate::Error::InternalConsistency {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InternalConsistency {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Format Errors
/// Recoverable by the caller; the container simply is not usable by this reader.
/// - [`Error::TooSmall`] - Buffer shorter than the fixed file header
/// - [`Error::BadMagic`] - Magic number does not match the requested form
/// - [`Error::VersionMismatch`] - Unsupported bytecode version
/// - [`Error::Empty`] - Container declares no functions
///
/// ## Consistency Errors
/// - [`Error::InternalConsistency`] - A section derived from a validated header does not fit
///   the buffer, or a layout self-check failed
/// - [`Error::Malformed`] - Per-function or debug data points outside the buffer
/// - [`Error::OutOfBounds`] - A bounds-checked read would have overrun
///
/// ## Usage Errors
/// - [`Error::FunctionOutOfRange`] - Function index not below the function count
/// - [`Error::Unavailable`] - Query issued against a provider that failed validation
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem errors while opening a container
///
/// # Examples
///
/// ```rust,no_run
/// use hbcscope::{BytecodeProvider, Error};
///
/// let provider = BytecodeProvider::from_mem(std::fs::read("index.hbc")?);
/// match provider.function_count() {
///     Ok(count) => println!("{count} functions"),
///     Err(Error::Unavailable(reason)) => eprintln!("unusable container: {reason}"),
///     Err(e) => eprintln!("error: {e}"),
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The buffer cannot even hold the fixed-size file header.
    #[error("Buffer too small: {len} bytes, the file header requires {required}")]
    TooSmall {
        /// Length of the offered buffer
        len: usize,
        /// Size of the file header
        required: usize,
    },

    /// The magic number does not match the magic expected for the requested form.
    #[error("Incorrect magic number: expected 0x{expected:016X}, found 0x{found:016X}")]
    BadMagic {
        /// Magic of the requested form
        expected: u64,
        /// Magic present in the buffer
        found: u64,
    },

    /// The container was produced for a different bytecode version.
    #[error("Wrong bytecode version. Expected {expected} but got {found}")]
    VersionMismatch {
        /// The single version this reader supports
        expected: u32,
        /// Version found in the header
        found: u32,
    },

    /// The container declares zero functions; at least the global function is required.
    #[error("Bytecode does not contain any functions")]
    Empty,

    /// A structure derived from a validated header does not fit the buffer.
    ///
    /// For a well-formed file the header counts make this impossible, so it signals either
    /// a corrupted container or a bug in the layout code.
    #[error("Internal consistency - {file}:{line}: {message}")]
    InternalConsistency {
        /// What was inconsistent
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Per-function or debug data is damaged and could not be parsed.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A function index was not below the function count.
    #[error("Function index {id} out of range, container has {count} functions")]
    FunctionOutOfRange {
        /// The requested function index
        id: u32,
        /// Number of functions in the container
        count: u32,
    },

    /// The provider failed validation or layout; the retained reason is attached.
    #[error("Bytecode provider is unavailable: {0}")]
    Unavailable(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Returns `true` for errors caused by a container this reader does not accept
    /// (truncated header, wrong magic, wrong version, no functions).
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::TooSmall { .. } | Error::BadMagic { .. } | Error::VersionMismatch { .. } | Error::Empty
        )
    }
}
