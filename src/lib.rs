// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory
// - 'utils/os.rs' calls sysconf and madvise

//! # hbcscope
//!
//! A zero-copy reader for compiled JavaScript bytecode containers (the HBC format). Built in
//! pure Rust, `hbcscope` validates a container once, lays out its sections, and then answers
//! the structured queries an interpreter asks while it runs: function headers, exception
//! handler lookup, source locations, strings and literal buffers.
//!
//! ## Features
//!
//! - **📦 Zero-copy access** - Memory-mapped or in-memory containers, typed views that borrow
//!   the buffer
//! - **🛡️ Validation first** - Magic, version and section bounds are checked before any
//!   section is touched; bad containers yield a provider that explains why
//! - **🧭 Debug info** - Lazily decoded source location streams and filename tables
//! - **⚡ Residency control** - Paging advice for the string table and a background warmup
//!   thread that faults pages in ahead of use
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hbcscope::prelude::*;
//!
//! let provider = BytecodeProvider::from_file("index.hbc")?;
//! println!("{} functions", provider.function_count()?);
//! # Ok::<(), hbcscope::Error>(())
//! ```
//!
//! ### Locating a thrown exception
//!
//! ```rust,no_run
//! use hbcscope::BytecodeProvider;
//!
//! let provider = BytecodeProvider::from_mem(std::fs::read("index.hbc")?);
//! let function = provider.global_function_index()?;
//!
//! if let Some(location) = provider.location_for_address(function, 0x20)? {
//!     println!("{}:{}:{}", location.file, location.line, location.column);
//! }
//! match provider.find_catch_target_offset(function, 0x20)? {
//!     Some(target) => println!("handled at {target:#x}"),
//!     None => println!("propagates to the caller"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - [`format`] - Header, record types and typed section views
//! - [`layout`] - Section placement derived from the header
//! - [`debuginfo`] - Filename table, file regions and location streams
//! - [`provider`] - [`BytecodeProvider`], residency advice and warmup
//! - [`file`] - Memory and memory-mapped backends, the bounds-checked [`Parser`]
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result):
//!
//! ```rust,no_run
//! use hbcscope::{format, BytecodeForm, Error};
//!
//! let data = std::fs::read("index.hbc")?;
//! match format::validate(&data, BytecodeForm::Execution) {
//!     Ok(()) => println!("container accepted"),
//!     Err(Error::VersionMismatch { found, .. }) => println!("compiled for version {found}"),
//!     Err(e) if e.is_format_error() => println!("not a container: {e}"),
//!     Err(e) => println!("other error: {e}"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Development and Testing
//!
//! ### Fuzzing
//!
//! ```bash
//! cargo +nightly fuzz run provider --release
//! ```
//!
//! ### Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;
pub(crate) mod utils;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use hbcscope::prelude::*;
///
/// let provider = BytecodeProvider::from_file("index.hbc")?;
/// let header: RuntimeFunctionHeader = provider.function_header(0)?;
/// # Ok::<(), hbcscope::Error>(())
/// ```
pub mod prelude;

/// Data sources and low-level parsing primitives.
pub mod file;

/// On-disk record types and the header validation gate.
pub mod format;

/// Placement of the container's sections.
pub mod layout;

/// Decoding of the debug info region.
pub mod debuginfo;

/// The bytecode provider.
pub mod provider;

/// `hbcscope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use hbcscope::{BytecodeProvider, Result};
///
/// fn load(path: &str) -> Result<BytecodeProvider> {
///     BytecodeProvider::from_file(path)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `hbcscope` Error type
pub use error::Error;

/// Main entry point for working with bytecode containers.
///
/// See [`provider::BytecodeProvider`] for the full query surface.
pub use provider::{BytecodeProvider, Hardening, ProviderConfig};

/// Container flavours accepted by the validation gate.
pub use format::BytecodeForm;

/// Paging advice accepted by [`BytecodeProvider::madvise`].
pub use utils::os::Advice;

/// Resolved source positions returned by [`BytecodeProvider::location_for_address`].
pub use debuginfo::SourceLocation;

/// Bounds-checked binary reader.
///
/// # Example
///
/// ```rust
/// use hbcscope::Parser;
/// let data = [0x02, 0x00, 0x00, 0x00];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_le::<u32>()?, 2);
/// # Ok::<(), hbcscope::Error>(())
/// ```
pub use file::parser::Parser;
