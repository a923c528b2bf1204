//! # hbcscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the
//! hbcscope library. Import this module to get quick access to everything needed to open a
//! container and query it.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all hbcscope operations
pub use crate::Error;

/// The result type used throughout hbcscope
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Owner of a container and its query surface
pub use crate::{BytecodeProvider, Hardening, ProviderConfig};

/// Paging advice
pub use crate::Advice;

/// Low-level parsing utilities
pub use crate::{
    file::{Backend, Memory, Physical},
    Parser,
};

// ================================================================================================
// Format
// ================================================================================================

/// Header and validation
pub use crate::format::{validate, BytecodeForm, BytecodeOptions, FileHeader, SourceHash};

/// Function records
pub use crate::format::{
    DebugOffsets, ExceptionHandlerInfo, FunctionHeaderFlags, ProhibitInvoke,
    RuntimeFunctionHeader,
};

/// String records
pub use crate::format::{StringKind, StringKindEntry, StringTableEntry};

/// Typed section views
pub use crate::format::{Record, Section};

// ================================================================================================
// Layout and Debug Info
// ================================================================================================

/// Section layout and typed field views
pub use crate::layout::{layout, CjsModuleTable, FileFields, Layout, SectionKind};

/// Decoded debug info
pub use crate::debuginfo::{DebugInfo, DebugSourceLocation, SourceLocation};
