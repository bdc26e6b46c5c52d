//! JSON parsing engine
//!
//! # Module Organization
//!
//! ## Allocation
//! - [`alloc`] - [`Allocator`] trait, [`AllocatorAdapter`] and the bundled
//!   strategies ([`SystemAllocator`], [`CountingAllocator`], [`LimitedAllocator`])
//!
//! ## Parsing
//! - [`session`] - [`Session`], [`SessionConfig`] and [`Document`]
//! - [`parser`] - recursive-descent tree builder
//!
//! ## Values
//! - [`value`] - [`Value`] tree and its read-only accessors
//! - [`debug`] - [`TreePrinter`] structural dump
//!
//! ## Error Handling
//! - [`error`] - [`ParseError`], [`AccessError`], [`AllocError`]
//! - [`source_location`] - line/column tracking for error messages
//!
//! ## C ABI
//! - [`c_ffi`] - `jp_*` functions declared in `include/jparse.h`

// ============================================================================
// Logging
// ============================================================================

// Logging macros - no-op when the logging feature is disabled
#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
macro_rules! log_trace {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}

// ============================================================================
// Module Declarations
// ============================================================================

pub mod alloc;
pub mod debug;
pub mod error;
pub mod parser;
pub mod session;
pub mod source_location;
pub mod value;

pub(crate) mod builder;
pub(crate) mod lexer;
pub(crate) mod raw;

// C ABI for external language bindings
pub mod c_ffi;

// ============================================================================
// Core Types
// ============================================================================

pub use alloc::{
    AllocStats, Allocator, AllocatorAdapter, CountingAllocator, LimitedAllocator,
    SystemAllocator,
};
pub use debug::TreePrinter;
pub use parser::DEFAULT_MAX_DEPTH;
pub use session::{Document, Session, SessionConfig, DEFAULT_MAX_INPUT_SIZE};
pub use value::{Array, Entry, Object, Str, Value, ValueType};

// ============================================================================
// Errors
// ============================================================================

pub use error::{AccessError, AllocError, LexErrorKind, ParseError};
pub use source_location::SourcePosition;
