//! jparse - Minimal JSON Parsing Engine
//!
//! Parses JSON text into a tagged value tree whose every block comes from an
//! allocator chosen by the caller. It provides:
//! - Injectable allocation through the [`Allocator`] trait
//! - Strict RFC 8259 lexing with byte offsets on every error
//! - A recursive-descent parser with a configurable nesting limit
//! - Read-only accessors over the resulting [`Value`] tree
//! - Sessions that parse any number of texts into independent trees
//! - A C ABI mirroring `include/jparse.h`
//!
//! ## Quick Start
//!
//! ```rust
//! use jparse::{Session, SystemAllocator, ValueType};
//!
//! let session = Session::new(SystemAllocator);
//! let doc = session.parse(r#"{"a": [1, 2.5, "x"]}"#).unwrap();
//!
//! let a = doc.object_get("a").unwrap().unwrap();
//! assert_eq!(a.array_len(), Ok(3));
//! assert_eq!(a.array_get(0).unwrap().value_type(), ValueType::Int);
//! assert_eq!(a.array_get(1).unwrap().as_float(), Ok(2.5));
//! ```
//!
//! ## Tracking Allocations
//!
//! ```rust
//! use jparse::{CountingAllocator, Session};
//!
//! let session = Session::new(CountingAllocator::new());
//! {
//!     let doc = session.parse(r#"{"a": 1, "a": 2}"#).unwrap();
//!     assert_eq!(doc.object_get("a").unwrap().unwrap().as_int(), Ok(2));
//! }
//! assert_eq!(session.destroy().outstanding_blocks(), 0);
//! ```
//!
//! ## Feature Flags
//!
//! - `logging` - Enable debug logging using the `log` crate

// Lint configuration for production quality
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

// Prelude module for convenient imports
pub mod prelude;

// Parsing engine
pub mod engine;

/// Re-export commonly used types for convenience
pub use engine::{
    // Allocation
    alloc::{AllocStats, Allocator, AllocatorAdapter, CountingAllocator, LimitedAllocator, SystemAllocator},
    // Debug tools
    debug::TreePrinter,
    // Errors
    error::{AccessError, AllocError, LexErrorKind, ParseError},
    source_location::SourcePosition,
    // Sessions
    session::{Document, Session, SessionConfig, DEFAULT_MAX_INPUT_SIZE},
    parser::DEFAULT_MAX_DEPTH,
    // Values
    value::{Array, Entry, Object, Str, Value, ValueType},
};
