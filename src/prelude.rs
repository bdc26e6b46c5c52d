//! Prelude module for convenient imports
//!
//! ```
//! use jparse::prelude::*;
//!
//! let session = Session::new(SystemAllocator);
//! let doc = session.parse("[true, null]").unwrap();
//! assert_eq!(doc.value_type(), ValueType::Array);
//! ```

// ============================================================================
// Core Types
// ============================================================================

pub use crate::engine::{Document, Session, SessionConfig, Value, ValueType};

// ============================================================================
// Allocation
// ============================================================================

pub use crate::engine::{Allocator, CountingAllocator, LimitedAllocator, SystemAllocator};

// ============================================================================
// Error Handling
// ============================================================================

pub use crate::engine::{AccessError, ParseError};
