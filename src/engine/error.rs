//! Error types for parsing and value access
//!
//! Parse errors abort the whole parse call and carry a byte offset into the
//! input. Access errors are local to a single accessor call and never affect
//! other values.

use std::fmt;

use super::source_location::SourcePosition;
use super::value::ValueType;

/// The allocator refused a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    /// Size in bytes of the refused request (`usize::MAX` on capacity overflow)
    pub requested: usize,
}

impl AllocError {
    /// Error for a request whose size cannot be represented
    #[inline]
    pub fn capacity_overflow() -> Self {
        AllocError {
            requested: usize::MAX,
        }
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requested == usize::MAX {
            write!(f, "Out of memory: capacity overflow")
        } else {
            write!(f, "Out of memory: failed to allocate {} bytes", self.requested)
        }
    }
}

impl std::error::Error for AllocError {}

/// Kind of malformed token found by the lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    /// String literal with no closing quote
    UnterminatedString,
    /// Unknown escape, bad `\u` digits or an unpaired surrogate
    InvalidEscape,
    /// Raw control character (below U+0020) inside a string
    ControlCharacter,
    /// Number not matching the JSON number grammar
    InvalidNumber,
    /// Number whose magnitude overflows `f64`
    NumberOutOfRange,
    /// Byte that cannot start any token
    UnexpectedCharacter,
    /// Misspelled `true`, `false` or `null`
    InvalidLiteral,
}

impl LexErrorKind {
    /// Human-readable description
    pub fn description(self) -> &'static str {
        match self {
            LexErrorKind::UnterminatedString => "unterminated string",
            LexErrorKind::InvalidEscape => "invalid escape sequence",
            LexErrorKind::ControlCharacter => "control character in string",
            LexErrorKind::InvalidNumber => "invalid number",
            LexErrorKind::NumberOutOfRange => "number out of range",
            LexErrorKind::UnexpectedCharacter => "unexpected character",
            LexErrorKind::InvalidLiteral => "invalid literal",
        }
    }
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Error type for parse operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The session's allocator refused a block
    OutOfMemory {
        /// Size of the refused request in bytes
        requested: usize,
    },

    /// Malformed token
    Lexical {
        /// What was wrong with the token
        kind: LexErrorKind,
        /// Byte offset of the problem
        offset: usize,
    },

    /// Grammar violation
    Syntax {
        /// What the parser was looking for
        expected: &'static str,
        /// What it found instead
        found: &'static str,
        /// Byte offset of the offending token
        offset: usize,
    },

    /// Nesting limit exceeded
    DepthExceeded {
        /// Depth that was reached
        depth: usize,
        /// Configured maximum depth
        max_depth: usize,
        /// Byte offset of the container that crossed the limit
        offset: usize,
    },

    /// Input bytes are not valid UTF-8
    InvalidUtf8 {
        /// Byte offset of the first invalid sequence
        offset: usize,
    },

    /// Input exceeds maximum allowed size
    InputTooLarge {
        /// Size of the input in bytes
        input_size: usize,
        /// Maximum allowed size
        max_size: usize,
    },
}

impl ParseError {
    /// Byte offset the error refers to, if it has one
    pub fn offset(&self) -> Option<usize> {
        match self {
            ParseError::Lexical { offset, .. }
            | ParseError::Syntax { offset, .. }
            | ParseError::DepthExceeded { offset, .. }
            | ParseError::InvalidUtf8 { offset } => Some(*offset),
            ParseError::OutOfMemory { .. } | ParseError::InputTooLarge { .. } => None,
        }
    }

    /// True for errors caused by the allocator rather than the input
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, ParseError::OutOfMemory { .. })
    }

    /// Format the error with line and column information taken from `input`
    pub fn format_with_position(&self, input: &str) -> String {
        match self.offset() {
            Some(offset) => {
                let sp = SourcePosition::from_offset(input, offset);
                format!(
                    "{} at line {}, column {} (byte offset {})",
                    self.message(),
                    sp.line,
                    sp.column,
                    offset
                )
            }
            None => self.to_string(),
        }
    }

    fn message(&self) -> String {
        match self {
            ParseError::OutOfMemory { requested } => AllocError {
                requested: *requested,
            }
            .to_string(),
            ParseError::Lexical { kind, .. } => format!("Lexical error: {}", kind),
            ParseError::Syntax {
                expected, found, ..
            } => format!("Syntax error: expected {}, found {}", expected, found),
            ParseError::DepthExceeded {
                depth, max_depth, ..
            } => format!(
                "Depth limit exceeded: depth {} exceeds limit of {}",
                depth, max_depth
            ),
            ParseError::InvalidUtf8 { .. } => "Invalid UTF-8".to_string(),
            ParseError::InputTooLarge {
                input_size,
                max_size,
            } => format!(
                "Input too large: {} bytes exceeds limit of {} bytes",
                input_size, max_size
            ),
        }
    }
}

impl From<AllocError> for ParseError {
    fn from(err: AllocError) -> Self {
        ParseError::OutOfMemory {
            requested: err.requested,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset() {
            Some(offset) => write!(f, "{} at byte {}", self.message(), offset),
            None => f.write_str(&self.message()),
        }
    }
}

impl std::error::Error for ParseError {}

/// Accessor misuse on a single value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// The value's tag does not match the requested interpretation
    TypeMismatch {
        /// Requested type
        expected: ValueType,
        /// Actual type of the value
        found: ValueType,
    },

    /// Array index past the end
    OutOfBounds {
        /// Requested index
        index: usize,
        /// Array length
        len: usize,
    },
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {}, found {}", expected, found)
            }
            AccessError::OutOfBounds { index, len } => {
                write!(f, "Index {} out of bounds for array of length {}", index, len)
            }
        }
    }
}

impl std::error::Error for AccessError {}
