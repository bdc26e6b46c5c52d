//! Source Location Utilities
//!
//! Converts the byte offsets carried by parse errors into line/column
//! positions for human-readable messages.

use std::fmt;

/// A position in source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    /// Byte offset from start of input
    pub offset: usize,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based, counted in characters)
    pub column: usize,
}

impl SourcePosition {
    /// Create a new source position
    #[inline]
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// Create a position at the start of input
    #[inline]
    pub fn start() -> Self {
        Self::new(0, 1, 1)
    }

    /// Calculate position from a byte offset in the input
    ///
    /// Offsets past the end clamp to the end of input.
    pub fn from_offset(input: &str, offset: usize) -> Self {
        let offset = offset.min(input.len());

        let mut line = 1;
        let mut column = 1;

        for (at, ch) in input.char_indices() {
            if at >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }

        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

impl Default for SourcePosition {
    fn default() -> Self {
        Self::start()
    }
}

/// Convert a byte offset to 1-based line and column numbers
#[inline]
pub fn offset_to_line_col(input: &str, offset: usize) -> (usize, usize) {
    let pos = SourcePosition::from_offset(input, offset);
    (pos.line, pos.column)
}
