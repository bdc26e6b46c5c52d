//! Debug rendering of value trees
//!
//! One node per line, children indented below their container:
//!
//! ```text
//! {
//!   "name":
//!     "jparse"
//!   "tags":
//!     [
//!       1
//!       2.5
//!     ]
//! }
//! ```

use std::fmt::{self, Write};

use super::value::Value;

/// Tree printer for values
#[derive(Debug, Clone)]
pub struct TreePrinter {
    /// Indentation string
    indent: String,
    /// Maximum depth to print
    max_depth: Option<usize>,
}

impl TreePrinter {
    /// Printer with two-space indentation and no depth limit
    pub fn new() -> Self {
        Self {
            indent: "  ".to_string(),
            max_depth: None,
        }
    }

    /// Set the indentation string
    pub fn indent(mut self, indent: &str) -> Self {
        self.indent = indent.to_string();
        self
    }

    /// Elide containers nested deeper than `depth`
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Render `value` into a new string
    pub fn print(&self, value: &Value) -> String {
        let mut output = String::new();
        // writing into a String cannot fail
        let _ = self.write(value, &mut output);
        output
    }

    /// Render `value` into any formatter sink
    pub fn write<W: Write>(&self, value: &Value, out: &mut W) -> fmt::Result {
        self.write_node(value, 0, out)
    }

    fn write_node<W: Write>(&self, value: &Value, depth: usize, out: &mut W) -> fmt::Result {
        let indent = self.indent.repeat(depth);

        if let Some(max) = self.max_depth {
            if depth > max {
                return writeln!(out, "{}...", indent);
            }
        }

        match value {
            Value::Null => writeln!(out, "{}null", indent),
            Value::Bool(b) => writeln!(out, "{}{}", indent, b),
            Value::Int(n) => writeln!(out, "{}{}", indent, n),
            Value::Float(x) => writeln!(out, "{}{:?}", indent, x),
            Value::String(s) => writeln!(out, "{}{:?}", indent, s.as_str()),
            Value::Array(a) if a.is_empty() => writeln!(out, "{}[]", indent),
            Value::Array(a) => {
                writeln!(out, "{}[", indent)?;
                for item in a {
                    self.write_node(item, depth + 1, out)?;
                }
                writeln!(out, "{}]", indent)
            }
            Value::Object(o) if o.is_empty() => writeln!(out, "{}{{}}", indent),
            Value::Object(o) => {
                writeln!(out, "{}{{", indent)?;
                for (key, field) in o.iter() {
                    writeln!(out, "{}{}{:?}:", indent, self.indent, key)?;
                    self.write_node(field, depth + 2, out)?;
                }
                writeln!(out, "{}}}", indent)
            }
        }
    }
}

impl Default for TreePrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(TreePrinter::new().print(self).trim_end())
    }
}
