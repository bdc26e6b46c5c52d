//! Tagged value tree
//!
//! A parsed document is a tree of [`Value`] nodes. Scalars live inline in
//! their parent; strings, arrays and objects own blocks obtained from the
//! session's allocator. Values have no `Drop`: a tree is released as a whole
//! by its [`Document`](super::session::Document) or by
//! [`Session::destroy_raw`](super::session::Session::destroy_raw).
//!
//! Every accessor here is read-only and allocation-free.

use std::fmt;
use std::os::raw::c_char;
use std::slice;

use super::error::AccessError;
use super::raw::RawBuf;

/// Type tag of a value
///
/// The discriminants are the integer tags of the C interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ValueType {
    /// `true` / `false`
    Bool = 0,
    /// Number without fraction or exponent
    Int = 1,
    /// Number with a fraction or exponent
    Float = 2,
    /// `null`
    Null = 3,
    /// `[...]`
    Array = 4,
    /// `"..."`
    String = 5,
    /// `{...}`
    Object = 6,
}

impl ValueType {
    /// Integer tag
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Tag from its integer form
    pub fn from_i32(tag: i32) -> Option<Self> {
        Some(match tag {
            0 => ValueType::Bool,
            1 => ValueType::Int,
            2 => ValueType::Float,
            3 => ValueType::Null,
            4 => ValueType::Array,
            5 => ValueType::String,
            6 => ValueType::Object,
            _ => return None,
        })
    }

    /// Type name
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Bool => "Bool",
            ValueType::Int => "Int",
            ValueType::Float => "Float",
            ValueType::Null => "Null",
            ValueType::Array => "Array",
            ValueType::String => "String",
            ValueType::Object => "Object",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed JSON node
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// `null`
    Null,
    /// Ordered sequence of values
    Array(Array),
    /// Length-tracked byte string
    String(Str),
    /// Key/value mapping in insertion order
    Object(Object),
}

impl Value {
    /// Type tag of this value
    #[inline]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Null => ValueType::Null,
            Value::Array(_) => ValueType::Array,
            Value::String(_) => ValueType::String,
            Value::Object(_) => ValueType::Object,
        }
    }

    #[inline]
    fn mismatch(&self, expected: ValueType) -> AccessError {
        AccessError::TypeMismatch {
            expected,
            found: self.value_type(),
        }
    }

    /// True for `null`
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Result<bool, AccessError> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(self.mismatch(ValueType::Bool)),
        }
    }

    /// Integer payload
    pub fn as_int(&self) -> Result<i64, AccessError> {
        match self {
            Value::Int(n) => Ok(*n),
            _ => Err(self.mismatch(ValueType::Int)),
        }
    }

    /// Float payload
    ///
    /// Only matches Float; use [`as_f64`](Self::as_f64) to accept Int too.
    pub fn as_float(&self) -> Result<f64, AccessError> {
        match self {
            Value::Float(x) => Ok(*x),
            _ => Err(self.mismatch(ValueType::Float)),
        }
    }

    /// Any number as `f64`
    pub fn as_f64(&self) -> Result<f64, AccessError> {
        match self {
            Value::Float(x) => Ok(*x),
            Value::Int(n) => Ok(*n as f64),
            _ => Err(self.mismatch(ValueType::Float)),
        }
    }

    /// String payload as text
    pub fn as_str(&self) -> Result<&str, AccessError> {
        self.as_string().map(Str::as_str)
    }

    /// String payload as bytes (embedded NULs included)
    pub fn as_bytes(&self) -> Result<&[u8], AccessError> {
        self.as_string().map(Str::as_bytes)
    }

    /// String node
    pub fn as_string(&self) -> Result<&Str, AccessError> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(self.mismatch(ValueType::String)),
        }
    }

    /// Array node
    pub fn as_array(&self) -> Result<&Array, AccessError> {
        match self {
            Value::Array(a) => Ok(a),
            _ => Err(self.mismatch(ValueType::Array)),
        }
    }

    /// Object node
    pub fn as_object(&self) -> Result<&Object, AccessError> {
        match self {
            Value::Object(o) => Ok(o),
            _ => Err(self.mismatch(ValueType::Object)),
        }
    }

    /// Number of array items
    pub fn array_len(&self) -> Result<usize, AccessError> {
        self.as_array().map(Array::len)
    }

    /// Array item at `index`
    pub fn array_get(&self, index: usize) -> Result<&Value, AccessError> {
        let array = self.as_array()?;
        array.get(index).ok_or(AccessError::OutOfBounds {
            index,
            len: array.len(),
        })
    }

    /// Number of object fields
    pub fn object_len(&self) -> Result<usize, AccessError> {
        self.as_object().map(Object::len)
    }

    /// Object field named `key`; `Ok(None)` when absent
    pub fn object_get(&self, key: &str) -> Result<Option<&Value>, AccessError> {
        self.as_object().map(|o| o.get(key))
    }

    /// Structural dump for diagnostics
    pub fn render(&self) -> String {
        super::debug::TreePrinter::new().print(self)
    }
}

// Manual PartialEq implementation (f64 doesn't impl Eq)
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Float(x) => write!(f, "Float({:?})", x),
            Value::Null => f.write_str("Null"),
            Value::Array(a) => fmt::Debug::fmt(a, f),
            Value::String(s) => fmt::Debug::fmt(s, f),
            Value::Object(o) => fmt::Debug::fmt(o, f),
        }
    }
}

/// Owned byte string
///
/// Storage is NUL-terminated for C callers, but the visible length is the
/// decoded byte count and may include embedded NULs. Contents are always
/// valid UTF-8.
pub struct Str {
    pub(crate) bytes: RawBuf<u8>,
}

impl Str {
    /// Empty string holding no block
    #[inline]
    pub(crate) const fn empty() -> Self {
        Str {
            bytes: RawBuf::new(),
        }
    }

    /// Length in bytes, excluding the terminator
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for `""`
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Contents as bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// Contents as text
    #[inline]
    pub fn as_str(&self) -> &str {
        // SAFETY: parser input is valid UTF-8; the lexer copies whole runs
        // between ASCII delimiters and encodes escapes from `char`s
        unsafe { std::str::from_utf8_unchecked(self.as_bytes()) }
    }

    /// Contents followed by the NUL terminator
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        if self.bytes.capacity() == 0 {
            return b"\0";
        }
        // SAFETY: non-empty strings are finished with a NUL at index len,
        // inside the block
        unsafe { slice::from_raw_parts(self.bytes.as_ptr(), self.len() + 1) }
    }

    /// Pointer to the NUL-terminated storage
    #[inline]
    pub fn as_c_ptr(&self) -> *const c_char {
        self.as_bytes_with_nul().as_ptr() as *const c_char
    }
}

impl PartialEq for Str {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<str> for Str {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for Str {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

/// Ordered sequence of values
pub struct Array {
    pub(crate) items: RawBuf<Value>,
}

impl Array {
    /// Number of items
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True for `[]`
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at `index`
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.as_slice().get(index)
    }

    /// Items in order
    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        self.items.as_slice()
    }

    /// Iterate over the items
    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, Value> {
        self.items.as_slice().iter()
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Value;
    type IntoIter = slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// One object field
pub struct Entry {
    pub(crate) key: Str,
    pub(crate) value: Value,
}

impl Entry {
    /// Field name
    #[inline]
    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    /// Field name as a string node
    #[inline]
    pub fn key_str(&self) -> &Str {
        &self.key
    }

    /// Field value
    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Key/value mapping with unique keys in insertion order
///
/// Objects with two or more fields carry a sorted index of entry positions,
/// so lookups are a binary search over keys.
pub struct Object {
    pub(crate) entries: RawBuf<Entry>,
    pub(crate) index: RawBuf<u32>,
}

impl Object {
    /// Number of fields
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True for `{}`
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fields in insertion order
    #[inline]
    pub fn entries(&self) -> &[Entry] {
        self.entries.as_slice()
    }

    /// Value of the field named `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        let entries = self.entries.as_slice();
        if self.index.is_empty() {
            return entries
                .iter()
                .find(|e| e.key.as_bytes() == key.as_bytes())
                .map(Entry::value);
        }
        self.index
            .as_slice()
            .binary_search_by(|&pos| entries[pos as usize].key.as_bytes().cmp(key.as_bytes()))
            .ok()
            .map(|at| entries[self.index.as_slice()[at] as usize].value())
    }

    /// True if a field named `key` exists
    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over `(key, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.entries().iter().map(|e| (e.key(), e.value()))
    }

    /// Iterate over keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries().iter().map(Entry::key)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries()
                .iter()
                .zip(other.entries())
                .all(|(a, b)| a.key == b.key && a.value == b.value)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
