//! Parser sessions
//!
//! A [`Session`] binds one allocator and a [`SessionConfig`], and parses any
//! number of texts. Each successful parse produces an independent tree whose
//! blocks all come from the session's allocator.
//!
//! The safe API hands out [`Document`]s, which borrow the session and free
//! their tree when dropped, so a session cannot be destroyed while one of
//! its trees is alive. The raw API ([`Session::parse_raw`] and
//! [`Session::destroy_raw`]) leaves that ordering to the caller and is what
//! the C ABI is built on.
//!
//! The session records the root of every live tree in a block from its own
//! allocator. Tearing the session down releases whatever raw trees are still
//! recorded, so nothing it produced outlives it.

use std::cell::RefCell;
use std::fmt;
use std::mem::{self, ManuallyDrop};
use std::ops::Deref;
use std::ptr::{self, NonNull};

use serde::{Deserialize, Serialize};

use super::alloc::{AllocStats, Allocator, AllocatorAdapter, SystemAllocator};
use super::builder::Release;
use super::error::ParseError;
use super::parser::{self, DEFAULT_MAX_DEPTH};
use super::raw::RawBuf;
use super::value::Value;

/// Default maximum input size (100 MB)
pub const DEFAULT_MAX_INPUT_SIZE: usize = 100 * 1024 * 1024;

/// Session configuration
///
/// # Example
///
/// ```
/// use jparse::SessionConfig;
///
/// let config = SessionConfig::new()
///     .with_max_depth(64)
///     .with_max_input_size(1024 * 1024);
/// assert_eq!(config.max_depth, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum nesting depth of arrays and objects; 0 rejects every container
    pub max_depth: usize,

    /// Maximum accepted input size in bytes
    pub max_input_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
        }
    }
}

impl SessionConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum nesting depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the maximum input size
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// Serialize to JSON
    #[inline]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON; missing fields take their defaults
    #[inline]
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// A parser session bound to one allocator
///
/// Not `Sync`: use one session per thread. Dropping a session releases any
/// raw trees it still owns, like [`destroy`](Session::destroy) does.
pub struct Session<A: Allocator = SystemAllocator> {
    heap: AllocatorAdapter<A>,
    config: SessionConfig,
    /// Roots of live trees; the block is freed whenever the last one goes
    roots: RefCell<RawBuf<NonNull<Value>>>,
}

// SAFETY: the recorded roots point into trees owned by this session alone;
// moving the session moves that ownership with it
unsafe impl<A: Allocator + Send> Send for Session<A> {}

impl Default for Session<SystemAllocator> {
    fn default() -> Self {
        Self::new(SystemAllocator)
    }
}

impl<A: Allocator> Session<A> {
    /// Session with the default configuration
    pub fn new(allocator: A) -> Self {
        Self::with_config(allocator, SessionConfig::default())
    }

    /// Session with an explicit configuration
    pub fn with_config(allocator: A, config: SessionConfig) -> Self {
        log_debug!(
            "session created (max_depth={}, max_input_size={})",
            config.max_depth,
            config.max_input_size
        );
        Self {
            heap: AllocatorAdapter::new(allocator),
            config,
            roots: RefCell::new(RawBuf::new()),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The bound allocator
    pub fn allocator(&self) -> &A {
        self.heap.allocator()
    }

    /// Counters for blocks requested by this session
    pub fn stats(&self) -> AllocStats {
        self.heap.stats()
    }

    /// Number of trees parsed and not yet destroyed
    pub fn live_trees(&self) -> usize {
        self.roots.borrow().len()
    }

    /// Parse one JSON text
    pub fn parse(&self, input: &str) -> Result<Document<'_, A>, ParseError> {
        let root = self.parse_checked(input.as_bytes())?;
        Ok(Document {
            session: self,
            root,
        })
    }

    /// Parse one JSON text from bytes, validating UTF-8 first
    pub fn parse_bytes(&self, input: &[u8]) -> Result<Document<'_, A>, ParseError> {
        let root = self.parse_raw(input)?;
        Ok(Document {
            session: self,
            root,
        })
    }

    /// Parse into a tree the caller destroys with [`destroy_raw`](Self::destroy_raw)
    ///
    /// A tree that is never destroyed is released with the session.
    pub fn parse_raw(&self, input: &[u8]) -> Result<NonNull<Value>, ParseError> {
        self.check_size(input)?;
        if let Err(e) = std::str::from_utf8(input) {
            return Err(ParseError::InvalidUtf8 {
                offset: e.valid_up_to(),
            });
        }
        self.parse_checked(input)
    }

    /// Destroy a tree, releasing every block it owns
    ///
    /// A pointer this session does not hold (already destroyed, or from
    /// another session) is ignored.
    ///
    /// # Safety
    ///
    /// No reference into the tree may be used afterwards.
    pub unsafe fn destroy_raw(&self, root: NonNull<Value>) {
        let mut roots = self.roots.borrow_mut();
        let Some(at) = roots.as_slice().iter().rposition(|&r| r == root) else {
            log_debug!("destroy of unknown tree {:p} ignored", root);
            return;
        };
        roots.swap_remove(at);
        self.release_tree(root);
        if roots.is_empty() {
            mem::replace(&mut *roots, RawBuf::new()).consume(&self.heap, |_| {});
        }
        log_trace!("tree destroyed, {} still live", roots.len());
    }

    /// Destroy a tree now rather than at end of scope
    pub fn destroy_document(&self, document: Document<'_, A>) {
        debug_assert!(ptr::eq(document.session, self));
        drop(document);
    }

    /// Tear the session down and return its allocator
    ///
    /// Every [`Document`] borrows the session, so all of them are gone by
    /// now. Trees from [`parse_raw`](Self::parse_raw) that were never
    /// destroyed are released here.
    pub fn destroy(self) -> A {
        self.release_all();
        log_debug!(
            "session destroyed after {} allocation(s), peak {} bytes",
            self.heap.stats().total_allocations,
            self.heap.stats().peak_bytes
        );
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped and the heap is read out once; the
        // other fields own nothing after release_all
        unsafe { ptr::read(&this.heap) }.into_inner()
    }

    /// Release every recorded tree and the record itself
    fn release_all(&self) {
        let roots = mem::replace(&mut *self.roots.borrow_mut(), RawBuf::new());
        if !roots.is_empty() {
            log_debug!("releasing {} tree(s) left live", roots.len());
        }
        // SAFETY: every recorded root is a live tree from this session and
        // the record's block came from the same adapter
        unsafe { roots.consume(&self.heap, |root| self.release_tree(root)) }
    }

    /// # Safety
    ///
    /// `root` must be a live tree from this session, no longer recorded.
    unsafe fn release_tree(&self, root: NonNull<Value>) {
        let value = ptr::read(root.as_ptr());
        value.release(&self.heap);
        self.heap.free_slice(root, 1);
    }

    fn check_size(&self, input: &[u8]) -> Result<(), ParseError> {
        if input.len() > self.config.max_input_size {
            return Err(ParseError::InputTooLarge {
                input_size: input.len(),
                max_size: self.config.max_input_size,
            });
        }
        Ok(())
    }

    /// Parse UTF-8 input and move the root into its own block
    fn parse_checked(&self, input: &[u8]) -> Result<NonNull<Value>, ParseError> {
        self.check_size(input)?;

        let tree = match parser::parse(input, &self.heap, self.config.max_depth) {
            Ok(tree) => tree,
            Err(e) => {
                log_debug!("parse failed: {}", e);
                return Err(e);
            }
        };
        let slot = self.heap.alloc_slice::<Value>(1)?;
        let mut roots = self.roots.borrow_mut();
        if let Err(e) = roots.reserve(&self.heap, 1) {
            // SAFETY: slot is unused and came from this adapter
            unsafe { self.heap.free_slice(slot, 1) };
            return Err(e.into());
        }
        let value = tree.into_inner();
        log_trace!("parsed {} bytes into a {} tree", input.len(), value.value_type());

        // SAFETY: slot is a fresh block sized for one Value
        unsafe { slot.as_ptr().write(value) };
        roots.push_within_capacity(slot);
        Ok(slot)
    }
}

impl<A: Allocator> fmt::Debug for Session<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("live_trees", &self.live_trees())
            .field("stats", &self.heap.stats())
            .finish()
    }
}

impl<A: Allocator> Drop for Session<A> {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// One parsed tree, borrowed from its session
///
/// Dereferences to the root [`Value`]. Dropping the document releases the
/// whole tree through the session's allocator.
pub struct Document<'s, A: Allocator = SystemAllocator> {
    session: &'s Session<A>,
    root: NonNull<Value>,
}

impl<A: Allocator> Document<'_, A> {
    /// The root value
    #[inline]
    pub fn root(&self) -> &Value {
        // SAFETY: root stays valid until this document is dropped
        unsafe { self.root.as_ref() }
    }
}

impl<A: Allocator> Deref for Document<'_, A> {
    type Target = Value;

    #[inline]
    fn deref(&self) -> &Value {
        self.root()
    }
}

impl<A: Allocator> Drop for Document<'_, A> {
    fn drop(&mut self) {
        // SAFETY: root came from parse_raw on this session and is dropped once
        unsafe { self.session.destroy_raw(self.root) }
    }
}

impl<A: Allocator> fmt::Debug for Document<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Document").field(self.root()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::alloc::CountingAllocator;
    use crate::engine::error::LexErrorKind;
    use crate::engine::value::ValueType;

    #[test]
    fn test_parse_many_texts() {
        let session = Session::new(CountingAllocator::new());

        let a = session.parse(r#"{"k": [1, 2]}"#).unwrap();
        let b = session.parse(r#""text""#).unwrap();
        let c = session.parse("4.5e1").unwrap();
        assert_eq!(session.live_trees(), 3);

        assert_eq!(a.value_type(), ValueType::Object);
        assert_eq!(b.as_str(), Ok("text"));
        assert_eq!(c.as_float(), Ok(45.0));

        session.destroy_document(b);
        assert_eq!(session.live_trees(), 2);
        drop(a);
        drop(c);
        assert_eq!(session.live_trees(), 0);

        let counting = session.destroy();
        assert_eq!(counting.outstanding_blocks(), 0);
    }

    #[test]
    fn test_failed_parse_keeps_session_usable() {
        let session = Session::new(CountingAllocator::new());

        let err = session.parse(r#"[1, "unterminated"#).unwrap_err();
        assert_eq!(
            err,
            ParseError::Lexical {
                kind: LexErrorKind::UnterminatedString,
                offset: 17
            }
        );
        assert_eq!(session.live_trees(), 0);
        assert_eq!(session.allocator().outstanding_blocks(), 0);

        let doc = session.parse("[true]").unwrap();
        assert_eq!(doc.array_get(0).unwrap().as_bool(), Ok(true));
    }

    #[test]
    fn test_parse_bytes_validates_utf8() {
        let session: Session = Session::default();
        assert_eq!(
            session.parse_bytes(b"[\"ab\xff\"]").unwrap_err(),
            ParseError::InvalidUtf8 { offset: 4 }
        );
        let doc = session.parse_bytes("[\"h\u{e9}\"]".as_bytes()).unwrap();
        assert_eq!(doc.array_get(0).unwrap().as_str(), Ok("h\u{e9}"));
    }

    #[test]
    fn test_input_size_limit() {
        let config = SessionConfig::new().with_max_input_size(8);
        let session = Session::with_config(SystemAllocator, config);
        assert!(session.parse("[1, 2, 3]").is_err());
        assert_eq!(
            session.parse("[1, 2, 3]").unwrap_err(),
            ParseError::InputTooLarge {
                input_size: 9,
                max_size: 8
            }
        );
        assert!(session.parse("[1, 2]").is_ok());
    }

    #[test]
    fn test_zero_depth_rejects_containers() {
        let config = SessionConfig::new().with_max_depth(0);
        let session = Session::with_config(CountingAllocator::new(), config);
        assert!(session.parse("42").is_ok());
        assert!(matches!(
            session.parse("[]"),
            Err(ParseError::DepthExceeded { depth: 1, max_depth: 0, .. })
        ));
        assert_eq!(session.allocator().outstanding_blocks(), 0);
    }

    #[test]
    fn test_raw_api() {
        let session = Session::new(CountingAllocator::new());
        let root = session.parse_raw(b"[null, {}]").unwrap();
        assert_eq!(session.live_trees(), 1);
        unsafe {
            assert_eq!(root.as_ref().array_len(), Ok(2));
            session.destroy_raw(root);
        }
        assert_eq!(session.live_trees(), 0);
        assert_eq!(session.destroy().outstanding_blocks(), 0);
    }

    #[test]
    fn test_destroy_releases_live_raw_trees() {
        let session = Session::new(CountingAllocator::new());
        let kept = session.parse_raw(br#"{"a": ["x", "y"], "b": {"c": 1}}"#).unwrap();
        session.parse_raw(b"[1, 2, \"three\"]").unwrap();
        let gone = session.parse_raw(b"\"short\"").unwrap();
        unsafe {
            session.destroy_raw(gone);
            // a second destroy of the same root is ignored
            session.destroy_raw(gone);
            assert_eq!(kept.as_ref().object_len(), Ok(2));
        }
        assert_eq!(session.live_trees(), 2);
        assert!(session.allocator().outstanding_blocks() > 0);

        let counting = session.destroy();
        assert_eq!(counting.outstanding_blocks(), 0);
        assert_eq!(counting.outstanding_bytes(), 0);
    }

    #[test]
    fn test_dropped_session_releases_live_raw_trees() {
        let counting = CountingAllocator::new();
        {
            let session = Session::new(&counting);
            session.parse_raw(br#"[{"k": "v"}, [true]]"#).unwrap();
            assert!(counting.outstanding_blocks() > 0);
        }
        assert_eq!(counting.outstanding_blocks(), 0);
    }

    #[test]
    fn test_root_record_freed_with_last_tree() {
        let session = Session::new(CountingAllocator::new());
        let a = session.parse("[1]").unwrap();
        let b = session.parse("[2]").unwrap();
        drop(a);
        assert!(session.allocator().outstanding_blocks() > 0);
        drop(b);
        assert_eq!(session.allocator().outstanding_blocks(), 0);
    }

    #[test]
    fn test_config_from_json() {
        let config = SessionConfig::from_json(r#"{"max_depth": 4}"#).unwrap();
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.max_input_size, DEFAULT_MAX_INPUT_SIZE);

        let text = SessionConfig::default().to_json().unwrap();
        assert!(text.contains("\"max_depth\":512"));
        assert_eq!(SessionConfig::from_json(&text).unwrap(), SessionConfig::default());
        assert!(SessionConfig::from_json(r#"{"max_depth": -1}"#).is_err());
    }
}
