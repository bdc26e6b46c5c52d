//! Tree construction and teardown
//!
//! Nodes under construction are held by guards that release them through
//! the session's adapter when dropped. A parse that fails halfway therefore
//! unwinds through `?` and frees every partially built child on the way
//! out; a parse that succeeds defuses the guards with `into_inner`/`finish`.

use std::mem::ManuallyDrop;

use super::alloc::{Allocator, AllocatorAdapter};
use super::error::AllocError;
use super::raw::RawBuf;
use super::value::{Array, Entry, Object, Str, Value};

/// Something that owns blocks from an adapter
pub(crate) trait Release {
    /// Free every block owned by `self`
    ///
    /// # Safety
    ///
    /// All of `self`'s blocks must come from `heap`.
    unsafe fn release<A: Allocator>(self, heap: &AllocatorAdapter<A>);
}

impl Release for Str {
    unsafe fn release<A: Allocator>(self, heap: &AllocatorAdapter<A>) {
        self.bytes.consume(heap, |_| {});
    }
}

impl Release for Value {
    unsafe fn release<A: Allocator>(self, heap: &AllocatorAdapter<A>) {
        match self {
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Null => {}
            Value::String(s) => s.release(heap),
            Value::Array(a) => a.items.consume(heap, |item| item.release(heap)),
            Value::Object(o) => {
                o.entries.consume(heap, |entry| entry.release(heap));
                o.index.consume(heap, |_| {});
            }
        }
    }
}

impl Release for Entry {
    unsafe fn release<A: Allocator>(self, heap: &AllocatorAdapter<A>) {
        self.key.release(heap);
        self.value.release(heap);
    }
}

/// Owns a node until it is linked into its parent
pub(crate) struct Guard<'h, A: Allocator, T: Release> {
    item: ManuallyDrop<T>,
    heap: &'h AllocatorAdapter<A>,
}

impl<'h, A: Allocator, T: Release> Guard<'h, A, T> {
    #[inline]
    pub(crate) fn new(item: T, heap: &'h AllocatorAdapter<A>) -> Self {
        Self {
            item: ManuallyDrop::new(item),
            heap,
        }
    }

    /// Defuse the guard and hand out the node
    #[inline]
    pub(crate) fn into_inner(self) -> T {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the item is moved out once
        unsafe { ManuallyDrop::take(&mut this.item) }
    }

    /// Convert the guarded node, keeping it guarded
    #[inline]
    pub(crate) fn map<U: Release>(self, f: impl FnOnce(T) -> U) -> Guard<'h, A, U> {
        let heap = self.heap;
        Guard::new(f(self.into_inner()), heap)
    }

    #[inline]
    pub(crate) fn get(&self) -> &T {
        &self.item
    }
}

impl<A: Allocator, T: Release> Drop for Guard<'_, A, T> {
    fn drop(&mut self) {
        // SAFETY: the item came from `self.heap` and is dropped exactly once
        unsafe { ManuallyDrop::take(&mut self.item).release(self.heap) }
    }
}

/// Accumulates decoded string bytes
pub(crate) struct StrBuilder<'h, A: Allocator> {
    bytes: RawBuf<u8>,
    heap: &'h AllocatorAdapter<A>,
}

impl<'h, A: Allocator> StrBuilder<'h, A> {
    #[inline]
    pub(crate) fn new(heap: &'h AllocatorAdapter<A>) -> Self {
        Self {
            bytes: RawBuf::new(),
            heap,
        }
    }

    #[inline]
    pub(crate) fn extend(&mut self, bytes: &[u8]) -> Result<(), AllocError> {
        self.bytes.extend_from_slice(self.heap, bytes)
    }

    #[inline]
    pub(crate) fn push(&mut self, byte: u8) -> Result<(), AllocError> {
        self.extend(&[byte])
    }

    #[inline]
    pub(crate) fn push_char(&mut self, c: char) -> Result<(), AllocError> {
        let mut utf8 = [0u8; 4];
        self.extend(c.encode_utf8(&mut utf8).as_bytes())
    }

    /// Terminate with NUL and hand out the guarded string
    pub(crate) fn finish(mut self) -> Result<Guard<'h, A, Str>, AllocError> {
        let heap = self.heap;
        if self.bytes.is_empty() {
            return Ok(Guard::new(Str::empty(), heap));
        }
        self.bytes.reserve(heap, 1)?;
        let len = self.bytes.len();
        // SAFETY: reserve(1) leaves room for one byte past len
        unsafe { self.bytes.as_mut_ptr().add(len).write(0) };

        let mut this = ManuallyDrop::new(self);
        let bytes = std::mem::replace(&mut this.bytes, RawBuf::new());
        Ok(Guard::new(Str { bytes }, heap))
    }
}

impl<A: Allocator> Drop for StrBuilder<'_, A> {
    fn drop(&mut self) {
        let bytes = std::mem::replace(&mut self.bytes, RawBuf::new());
        // SAFETY: the block came from self.heap
        unsafe { bytes.consume(self.heap, |_| {}) }
    }
}

/// Collects array items
pub(crate) struct ArrayBuilder<'h, A: Allocator> {
    items: RawBuf<Value>,
    heap: &'h AllocatorAdapter<A>,
}

impl<'h, A: Allocator> ArrayBuilder<'h, A> {
    #[inline]
    pub(crate) fn new(heap: &'h AllocatorAdapter<A>) -> Self {
        Self {
            items: RawBuf::new(),
            heap,
        }
    }

    /// Append an item; on failure the item is released with the guard
    pub(crate) fn push(&mut self, item: Guard<'h, A, Value>) -> Result<(), AllocError> {
        self.items.reserve(self.heap, 1)?;
        self.items.push_within_capacity(item.into_inner());
        Ok(())
    }

    pub(crate) fn finish(self) -> Guard<'h, A, Value> {
        let heap = self.heap;
        let mut this = ManuallyDrop::new(self);
        let items = std::mem::replace(&mut this.items, RawBuf::new());
        Guard::new(Value::Array(Array { items }), heap)
    }
}

impl<A: Allocator> Drop for ArrayBuilder<'_, A> {
    fn drop(&mut self) {
        let items = std::mem::replace(&mut self.items, RawBuf::new());
        let heap = self.heap;
        // SAFETY: the block and every item came from self.heap
        unsafe { items.consume(heap, |item| item.release(heap)) }
    }
}

/// Collects object fields
///
/// Keys stay unique while the object is built. A repeated key overwrites the
/// stored value in place, so the field keeps its first position, and the
/// overwritten value and the repeated key are released at once. From the
/// second field on, `index` holds entry positions sorted by key.
pub(crate) struct ObjectBuilder<'h, A: Allocator> {
    entries: RawBuf<Entry>,
    index: RawBuf<u32>,
    heap: &'h AllocatorAdapter<A>,
}

impl<'h, A: Allocator> ObjectBuilder<'h, A> {
    #[inline]
    pub(crate) fn new(heap: &'h AllocatorAdapter<A>) -> Self {
        Self {
            entries: RawBuf::new(),
            index: RawBuf::new(),
            heap,
        }
    }

    /// Position of the entry named `key`
    fn find(&self, key: &[u8]) -> Option<usize> {
        let entries = self.entries.as_slice();
        if self.index.is_empty() {
            return entries.iter().position(|e| e.key.as_bytes() == key);
        }
        let index = self.index.as_slice();
        index
            .binary_search_by(|&pos| entries[pos as usize].key.as_bytes().cmp(key))
            .ok()
            .map(|slot| index[slot] as usize)
    }

    /// Add a field, or overwrite the value of an existing one
    ///
    /// On failure key and value are released with their guards.
    pub(crate) fn insert(
        &mut self,
        key: Guard<'h, A, Str>,
        value: Guard<'h, A, Value>,
    ) -> Result<(), AllocError> {
        if let Some(pos) = self.find(key.get().as_bytes()) {
            let slot = &mut self.entries.as_mut_slice()[pos].value;
            let old = std::mem::replace(slot, value.into_inner());
            // SAFETY: every stored value was built from self.heap
            unsafe { old.release(self.heap) };
            log_trace!("duplicate key {:?} overwritten", key.get().as_str());
            return Ok(());
        }

        let n = self.entries.len();
        if n >= u32::MAX as usize {
            return Err(AllocError::capacity_overflow());
        }
        self.entries.reserve(self.heap, 1)?;
        if n > 0 {
            if self.index.is_empty() {
                self.index.reserve(self.heap, 2)?;
                self.index.push_within_capacity(0);
            } else {
                self.index.reserve(self.heap, 1)?;
            }
            let entries = self.entries.as_slice();
            let bytes = key.get().as_bytes();
            let slot = self
                .index
                .as_slice()
                .partition_point(|&pos| entries[pos as usize].key.as_bytes() < bytes);
            self.index.insert_within_capacity(slot, n as u32);
        }
        self.entries.push_within_capacity(Entry {
            key: key.into_inner(),
            value: value.into_inner(),
        });
        Ok(())
    }

    pub(crate) fn finish(self) -> Guard<'h, A, Value> {
        let heap = self.heap;
        let mut this = ManuallyDrop::new(self);
        let entries = std::mem::replace(&mut this.entries, RawBuf::new());
        let index = std::mem::replace(&mut this.index, RawBuf::new());
        Guard::new(Value::Object(Object { entries, index }), heap)
    }
}

impl<A: Allocator> Drop for ObjectBuilder<'_, A> {
    fn drop(&mut self) {
        let entries = std::mem::replace(&mut self.entries, RawBuf::new());
        let index = std::mem::replace(&mut self.index, RawBuf::new());
        let heap = self.heap;
        // SAFETY: the blocks and every entry came from self.heap
        unsafe {
            entries.consume(heap, |entry| entry.release(heap));
            index.consume(heap, |_| {});
        }
    }
}
