//! Allocator adapter
//!
//! Every block the engine creates (string bytes, array items, object entries,
//! object indexes and the root slot of a tree) is requested from an
//! [`Allocator`] supplied by the caller when the session is created. The
//! engine never touches the global allocator on its own.
//!
//! The [`AllocatorAdapter`] sits between the engine and the caller's
//! allocator: it computes layouts, implements the grow policy (in-place
//! resize first, then allocate-copy-free) and keeps the per-session counters
//! reported by [`AllocStats`].

use std::alloc::Layout;
use std::cell::Cell;
use std::mem;
use std::ptr::{self, NonNull};

use serde::{Deserialize, Serialize};

use super::error::AllocError;

/// Allocation strategy injected into a session
///
/// The three operations mirror an allocate/resize/free vtable. Methods take
/// `&self`; stateful allocators use interior mutability.
///
/// The engine never requests zero-sized blocks.
pub trait Allocator {
    /// Allocate a block for `layout`, or `None` if the request cannot be met
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Resize `block` in place to `new_size` bytes, keeping its alignment
    ///
    /// Returns `false` when the block cannot be resized without moving; the
    /// block is then left untouched.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by [`allocate`](Self::allocate) on this
    /// allocator with `layout` (or resized to `layout.size()` since).
    unsafe fn resize(&self, block: NonNull<u8>, layout: Layout, new_size: usize) -> bool;

    /// Release `block`
    ///
    /// # Safety
    ///
    /// `block` must have been returned by [`allocate`](Self::allocate) on this
    /// allocator with `layout` (or resized to `layout.size()` since), and must
    /// not be used afterwards.
    unsafe fn free(&self, block: NonNull<u8>, layout: Layout);
}

impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn resize(&self, block: NonNull<u8>, layout: Layout, new_size: usize) -> bool {
        (**self).resize(block, layout, new_size)
    }

    #[inline]
    unsafe fn free(&self, block: NonNull<u8>, layout: Layout) {
        (**self).free(block, layout)
    }
}

impl<A: Allocator + ?Sized> Allocator for Box<A> {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn resize(&self, block: NonNull<u8>, layout: Layout, new_size: usize) -> bool {
        (**self).resize(block, layout, new_size)
    }

    #[inline]
    unsafe fn free(&self, block: NonNull<u8>, layout: Layout) {
        (**self).free(block, layout)
    }
}

/// The Rust global allocator
///
/// Cannot resize in place; growth always moves the block.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: layout has a non-zero size
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    #[inline]
    unsafe fn resize(&self, _block: NonNull<u8>, layout: Layout, new_size: usize) -> bool {
        new_size == layout.size()
    }

    #[inline]
    unsafe fn free(&self, block: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(block.as_ptr(), layout)
    }
}

/// Snapshot of allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocStats {
    /// Blocks allocated and not yet freed
    pub live_blocks: usize,
    /// Bytes held by live blocks
    pub live_bytes: usize,
    /// Highest value `live_bytes` reached
    pub peak_bytes: usize,
    /// Successful allocations so far
    pub total_allocations: usize,
    /// Refused allocations so far
    pub failed_allocations: usize,
}

impl AllocStats {
    /// Serialize to JSON for reporting
    #[inline]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Counter cells shared by the tracking types in this module
#[derive(Debug, Default)]
struct Counters {
    live_blocks: Cell<usize>,
    live_bytes: Cell<usize>,
    peak_bytes: Cell<usize>,
    total_allocations: Cell<usize>,
    failed_allocations: Cell<usize>,
}

impl Counters {
    #[inline]
    fn on_alloc(&self, size: usize) {
        self.live_blocks.set(self.live_blocks.get() + 1);
        self.total_allocations.set(self.total_allocations.get() + 1);
        self.grow(0, size);
    }

    #[inline]
    fn on_fail(&self) {
        self.failed_allocations
            .set(self.failed_allocations.get() + 1);
    }

    #[inline]
    fn grow(&self, old_size: usize, new_size: usize) {
        let bytes = self.live_bytes.get() - old_size + new_size;
        self.live_bytes.set(bytes);
        if bytes > self.peak_bytes.get() {
            self.peak_bytes.set(bytes);
        }
    }

    #[inline]
    fn on_free(&self, size: usize) {
        self.live_blocks.set(self.live_blocks.get() - 1);
        self.live_bytes.set(self.live_bytes.get() - size);
    }

    fn snapshot(&self) -> AllocStats {
        AllocStats {
            live_blocks: self.live_blocks.get(),
            live_bytes: self.live_bytes.get(),
            peak_bytes: self.peak_bytes.get(),
            total_allocations: self.total_allocations.get(),
            failed_allocations: self.failed_allocations.get(),
        }
    }
}

/// Tracking wrapper around another allocator
///
/// Counts outstanding blocks and bytes so leak-freedom can be checked:
/// after every tree is destroyed, [`outstanding_blocks`](Self::outstanding_blocks)
/// is back to where it started.
#[derive(Debug, Default)]
pub struct CountingAllocator<A = SystemAllocator> {
    inner: A,
    counters: Counters,
}

impl CountingAllocator<SystemAllocator> {
    /// Track the system allocator
    pub fn new() -> Self {
        Self::wrap(SystemAllocator)
    }
}

impl<A: Allocator> CountingAllocator<A> {
    /// Track `inner`
    pub fn wrap(inner: A) -> Self {
        Self {
            inner,
            counters: Counters::default(),
        }
    }

    /// Blocks allocated and not yet freed
    #[inline]
    pub fn outstanding_blocks(&self) -> usize {
        self.counters.live_blocks.get()
    }

    /// Bytes held by outstanding blocks
    #[inline]
    pub fn outstanding_bytes(&self) -> usize {
        self.counters.live_bytes.get()
    }

    /// Current counter values
    pub fn stats(&self) -> AllocStats {
        self.counters.snapshot()
    }

    /// The wrapped allocator
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: Allocator> Allocator for CountingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        match self.inner.allocate(layout) {
            Some(block) => {
                self.counters.on_alloc(layout.size());
                Some(block)
            }
            None => {
                self.counters.on_fail();
                None
            }
        }
    }

    unsafe fn resize(&self, block: NonNull<u8>, layout: Layout, new_size: usize) -> bool {
        let resized = self.inner.resize(block, layout, new_size);
        if resized {
            self.counters.grow(layout.size(), new_size);
        }
        resized
    }

    unsafe fn free(&self, block: NonNull<u8>, layout: Layout) {
        self.inner.free(block, layout);
        self.counters.on_free(layout.size());
    }
}

/// Allocator with a byte budget
///
/// Refuses any allocation or resize that would take the bytes it has handed
/// out over `max_bytes`. Useful as a memory limit and for exercising
/// out-of-memory paths.
#[derive(Debug)]
pub struct LimitedAllocator<A = SystemAllocator> {
    inner: A,
    max_bytes: usize,
    used: Cell<usize>,
}

impl<A: Allocator> LimitedAllocator<A> {
    /// Limit `inner` to `max_bytes` outstanding bytes
    pub fn new(inner: A, max_bytes: usize) -> Self {
        Self {
            inner,
            max_bytes,
            used: Cell::new(0),
        }
    }

    /// Bytes currently handed out
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.used.get()
    }

    /// The configured budget
    #[inline]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    #[inline]
    fn fits(&self, extra: usize) -> bool {
        self.used
            .get()
            .checked_add(extra)
            .is_some_and(|total| total <= self.max_bytes)
    }
}

impl<A: Allocator> Allocator for LimitedAllocator<A> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if !self.fits(layout.size()) {
            return None;
        }
        let block = self.inner.allocate(layout)?;
        self.used.set(self.used.get() + layout.size());
        Some(block)
    }

    unsafe fn resize(&self, block: NonNull<u8>, layout: Layout, new_size: usize) -> bool {
        if new_size > layout.size() && !self.fits(new_size - layout.size()) {
            return false;
        }
        let resized = self.inner.resize(block, layout, new_size);
        if resized {
            self.used.set(self.used.get() - layout.size() + new_size);
        }
        resized
    }

    unsafe fn free(&self, block: NonNull<u8>, layout: Layout) {
        self.inner.free(block, layout);
        self.used.set(self.used.get() - layout.size());
    }
}

/// Uniform allocation interface used by every engine component
///
/// Binds one [`Allocator`] and keeps the counters of blocks it has handed
/// out, so a session can report what its live trees hold.
#[derive(Debug)]
pub struct AllocatorAdapter<A: Allocator> {
    inner: A,
    counters: Counters,
}

impl<A: Allocator> AllocatorAdapter<A> {
    /// Bind an allocator
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            counters: Counters::default(),
        }
    }

    /// The bound allocator
    #[inline]
    pub fn allocator(&self) -> &A {
        &self.inner
    }

    /// Unbind and return the allocator
    pub fn into_inner(self) -> A {
        self.inner
    }

    /// Current counter values for blocks requested through this adapter
    pub fn stats(&self) -> AllocStats {
        self.counters.snapshot()
    }

    /// Allocate room for `cap` values of `T`
    pub(crate) fn alloc_slice<T>(&self, cap: usize) -> Result<NonNull<T>, AllocError> {
        debug_assert!(cap > 0 && mem::size_of::<T>() > 0);
        let layout = Layout::array::<T>(cap).map_err(|_| AllocError::capacity_overflow())?;
        match self.inner.allocate(layout) {
            Some(block) => {
                self.counters.on_alloc(layout.size());
                Ok(block.cast())
            }
            None => {
                self.counters.on_fail();
                Err(AllocError {
                    requested: layout.size(),
                })
            }
        }
    }

    /// Grow a block of `old_cap` values (the first `len` initialized) to `new_cap`
    ///
    /// Tries an in-place resize first, then moves the initialized prefix to
    /// a fresh block. On failure the old block is untouched.
    ///
    /// # Safety
    ///
    /// `block` must come from [`alloc_slice`](Self::alloc_slice) or this
    /// method on the same adapter with capacity `old_cap`, and
    /// `len <= old_cap <= new_cap`.
    pub(crate) unsafe fn grow_slice<T>(
        &self,
        block: NonNull<T>,
        len: usize,
        old_cap: usize,
        new_cap: usize,
    ) -> Result<NonNull<T>, AllocError> {
        debug_assert!(len <= old_cap && old_cap <= new_cap);
        let old_layout = Layout::array::<T>(old_cap).map_err(|_| AllocError::capacity_overflow())?;
        let new_layout = Layout::array::<T>(new_cap).map_err(|_| AllocError::capacity_overflow())?;

        if self
            .inner
            .resize(block.cast(), old_layout, new_layout.size())
        {
            self.counters.grow(old_layout.size(), new_layout.size());
            return Ok(block);
        }

        let fresh = self.alloc_slice::<T>(new_cap)?;
        ptr::copy_nonoverlapping(block.as_ptr(), fresh.as_ptr(), len);
        self.free_slice(block, old_cap);
        Ok(fresh)
    }

    /// Release a block of `cap` values
    ///
    /// # Safety
    ///
    /// `block` must come from this adapter with capacity `cap` and must not
    /// be used afterwards. Values stored in it are not released.
    pub(crate) unsafe fn free_slice<T>(&self, block: NonNull<T>, cap: usize) {
        // The layout was computable when the block was allocated
        if let Ok(layout) = Layout::array::<T>(cap) {
            self.inner.free(block.cast(), layout);
            self.counters.on_free(layout.size());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_allocator_roundtrip() {
        let layout = Layout::array::<u64>(4).unwrap();
        let block = SystemAllocator.allocate(layout).unwrap();
        unsafe {
            assert!(SystemAllocator.resize(block, layout, layout.size()));
            assert!(!SystemAllocator.resize(block, layout, layout.size() * 2));
            SystemAllocator.free(block, layout);
        }
    }

    #[test]
    fn test_system_allocator_refuses_zero_size() {
        let layout = Layout::from_size_align(0, 1).unwrap();
        assert!(SystemAllocator.allocate(layout).is_none());
    }

    #[test]
    fn test_counting_allocator_tracks_blocks() {
        let counting = CountingAllocator::new();
        let layout = Layout::array::<u8>(32).unwrap();

        let a = counting.allocate(layout).unwrap();
        let b = counting.allocate(layout).unwrap();
        assert_eq!(counting.outstanding_blocks(), 2);
        assert_eq!(counting.outstanding_bytes(), 64);

        unsafe {
            counting.free(a, layout);
            counting.free(b, layout);
        }
        let stats = counting.stats();
        assert_eq!(stats.live_blocks, 0);
        assert_eq!(stats.live_bytes, 0);
        assert_eq!(stats.peak_bytes, 64);
        assert_eq!(stats.total_allocations, 2);
    }

    #[test]
    fn test_limited_allocator_budget() {
        let limited = LimitedAllocator::new(SystemAllocator, 48);
        let layout = Layout::array::<u8>(32).unwrap();

        let a = limited.allocate(layout).unwrap();
        assert_eq!(limited.used_bytes(), 32);
        assert!(limited.allocate(layout).is_none());

        unsafe { limited.free(a, layout) };
        assert_eq!(limited.used_bytes(), 0);
        let b = limited.allocate(layout).unwrap();
        unsafe { limited.free(b, layout) };
        assert_eq!(limited.max_bytes(), 48);
    }

    #[test]
    fn test_counting_records_failures() {
        let counting = CountingAllocator::wrap(LimitedAllocator::new(SystemAllocator, 8));
        let layout = Layout::array::<u8>(16).unwrap();
        assert!(counting.allocate(layout).is_none());
        assert_eq!(counting.stats().failed_allocations, 1);
        assert_eq!(counting.outstanding_blocks(), 0);
    }

    #[test]
    fn test_adapter_grow_moves_prefix() {
        let counting = CountingAllocator::new();
        let adapter = AllocatorAdapter::new(&counting);

        let block = adapter.alloc_slice::<u32>(2).unwrap();
        unsafe {
            block.as_ptr().write(7);
            block.as_ptr().add(1).write(9);
            let grown = adapter.grow_slice(block, 2, 2, 8).unwrap();
            assert_eq!(*grown.as_ptr(), 7);
            assert_eq!(*grown.as_ptr().add(1), 9);
            assert_eq!(counting.outstanding_blocks(), 1);
            assert_eq!(counting.outstanding_bytes(), 32);
            adapter.free_slice(grown, 8);
        }
        assert_eq!(counting.outstanding_blocks(), 0);
        assert_eq!(adapter.stats().live_blocks, 0);
        assert_eq!(adapter.stats().total_allocations, 2);
    }

    #[test]
    fn test_adapter_reports_refused_size() {
        let adapter = AllocatorAdapter::new(LimitedAllocator::new(SystemAllocator, 4));
        let err = adapter.alloc_slice::<u64>(1).unwrap_err();
        assert_eq!(err.requested, 8);
        assert_eq!(adapter.stats().failed_allocations, 1);
    }

    #[test]
    fn test_adapter_capacity_overflow() {
        let adapter = AllocatorAdapter::new(SystemAllocator);
        let err = adapter.alloc_slice::<u64>(usize::MAX).unwrap_err();
        assert_eq!(err, AllocError::capacity_overflow());
    }

    #[test]
    fn test_stats_to_json() {
        let adapter = AllocatorAdapter::new(SystemAllocator);
        let block = adapter.alloc_slice::<u8>(10).unwrap();
        let json = adapter.stats().to_json().unwrap();
        assert!(json.contains("\"live_blocks\":1"));
        assert!(json.contains("\"peak_bytes\":10"));
        unsafe { adapter.free_slice(block, 10) };
    }
}
