//! Growable buffers backed by an [`AllocatorAdapter`]
//!
//! `RawBuf` is a minimal vector whose block comes from the session's
//! allocator. It has no `Drop`: the owner releases the block (and whatever
//! the elements own) explicitly through the same adapter.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::slice;

use super::alloc::{Allocator, AllocatorAdapter};
use super::error::AllocError;

/// Smallest capacity allocated for a non-empty buffer
const MIN_CAPACITY: usize = 4;

pub(crate) struct RawBuf<T> {
    ptr: NonNull<T>,
    len: usize,
    cap: usize,
    _owns: PhantomData<T>,
}

// SAFETY: a RawBuf uniquely owns its elements like Vec<T> does
unsafe impl<T: Send> Send for RawBuf<T> {}
// SAFETY: shared access only hands out &T
unsafe impl<T: Sync> Sync for RawBuf<T> {}

impl<T> RawBuf<T> {
    /// Empty buffer holding no block
    #[inline]
    pub(crate) const fn new() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            cap: 0,
            _owns: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` elements are initialized; a dangling
        // pointer is valid for an empty slice
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as in `as_slice`, and `&mut self` guarantees uniqueness
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Make room for `additional` more elements
    ///
    /// Capacity at least doubles so repeated pushes stay amortized O(1).
    pub(crate) fn reserve<A: Allocator>(
        &mut self,
        heap: &AllocatorAdapter<A>,
        additional: usize,
    ) -> Result<(), AllocError> {
        let needed = self
            .len
            .checked_add(additional)
            .ok_or_else(AllocError::capacity_overflow)?;
        if needed <= self.cap {
            return Ok(());
        }

        let doubled = self.cap.saturating_mul(2);
        let new_cap = needed.max(doubled).max(MIN_CAPACITY);

        self.ptr = if self.cap == 0 {
            heap.alloc_slice(new_cap)?
        } else {
            // SAFETY: ptr/cap describe a block from this adapter
            unsafe { heap.grow_slice(self.ptr, self.len, self.cap, new_cap)? }
        };
        self.cap = new_cap;
        Ok(())
    }

    /// Append without growing
    #[inline]
    pub(crate) fn push_within_capacity(&mut self, item: T) {
        assert!(self.len < self.cap, "push past reserved capacity");
        // SAFETY: len < cap so the slot is inside the block
        unsafe { self.ptr.as_ptr().add(self.len).write(item) };
        self.len += 1;
    }

    /// Insert at `at` without growing, shifting the tail up by one
    pub(crate) fn insert_within_capacity(&mut self, at: usize, item: T) {
        assert!(at <= self.len, "insert position past len");
        assert!(self.len < self.cap, "insert past reserved capacity");
        // SAFETY: len < cap leaves room to shift [at, len) up by one slot
        unsafe {
            let p = self.ptr.as_ptr().add(at);
            ptr::copy(p, p.add(1), self.len - at);
            p.write(item);
        }
        self.len += 1;
    }

    /// Remove the element at `at`, moving the last element into its slot
    pub(crate) fn swap_remove(&mut self, at: usize) -> T {
        assert!(at < self.len, "swap_remove index out of bounds");
        self.len -= 1;
        // SAFETY: `at` and the old last slot are initialized; the last slot
        // is past len now and is read at most once
        unsafe {
            let base = self.ptr.as_ptr();
            let item = ptr::read(base.add(at));
            if at != self.len {
                ptr::copy_nonoverlapping(base.add(self.len), base.add(at), 1);
            }
            item
        }
    }

    /// Move every element out through `f`, then release the block
    ///
    /// # Safety
    ///
    /// The block must come from `heap`.
    pub(crate) unsafe fn consume<A, F>(self, heap: &AllocatorAdapter<A>, mut f: F)
    where
        A: Allocator,
        F: FnMut(T),
    {
        for i in 0..self.len {
            f(ptr::read(self.ptr.as_ptr().add(i)));
        }
        if self.cap > 0 {
            heap.free_slice(self.ptr, self.cap);
        }
    }
}

impl<T: Copy> RawBuf<T> {
    /// Append a slice of plain values
    pub(crate) fn extend_from_slice<A: Allocator>(
        &mut self,
        heap: &AllocatorAdapter<A>,
        items: &[T],
    ) -> Result<(), AllocError> {
        if items.is_empty() {
            return Ok(());
        }
        self.reserve(heap, items.len())?;
        // SAFETY: reserve guarantees room for items.len() more elements and
        // the source cannot overlap a block we own exclusively
        unsafe {
            ptr::copy_nonoverlapping(items.as_ptr(), self.ptr.as_ptr().add(self.len), items.len());
        }
        self.len += items.len();
        Ok(())
    }
}
