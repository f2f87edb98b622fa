//! Address-space providers: where a [`Heap`](crate::Heap) gets its memory from.

use core::{fmt::Debug, ptr::NonNull};

use crate::{block::GRANULE, Span};

#[cfg(all(unix, feature = "system-backed"))]
mod unix;

#[cfg(all(unix, feature = "system-backed"))]
pub use unix::MmapSpace;

/// Supplies the memory a [`Heap`](crate::Heap) lives in.
///
/// The heap asks once for its initial region with [`AddressSpace::acquire`], then
/// grows it with [`AddressSpace::extend`], always at the current end of the region.
/// A heap is one linear range of memory, so providers must either extend the
/// region in place or fail.
///
/// # Safety
/// Implementors must uphold that:
/// - memory returned by `acquire` and committed by `extend` is readable, writable,
///   zero-filled, and not used by anything else until `release` is called on it.
/// - `acquire` returns pointers aligned to [`GRANULE`](crate::GRANULE).
/// - `extend` returning `Ok(())` means exactly `end..end + additional` was committed.
///
/// Implementations must not allocate from the heap that owns them.
/// When that heap is the global allocator, this includes indirect use
/// through things like `println!` or a `Vec` in a `static`.
pub unsafe trait AddressSpace: Debug {
    /// Acquire a fresh region of `size` bytes.
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Commit `additional` bytes starting at `end`, the current end of the region.
    ///
    /// # Safety
    /// `end` must be the end of the region built from the last `acquire`
    /// and every successful `extend` since.
    unsafe fn extend(&mut self, end: NonNull<u8>, additional: usize) -> Result<(), ()>;

    /// Give back the whole region.
    ///
    /// # Safety
    /// `base..base + size` must be the whole region, and it must not be used afterwards.
    #[inline]
    unsafe fn release(&mut self, base: NonNull<u8>, size: usize) {
        let _ = (base, size);
    }
}

/// Never supplies memory; every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpace;

// SAFETY: no memory is ever handed out
unsafe impl AddressSpace for NoSpace {
    #[inline]
    fn acquire(&mut self, _size: usize) -> Option<NonNull<u8>> {
        None
    }

    #[inline]
    unsafe fn extend(&mut self, _end: NonNull<u8>, _additional: usize) -> Result<(), ()> {
        Err(())
    }
}

/// Hands out a fixed [`Span`] of memory, front to back.
///
/// The span is aligned inward to the granule. The region starts at the bottom of the
/// span and grows until the span is used up. Memory is zeroed as it's handed out.
///
/// # Example
/// ```
/// # use ffheap::*;
/// let arena = Box::leak(vec![0u8; 1 << 16].into_boxed_slice());
/// let mut heap = Heap::new(unsafe { SliceSpace::new(arena.into()) });
/// heap.init().unwrap();
/// ```
#[derive(Debug)]
pub struct SliceSpace {
    /// Memory not yet handed out.
    remaining: Span,
    /// Whether `acquire` has handed out the bottom of the span.
    acquired: bool,
}

impl SliceSpace {
    /// # Safety
    /// The memory within `span` must be valid for reads and writes, and must not be
    /// touched by anything besides the heap this provider is given to.
    pub unsafe fn new(span: Span) -> Self {
        Self { remaining: span.granule_align_inward(), acquired: false }
    }

    /// # Safety
    /// See [`SliceSpace::new`].
    pub unsafe fn array<T, const N: usize>(array: *mut [T; N]) -> Self {
        Self::new(Span::from_base_size(array.cast(), N * core::mem::size_of::<T>()))
    }

    /// Bytes that can still be handed out.
    pub fn available(&self) -> usize {
        self.remaining.size()
    }

    fn take(&mut self, size: usize) -> Option<NonNull<u8>> {
        let (taken, rest) = self.remaining.split_at(size)?;
        self.remaining = rest;

        // SAFETY: the span is ours to write, per `SliceSpace::new`
        unsafe { taken.base().write_bytes(0, size) };
        NonNull::new(taken.base())
    }
}

unsafe impl Send for SliceSpace {}

// SAFETY: pieces are taken contiguously from the bottom of a span the caller vouched for
unsafe impl AddressSpace for SliceSpace {
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>> {
        if self.acquired || size % GRANULE != 0 {
            return None;
        }

        let base = self.take(size)?;
        self.acquired = true;
        Some(base)
    }

    unsafe fn extend(&mut self, end: NonNull<u8>, additional: usize) -> Result<(), ()> {
        if !self.acquired || end.as_ptr() != self.remaining.base() {
            return Err(());
        }

        self.take(additional).map(|_| ()).ok_or(())
    }
}
