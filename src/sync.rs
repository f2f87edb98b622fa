//! Home of Heapck, a mutex-locked wrapper of Heap.

use core::{
    alloc::{GlobalAlloc, Layout},
    ptr::{null_mut, NonNull},
};

#[cfg(feature = "allocator-api2")]
use allocator_api2::alloc::{AllocError, Allocator};

use crate::{block::GRANULE, space::AddressSpace, Heap, HeapError};

/// Heap lock, contains a mutex-locked [`Heap`].
///
/// Allocations through the traits implemented here initialise the heap on first use,
/// so a `Heapck` can be declared as a `static` and made the global allocator.
/// Layouts aligned beyond [`GRANULE`] are refused.
///
/// # Example
/// ```rust
/// # use ffheap::*;
/// # let arena = Box::leak(vec![0u8; 1 << 16].into_boxed_slice());
/// let heap = Heap::new(unsafe { SliceSpace::new(arena.into()) });
/// let heapck = heap.lock::<spin::Mutex<()>>();
///
/// let mut vec = allocator_api2::vec::Vec::new_in(&heapck);
/// vec.extend([1u32, 2, 3]);
/// assert_eq!(heapck.lock().counters().live_blocks, 1);
/// ```
#[derive(Debug)]
pub struct Heapck<R: lock_api::RawMutex, S: AddressSpace> {
    mutex: lock_api::Mutex<R, Heap<S>>,
}

impl<R: lock_api::RawMutex, S: AddressSpace> Heapck<R, S> {
    /// Create a new `Heapck`.
    pub const fn new(heap: Heap<S>) -> Self {
        Self { mutex: lock_api::Mutex::new(heap) }
    }

    /// Lock the mutex and access the inner `Heap`.
    pub fn lock(&self) -> lock_api::MutexGuard<'_, R, Heap<S>> {
        self.mutex.lock()
    }

    /// Try to lock the mutex and access the inner `Heap`.
    pub fn try_lock(&self) -> Option<lock_api::MutexGuard<'_, R, Heap<S>>> {
        self.mutex.try_lock()
    }

    /// Retrieve the inner `Heap`.
    pub fn into_inner(self) -> Heap<S> {
        self.mutex.into_inner()
    }
}

impl<S: AddressSpace> Heap<S> {
    /// Wrap in [`Heapck`], a mutex-locked wrapper struct using [`lock_api`].
    ///
    /// This implements the [`GlobalAlloc`](core::alloc::GlobalAlloc) trait and provides
    /// access to the [`Allocator`](allocator_api2::alloc::Allocator) API.
    ///
    /// # Examples
    /// ```
    /// # use ffheap::*;
    /// # use core::alloc::{GlobalAlloc, Layout};
    /// use spin::Mutex;
    /// # let arena = Box::leak(vec![0u8; 1 << 16].into_boxed_slice());
    /// let heapck = Heap::new(unsafe { SliceSpace::new(arena.into()) }).lock::<Mutex<()>>();
    ///
    /// unsafe {
    ///     let ptr = heapck.alloc(Layout::from_size_align_unchecked(32, 4));
    ///     assert!(!ptr.is_null());
    /// }
    /// ```
    pub const fn lock<R: lock_api::RawMutex>(self) -> Heapck<R, S> {
        Heapck::new(self)
    }

    fn init_if_needed(&mut self) -> Result<(), HeapError> {
        if self.is_initialised() {
            Ok(())
        } else {
            self.init()
        }
    }

    fn alloc_layout(&mut self, layout: Layout, zeroed: bool) -> Result<NonNull<u8>, HeapError> {
        if layout.align() > GRANULE {
            return Err(HeapError::UnsupportedAlignment);
        }

        self.init_if_needed()?;
        if zeroed {
            self.calloc(1, layout.size())
        } else {
            self.malloc(layout.size())
        }
    }
}

unsafe impl<R: lock_api::RawMutex, S: AddressSpace> GlobalAlloc for Heapck<R, S> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.lock().alloc_layout(layout, false).map_or(null_mut(), |nn| nn.as_ptr())
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.lock().alloc_layout(layout, true).map_or(null_mut(), |nn| nn.as_ptr())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.lock().free(NonNull::new_unchecked(ptr))
    }

    unsafe fn realloc(&self, ptr: *mut u8, _old_layout: Layout, new_size: usize) -> *mut u8 {
        // `new_size` is nonzero, so this never frees
        match self.lock().realloc(NonNull::new(ptr), new_size) {
            Ok(Some(nn)) => nn.as_ptr(),
            _ => null_mut(),
        }
    }
}

/// Convert a nonnull and length to a nonnull slice.
#[cfg(feature = "allocator-api2")]
fn nonnull_slice_from_raw_parts(ptr: NonNull<u8>, len: usize) -> NonNull<[u8]> {
    unsafe { NonNull::new_unchecked(core::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len)) }
}

/// A well-aligned dangling pointer for zero-sized allocations.
#[cfg(feature = "allocator-api2")]
fn dangling_for(layout: Layout) -> NonNull<[u8]> {
    // SAFETY: alignments are nonzero
    let ptr = unsafe { NonNull::new_unchecked(layout.align() as *mut u8) };
    nonnull_slice_from_raw_parts(ptr, 0)
}

#[cfg(feature = "allocator-api2")]
unsafe impl<R: lock_api::RawMutex, S: AddressSpace> Allocator for Heapck<R, S> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling_for(layout));
        }

        self.lock()
            .alloc_layout(layout, false)
            .map(|nn| nonnull_slice_from_raw_parts(nn, layout.size()))
            .map_err(AllocError::from)
    }

    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling_for(layout));
        }

        self.lock()
            .alloc_layout(layout, true)
            .map(|nn| nonnull_slice_from_raw_parts(nn, layout.size()))
            .map_err(AllocError::from)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            self.lock().free(ptr);
        }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.size() >= old_layout.size());

        if old_layout.size() == 0 {
            return self.allocate(new_layout);
        }
        if new_layout.align() > GRANULE {
            return Err(AllocError);
        }

        match self.lock().realloc(Some(ptr), new_layout.size()) {
            Ok(Some(nn)) => Ok(nonnull_slice_from_raw_parts(nn, new_layout.size())),
            _ => Err(AllocError),
        }
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.size() <= old_layout.size());

        if new_layout.size() == 0 {
            self.deallocate(ptr, old_layout);
            return Ok(dangling_for(new_layout));
        }
        if new_layout.align() > GRANULE {
            return Err(AllocError);
        }

        match self.lock().realloc(Some(ptr), new_layout.size()) {
            Ok(Some(nn)) => Ok(nonnull_slice_from_raw_parts(nn, new_layout.size())),
            _ => Err(AllocError),
        }
    }
}
