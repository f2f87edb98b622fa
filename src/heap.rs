//! The heap: one linear region of memory carved into blocks with first-fit allocation.

use core::{cmp::Ordering, fmt, ptr::NonNull};

use crate::{
    block::{
        align_granule, free_header, payload_size, used_header, FreeHeader, UsedHeader, GRANULE,
        HEADER_SIZE, NIL, TAG,
    },
    counters::Counters,
    freelist::{FreeList, Iter},
    space::AddressSpace,
    HeapError, Span,
};

/// Size of the first region a heap acquires.
pub const INITIAL_CAPACITY: usize = 4096;

// Heap layout: blocks tile the region with no gaps.
//
//   base                                                         base + capacity
//   ┌───────────────┬──────────────────┬───────────────┬───────────────────────┐
//   │ used: size|TAG│ free: size|next ─┼─> ...         │ free: size|NIL        │
//   └───────────────┴──────────────────┴───────────────┴───────────────────────┘
//
// Free blocks link to each other by offset in ascending address order.
// `committed` counts every header plus every allocated payload.

/// A first-fit heap over memory from an [`AddressSpace`].
///
/// Construct with [`Heap::new`], then [`init`](Heap::init) before anything else.
/// Call [`lock`](Heap::lock) to get a [`Heapck`](crate::Heapck) which supports the
/// [`GlobalAlloc`](core::alloc::GlobalAlloc) and `Allocator` traits.
///
/// # Example
/// ```
/// # use ffheap::*;
/// let arena = Box::leak(vec![0u8; 1 << 16].into_boxed_slice());
/// let mut heap = Heap::new(unsafe { SliceSpace::new(arena.into()) });
/// heap.init().unwrap();
///
/// let ptr = heap.malloc(35).unwrap();
/// unsafe {
///     ptr.as_ptr().write_bytes(0xab, 35);
///     let ptr = heap.realloc(Some(ptr), 100).unwrap().unwrap();
///     heap.free(ptr);
/// }
/// ```
pub struct Heap<S: AddressSpace> {
    /// The provider of the heap's memory.
    ///
    /// [`Heap`] just holds it and calls into it to acquire, extend, and release the region.
    pub space: S,

    base: *mut u8,
    initial_capacity: usize,

    free: FreeList,
    counters: Counters,
}

unsafe impl<S: AddressSpace + Send> Send for Heap<S> {}

impl<S: AddressSpace> fmt::Debug for Heap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("span", &format_args!("{}", self.span()))
            .field("free_list_head", &self.free.head())
            .field("counters", &self.counters)
            .field("space", &self.space)
            .finish()
    }
}

impl<S: AddressSpace> Heap<S> {
    /// Creates an uninitialised heap. No memory is acquired until [`Heap::init`].
    pub const fn new(space: S) -> Self {
        Self::with_initial_capacity(space, INITIAL_CAPACITY)
    }

    /// Like [`Heap::new`], but [`Heap::init`] acquires `capacity` bytes instead of
    /// [`INITIAL_CAPACITY`].
    ///
    /// # Panics
    /// Panics if `capacity` is not a multiple of [`GRANULE`] or is smaller than two headers.
    pub const fn with_initial_capacity(space: S, capacity: usize) -> Self {
        assert!(capacity % GRANULE == 0, "initial capacity must be a granule multiple");
        assert!(capacity >= 2 * HEADER_SIZE, "initial capacity is too small");

        Self {
            space,
            base: core::ptr::null_mut(),
            initial_capacity: capacity,
            free: FreeList::new(),
            counters: Counters::new(),
        }
    }

    /// Acquires the initial region and makes all of it one free block.
    ///
    /// On failure the heap stays uninitialised and every allocation fails
    /// with [`HeapError::Uninitialised`].
    pub fn init(&mut self) -> Result<(), HeapError> {
        if self.is_initialised() {
            return Err(HeapError::AlreadyInitialised);
        }

        let capacity = self.initial_capacity;
        let Some(base) = self.space.acquire(capacity) else {
            log::warn!("failed to acquire the initial {} byte heap region", capacity);
            return Err(HeapError::ProviderExhausted);
        };

        debug_assert!(base.as_ptr() as usize % GRANULE == 0);
        self.base = base.as_ptr();

        unsafe {
            free_header(self.base, 0).write(FreeHeader { size: capacity - HEADER_SIZE, next: NIL });
            self.free.reset(self.base, 0);
        }
        self.counters.account_init(capacity, HEADER_SIZE);

        log::debug!("heap initialised at {:p} with {} bytes", self.base, capacity);
        self.scan_for_errors();
        Ok(())
    }

    /// Returns whether [`Heap::init`] succeeded.
    #[inline]
    pub fn is_initialised(&self) -> bool {
        !self.base.is_null()
    }

    /// Returns the heap region, empty before initialisation.
    pub fn span(&self) -> Span {
        if self.is_initialised() {
            Span::from_base_size(self.base, self.counters.capacity)
        } else {
            Span::empty()
        }
    }

    /// Returns the heap statistics.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    #[inline]
    pub(crate) fn base(&self) -> *mut u8 {
        self.base
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.counters.capacity
    }

    /// Iterates the free list as `(offset, free_size)`.
    pub(crate) fn free_nodes(&self) -> Iter {
        // SAFETY: the list describes this heap; `&self` keeps it from changing
        unsafe { self.free.iter(self.base) }
    }

    #[inline]
    pub(crate) fn free_list_head(&self) -> Option<usize> {
        self.free.head()
    }

    /// Offset of the header belonging to the payload at `ptr`.
    #[inline]
    fn header_offset(&self, ptr: NonNull<u8>) -> usize {
        ptr.as_ptr() as usize - self.base as usize - HEADER_SIZE
    }

    #[inline]
    fn payload_ptr(&self, offset: usize) -> NonNull<u8> {
        // SAFETY: offsets of blocks are within the heap, which doesn't contain null
        unsafe { NonNull::new_unchecked(self.base.add(offset + HEADER_SIZE)) }
    }

    /// Doubles the heap region.
    ///
    /// The new memory becomes a free block at the old end of the heap, which merges
    /// into the last free block if that one reached the old end.
    fn expand(&mut self) -> Result<(), HeapError> {
        if !self.is_initialised() {
            return Err(HeapError::Uninitialised);
        }

        let old_capacity = self.counters.capacity;
        let additional = old_capacity;
        let new_capacity = old_capacity.checked_add(additional).ok_or(HeapError::ProviderExhausted)?;

        unsafe {
            let end = NonNull::new_unchecked(self.base.add(old_capacity));
            if self.space.extend(end, additional).is_err() {
                log::warn!("failed to extend the heap past {} bytes", old_capacity);
                return Err(HeapError::ProviderExhausted);
            }

            free_header(self.base, old_capacity)
                .write(FreeHeader { size: additional - HEADER_SIZE, next: NIL });
            self.counters.account_growth(additional, HEADER_SIZE);

            let merges = self.free.insert(self.base, old_capacity);
            self.counters.account_merges(merges, HEADER_SIZE);
        }

        log::debug!("heap grown from {} to {} bytes", old_capacity, new_capacity);
        Ok(())
    }

    /// Allocates at least `size` bytes, aligned to [`GRANULE`].
    ///
    /// The first free block large enough is split; if there is none, the heap is grown
    /// until one exists or the [`AddressSpace`] gives out.
    ///
    /// Zero-sized requests get a distinct [`GRANULE`]-sized payload.
    pub fn malloc(&mut self, size: usize) -> Result<NonNull<u8>, HeapError> {
        let rounded = payload_size(size).ok_or(HeapError::SizeOverflow)?;
        let total = rounded.checked_add(HEADER_SIZE).ok_or(HeapError::SizeOverflow)?;

        if !self.is_initialised() {
            return Err(HeapError::Uninitialised);
        }

        let cursor = loop {
            // SAFETY: the list describes this heap
            match unsafe { self.free.first_fit(self.base, total) } {
                Some(cursor) => break cursor,
                None => self.expand()?,
            }
        };

        unsafe {
            // the remainder keeps the node's place in the list
            self.free.advance(self.base, cursor, total);
            used_header(self.base, cursor.at).write(UsedHeader { size: rounded, tag: TAG });
        }
        self.counters.account_alloc(total);

        let ptr = self.payload_ptr(cursor.at);
        log::trace!("malloc({}) -> {:p}", size, ptr);
        self.scan_for_errors();
        Ok(ptr)
    }

    /// Allocates zeroed memory for `count` elements of `elem_size` bytes,
    /// each element rounded up to [`GRANULE`].
    ///
    /// Returns [`HeapError::SizeOverflow`] if the total doesn't fit in a `usize`.
    pub fn calloc(&mut self, count: usize, elem_size: usize) -> Result<NonNull<u8>, HeapError> {
        let elem_size = align_granule(elem_size).ok_or(HeapError::SizeOverflow)?;
        let size = count.checked_mul(elem_size).ok_or(HeapError::SizeOverflow)?;

        let ptr = self.malloc(size)?;
        // SAFETY: the payload is at least `size` bytes
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        Ok(ptr)
    }

    /// Free previously allocated/reallocated memory.
    ///
    /// The block becomes free and merges with any free neighbours.
    ///
    /// # Safety
    /// `ptr` must have been returned by this heap's [`malloc`](Heap::malloc),
    /// [`calloc`](Heap::calloc) or [`realloc`](Heap::realloc) and not freed since.
    /// Nothing is validated; use [`Checked`](crate::Checked) for that.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
        let at = self.header_offset(ptr);
        let used = used_header(self.base, at).read();
        debug_assert_eq!(used.tag, TAG);

        // both header kinds are the same length, so the whole payload becomes free space
        let reclaimed = used.size;
        free_header(self.base, at).write(FreeHeader { size: reclaimed, next: NIL });
        self.counters.account_free(reclaimed);

        let merges = self.free.insert(self.base, at);
        self.counters.account_merges(merges, HEADER_SIZE);

        log::trace!("free({:p}) released {} bytes", ptr, reclaimed);
        self.scan_for_errors();
    }

    /// Resize previously allocated/reallocated memory to at least `size` bytes.
    ///
    /// - `ptr == None` behaves like [`malloc`](Heap::malloc).
    /// - `size == 0` behaves like [`free`](Heap::free) and returns `Ok(None)`.
    /// - Shrinking always happens in place.
    /// - Growing happens in place if the block is followed by a large enough free block,
    ///   otherwise the payload is moved to a new allocation and `ptr` becomes invalid.
    ///
    /// On failure, `ptr` remains valid and untouched.
    ///
    /// # Safety
    /// `ptr` must satisfy the requirements of [`free`](Heap::free).
    pub unsafe fn realloc(
        &mut self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<Option<NonNull<u8>>, HeapError> {
        let Some(ptr) = ptr else {
            return self.malloc(size).map(Some);
        };

        if size == 0 {
            self.free(ptr);
            return Ok(None);
        }

        let new_size = align_granule(size).ok_or(HeapError::SizeOverflow)?;
        let at = self.header_offset(ptr);
        let old_size = (*used_header(self.base, at)).size;

        match new_size.cmp(&old_size) {
            Ordering::Equal => Ok(Some(ptr)),
            Ordering::Greater => {
                if self.grow_in_place(at, old_size, new_size - old_size) {
                    log::trace!("realloc({:p}, {}) grew in place", ptr, size);
                    self.scan_for_errors();
                    return Ok(Some(ptr));
                }

                let moved = self.malloc(new_size)?;
                moved.as_ptr().copy_from_nonoverlapping(ptr.as_ptr(), old_size);
                self.free(ptr);
                self.counters.account_relocation();

                log::trace!("realloc({:p}, {}) moved to {:p}", ptr, size, moved);
                Ok(Some(moved))
            }
            Ordering::Less => {
                self.shrink_in_place(at, old_size, new_size);
                log::trace!("realloc({:p}, {}) shrank in place", ptr, size);
                self.scan_for_errors();
                Ok(Some(ptr))
            }
        }
    }

    /// Grows the block at `at` by `delta` bytes from the free block directly above it.
    ///
    /// Returns `false`, changing nothing, if there is no such free block or it's too small.
    unsafe fn grow_in_place(&mut self, at: usize, old_size: usize, delta: usize) -> bool {
        let old_end = at + HEADER_SIZE + old_size;

        let Some(above) = self.free.find(self.base, old_end) else {
            return false;
        };
        if (*free_header(self.base, above.at)).size < delta {
            return false;
        }

        self.free.advance(self.base, above, delta);
        (*used_header(self.base, at)).size = old_size + delta;
        self.counters.account_grow_in_place(delta);
        true
    }

    /// Cuts the block at `at` down to `new_size`, freeing the tail.
    unsafe fn shrink_in_place(&mut self, at: usize, old_size: usize, new_size: usize) {
        // granule multiples, so the tail fits at least a header
        let delta = old_size - new_size;
        debug_assert!(delta >= HEADER_SIZE);

        (*used_header(self.base, at)).size = new_size;

        let tail = at + HEADER_SIZE + new_size;
        free_header(self.base, tail).write(FreeHeader { size: delta - HEADER_SIZE, next: NIL });
        // the payload loses `delta` bytes, the new free block gains a header
        self.counters.account_shrink_in_place(delta - HEADER_SIZE);

        let merges = self.free.insert(self.base, tail);
        self.counters.account_merges(merges, HEADER_SIZE);
    }

    /// Debugging function for checking the heap's invariants after every operation.
    #[inline]
    fn scan_for_errors(&self) {
        #[cfg(any(test, feature = "error-scanning"))]
        if let Err(err) = self.check() {
            panic!("{}", err);
        }
    }
}

impl<S: AddressSpace> Drop for Heap<S> {
    fn drop(&mut self) {
        if let Some(base) = NonNull::new(self.base) {
            let capacity = self.counters.capacity;
            self.base = core::ptr::null_mut();
            self.free.clear();

            // SAFETY: the heap is going away, nothing can use the region anymore
            unsafe { self.space.release(base, capacity) };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;
    use crate::{
        space::NoSpace,
        test_utils::{free_sizes, heap_over},
    };

    fn fill(ptr: NonNull<u8>, len: usize, seed: u8) {
        for i in 0..len {
            unsafe { ptr.as_ptr().add(i).write(seed.wrapping_add(i as u8)) };
        }
    }

    fn verify(ptr: NonNull<u8>, len: usize, seed: u8) -> bool {
        (0..len).all(|i| unsafe { ptr.as_ptr().add(i).read() } == seed.wrapping_add(i as u8))
    }

    #[test]
    fn init_makes_one_free_block() {
        let heap = heap_over(1 << 16);

        assert_eq!(free_sizes(&heap), [INITIAL_CAPACITY - HEADER_SIZE]);
        assert_eq!(heap.span().size(), INITIAL_CAPACITY);
        assert_eq!(heap.span().base() as usize % GRANULE, 0);
        assert_eq!(heap.counters().committed_bytes, HEADER_SIZE);
    }

    #[test]
    fn init_twice_is_refused() {
        let mut heap = heap_over(1 << 16);
        let span = heap.span();

        assert_eq!(heap.init(), Err(HeapError::AlreadyInitialised));
        assert_eq!(heap.span(), span);
    }

    #[test]
    fn provider_failure_is_reported() {
        let mut heap = Heap::new(NoSpace);

        assert_eq!(heap.init(), Err(HeapError::ProviderExhausted));
        assert!(!heap.is_initialised());
        assert_eq!(heap.malloc(16), Err(HeapError::Uninitialised));
        assert!(heap.span().is_empty());
    }

    #[test]
    fn malloc_splits_lowest_block() {
        let mut heap = heap_over(1 << 16);
        let base = heap.span().base();

        let a = heap.malloc(35).unwrap();
        let b = heap.malloc(1).unwrap();

        assert_eq!(a.as_ptr(), base.wrapping_add(HEADER_SIZE));
        assert_eq!(b.as_ptr(), base.wrapping_add(HEADER_SIZE + 48 + HEADER_SIZE));
        assert_eq!(a.as_ptr() as usize % GRANULE, 0);
        assert_eq!(free_sizes(&heap), [INITIAL_CAPACITY - HEADER_SIZE - (16 + 48) - (16 + 16)]);
        assert_eq!(heap.counters().live_blocks, 2);
    }

    #[test]
    fn zero_sized_allocations_are_distinct() {
        let mut heap = heap_over(1 << 16);

        let a = heap.malloc(0).unwrap();
        let b = heap.malloc(0).unwrap();
        let c = heap.calloc(0, 8).unwrap();

        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, HEADER_SIZE + GRANULE);
        assert_eq!(c.as_ptr() as usize - b.as_ptr() as usize, HEADER_SIZE + GRANULE);

        // the payloads are usable without clobbering neighbours
        unsafe {
            a.as_ptr().write_bytes(0xff, GRANULE);
            b.as_ptr().write_bytes(0xee, GRANULE);
        }
        heap.check().unwrap();
    }

    #[test]
    fn large_malloc_grows_the_heap() {
        let mut heap = heap_over(1 << 16);

        let ptr = heap.malloc(10000).unwrap();
        fill(ptr, 10000, 3);

        assert!(heap.counters().growth_count >= 1);
        assert_eq!(heap.span().size(), INITIAL_CAPACITY * 4);
        assert!(verify(ptr, 10000, 3));
        assert_eq!(free_sizes(&heap).len(), 1);
    }

    #[test]
    fn growth_merges_into_the_last_free_block() {
        let mut heap = heap_over(1 << 16);

        // exactly fills the initial block, leaving an empty free block at the end
        let whole = heap.malloc(INITIAL_CAPACITY - 2 * HEADER_SIZE).unwrap();
        assert_eq!(free_sizes(&heap), [0]);

        let next = heap.malloc(64).unwrap();
        assert_eq!(heap.span().size(), INITIAL_CAPACITY * 2);
        assert_eq!(next.as_ptr() as usize - whole.as_ptr() as usize, INITIAL_CAPACITY - HEADER_SIZE);
        assert_eq!(free_sizes(&heap), [INITIAL_CAPACITY - 80]);
        heap.check().unwrap();
    }

    #[test]
    fn growth_failure_is_reported() {
        let mut heap = heap_over(INITIAL_CAPACITY * 2);

        let a = heap.malloc(INITIAL_CAPACITY).unwrap();
        assert_eq!(heap.malloc(INITIAL_CAPACITY * 2), Err(HeapError::ProviderExhausted));

        // still usable
        unsafe { heap.free(a) };
        assert!(heap.malloc(INITIAL_CAPACITY).is_ok());
    }

    #[test]
    fn free_restores_the_initial_block() {
        let mut heap = heap_over(1 << 16);
        let before = free_sizes(&heap);

        let ptr = heap.malloc(35).unwrap();
        unsafe { heap.free(ptr) };

        assert_eq!(free_sizes(&heap), before);
        assert_eq!(heap.counters().committed_bytes, HEADER_SIZE);
        assert_eq!(heap.counters().live_blocks, 0);
    }

    #[test]
    fn freed_block_is_reused_first() {
        let mut heap = heap_over(1 << 16);

        let a = heap.malloc(64).unwrap();
        let _b = heap.malloc(64).unwrap();
        unsafe { heap.free(a) };

        let c = heap.malloc(40).unwrap();
        assert_eq!(c, a);
        assert_eq!(heap.counters().growth_count, 0);
    }

    #[test]
    fn freeing_neighbours_in_either_order_coalesces() {
        for flip in [false, true] {
            let mut heap = heap_over(1 << 16);

            let a = heap.malloc(32).unwrap();
            let b = heap.malloc(32).unwrap();
            let _guard = heap.malloc(32).unwrap();

            unsafe {
                if flip {
                    heap.free(b);
                    heap.free(a);
                } else {
                    heap.free(a);
                    heap.free(b);
                }
            }

            let sizes = free_sizes(&heap);
            assert_eq!(sizes.len(), 2);
            assert_eq!(sizes[0], 32 + HEADER_SIZE + 32);
        }
    }

    #[test]
    fn calloc_zeroes_reused_memory() {
        let mut heap = heap_over(1 << 16);

        let dirty = heap.malloc(400).unwrap();
        unsafe {
            dirty.as_ptr().write_bytes(0xcd, 400);
            heap.free(dirty);
        }

        let clean = heap.calloc(100, 4).unwrap();
        assert_eq!(clean, dirty);

        // each 4 byte element is padded to a granule
        let bytes = unsafe { core::slice::from_raw_parts(clean.as_ptr(), 100 * GRANULE) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn calloc_overflow_fails() {
        let mut heap = heap_over(1 << 16);

        assert_eq!(heap.calloc(usize::MAX / 8, 16), Err(HeapError::SizeOverflow));
        assert_eq!(heap.calloc(2, usize::MAX), Err(HeapError::SizeOverflow));
        assert_eq!(heap.malloc(usize::MAX), Err(HeapError::SizeOverflow));
        assert_eq!(heap.counters().live_blocks, 0);
    }

    #[test]
    fn realloc_grows_in_place_into_free_space() {
        let mut heap = heap_over(1 << 16);

        let a = heap.malloc(32).unwrap();
        fill(a, 32, 7);

        let grown = unsafe { heap.realloc(Some(a), 100).unwrap().unwrap() };
        assert_eq!(grown, a);
        assert!(verify(grown, 32, 7));
        assert_eq!(heap.counters().in_place_resizes, 1);
        assert_eq!(heap.counters().relocations, 0);
        assert_eq!(free_sizes(&heap), [INITIAL_CAPACITY - HEADER_SIZE - HEADER_SIZE - 112]);
    }

    #[test]
    fn realloc_grows_the_head_node_in_place() {
        let mut heap = heap_over(1 << 16);

        let a = heap.malloc(32).unwrap();
        let b = heap.malloc(32).unwrap();
        let _c = heap.malloc(32).unwrap();
        unsafe { heap.free(b) };

        // the free block right after `a` is the head of the free list
        let grown = unsafe { heap.realloc(Some(a), 48).unwrap().unwrap() };
        assert_eq!(grown, a);
        assert_eq!(free_sizes(&heap)[0], 32 - GRANULE);
    }

    #[test]
    fn realloc_relocates_when_blocked() {
        let mut heap = heap_over(1 << 16);

        let a = heap.malloc(48).unwrap();
        fill(a, 48, 11);
        let _b = heap.malloc(16).unwrap();

        let moved = unsafe { heap.realloc(Some(a), 200).unwrap().unwrap() };
        assert_ne!(moved, a);
        assert!(verify(moved, 48, 11));
        assert_eq!(heap.counters().relocations, 1);
        assert_eq!(heap.counters().live_blocks, 2);
    }

    #[test]
    fn realloc_relocates_when_free_neighbour_is_too_small() {
        let mut heap = heap_over(1 << 16);

        let a = heap.malloc(32).unwrap();
        let b = heap.malloc(16).unwrap();
        let _c = heap.malloc(16).unwrap();
        unsafe { heap.free(b) };
        fill(a, 32, 1);

        let moved = unsafe { heap.realloc(Some(a), 128).unwrap().unwrap() };
        assert_ne!(moved, a);
        assert!(verify(moved, 32, 1));
    }

    #[test]
    fn realloc_relocation_can_grow_the_heap() {
        let mut heap = heap_over(1 << 16);

        let a = heap.malloc(64).unwrap();
        fill(a, 64, 9);
        let _b = heap.malloc(64).unwrap();

        let moved = unsafe { heap.realloc(Some(a), INITIAL_CAPACITY * 2).unwrap().unwrap() };
        assert!(heap.counters().growth_count >= 1);
        assert!(verify(moved, 64, 9));
    }

    #[test]
    fn realloc_shrinks_in_place() {
        let mut heap = heap_over(1 << 16);

        let a = heap.malloc(256).unwrap();
        let _b = heap.malloc(16).unwrap();
        fill(a, 256, 5);

        let shrunk = unsafe { heap.realloc(Some(a), 64).unwrap().unwrap() };
        assert_eq!(shrunk, a);
        assert!(verify(shrunk, 64, 5));

        let sizes = free_sizes(&heap);
        assert_eq!(sizes[0], 256 - 64 - HEADER_SIZE);
        assert_eq!(sizes.len(), 2);
    }

    #[test]
    fn realloc_shrink_merges_with_following_free_space() {
        let mut heap = heap_over(1 << 16);

        let a = heap.malloc(256).unwrap();
        let before = heap.counters().committed_bytes;

        let shrunk = unsafe { heap.realloc(Some(a), 100).unwrap().unwrap() };
        assert_eq!(shrunk, a);
        assert_eq!(free_sizes(&heap).len(), 1);
        assert_eq!(heap.counters().committed_bytes, before - (256 - 112));
    }

    #[test]
    fn realloc_edge_cases() {
        let mut heap = heap_over(1 << 16);

        let fresh = unsafe { heap.realloc(None, 24).unwrap().unwrap() };
        assert_eq!(heap.counters().live_blocks, 1);

        let same = unsafe { heap.realloc(Some(fresh), 17).unwrap().unwrap() };
        assert_eq!(same, fresh);
        assert_eq!(heap.counters().in_place_resizes, 0);

        assert_eq!(unsafe { heap.realloc(Some(fresh), 0) }, Ok(None));
        assert_eq!(heap.counters().live_blocks, 0);
        assert_eq!(free_sizes(&heap), [INITIAL_CAPACITY - HEADER_SIZE]);
    }

    #[test]
    fn random_actions_keep_invariants() {
        let rng = fastrand::Rng::with_seed(0x5eed);
        let mut heap = heap_over(1 << 24);
        let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

        for step in 0..2000 {
            match rng.u8(0..4) {
                0 | 1 => {
                    let size = rng.usize(0..2048);
                    let seed = step as u8;
                    if let Ok(ptr) = heap.malloc(size) {
                        fill(ptr, size, seed);
                        live.push((ptr, size, seed));
                    }
                }
                2 if !live.is_empty() => {
                    let (ptr, size, seed) = live.swap_remove(rng.usize(0..live.len()));
                    assert!(verify(ptr, size, seed));
                    unsafe { heap.free(ptr) };
                }
                3 if !live.is_empty() => {
                    let index = rng.usize(0..live.len());
                    let (ptr, size, seed) = live[index];
                    let new_size = rng.usize(1..4096);

                    match unsafe { heap.realloc(Some(ptr), new_size) } {
                        Ok(Some(moved)) => {
                            assert!(verify(moved, size.min(new_size), seed));
                            fill(moved, new_size, seed);
                            live[index] = (moved, new_size, seed);
                        }
                        Ok(None) => unreachable!(),
                        Err(err) => {
                            assert_eq!(err, HeapError::ProviderExhausted);
                            assert!(verify(ptr, size, seed));
                        }
                    }
                }
                _ => {}
            }

            heap.check().unwrap();
            assert_eq!(heap.counters().live_blocks, live.len());
        }

        for (ptr, size, seed) in live.drain(..) {
            assert!(verify(ptr, size, seed));
            unsafe { heap.free(ptr) };
        }

        assert_eq!(free_sizes(&heap).len(), 1);
        assert_eq!(heap.counters().committed_bytes, HEADER_SIZE);
    }
}
