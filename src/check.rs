//! Validation of a heap's structure, and a wrapper that validates pointers before use.

use core::{ops::ControlFlow, ptr::NonNull};

use crate::{
    block::{free_header, used_header, GRANULE, HEADER_SIZE, NIL, TAG},
    space::AddressSpace,
    Corruption, Heap, HeapError,
};

/// A block found while walking the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    offset: usize,
    size: usize,
    free: bool,
}

impl<S: AddressSpace> Heap<S> {
    /// Visits every block in address order, validating the tiling as it goes.
    ///
    /// Free blocks are told apart from allocated ones by following the free list
    /// alongside the walk, so stray or unordered nodes are caught too.
    fn walk(&self, mut visit: impl FnMut(Block) -> ControlFlow<()>) -> Result<(), Corruption> {
        let base = self.base();
        let capacity = self.capacity();

        let mut offset = 0;
        let mut node = self.free_list_head();
        let mut prev_free = false;

        while offset < capacity {
            if capacity - offset < HEADER_SIZE {
                return Err(Corruption::Overrun { offset });
            }

            let block = match node {
                Some(at) if at == offset => {
                    // SAFETY: `offset` is a block boundary within the heap
                    let header = unsafe { free_header(base, offset).read() };
                    if prev_free {
                        return Err(Corruption::AdjacentFree { offset });
                    }
                    if header.next != NIL && header.next <= offset {
                        return Err(Corruption::Unordered { offset });
                    }

                    node = (header.next != NIL).then_some(header.next);
                    Block { offset, size: header.size, free: true }
                }
                Some(at) if at < offset => return Err(Corruption::StrayNode { offset: at }),
                _ => {
                    // SAFETY: as above
                    let header = unsafe { used_header(base, offset).read() };
                    if header.tag != TAG {
                        return Err(Corruption::BadTag { offset });
                    }

                    Block { offset, size: header.size, free: false }
                }
            };

            if block.size % GRANULE != 0 {
                return Err(Corruption::MisalignedSize { offset });
            }
            if block.size > capacity - offset - HEADER_SIZE {
                return Err(Corruption::Overrun { offset });
            }

            if visit(block).is_break() {
                return Ok(());
            }

            prev_free = block.free;
            offset += HEADER_SIZE + block.size;
        }

        match node {
            Some(at) => Err(Corruption::StrayNode { offset: at }),
            None => Ok(()),
        }
    }

    /// Scans the whole heap and verifies its invariants:
    /// - allocated headers carry [`TAG`](crate::TAG)
    /// - block sizes are [`GRANULE`] multiples
    /// - blocks tile the region exactly
    /// - free-list nodes sit on block boundaries in ascending order
    /// - no two free blocks are adjacent
    /// - the counters agree with what was found
    ///
    /// An uninitialised heap is trivially valid.
    pub fn check(&self) -> Result<(), HeapError> {
        if !self.is_initialised() {
            return Ok(());
        }

        let mut committed = 0;
        let mut live = 0;
        let mut free = 0;

        self.walk(|block| {
            committed += HEADER_SIZE;
            if block.free {
                free += block.size;
            } else {
                committed += block.size;
                live += 1;
            }
            ControlFlow::Continue(())
        })?;

        let counters = self.counters();
        if counters.committed_bytes != committed {
            return Err(Corruption::CommittedMismatch {
                counted: counters.committed_bytes,
                scanned: committed,
            }
            .into());
        }
        if counters.live_blocks != live {
            return Err(Corruption::LiveBlockMismatch { counted: counters.live_blocks, scanned: live }
                .into());
        }

        debug_assert_eq!(committed + free, self.capacity());
        Ok(())
    }

    /// Returns whether `ptr` is the payload of a live block of this heap.
    ///
    /// Walks the heap, so this is linear in the number of blocks.
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        let base = self.base() as usize;

        if !self.is_initialised()
            || addr < base + HEADER_SIZE
            || addr >= base + self.capacity()
            || addr % GRANULE != 0
        {
            return false;
        }

        let target = addr - base - HEADER_SIZE;
        let mut found = false;

        let walked = self.walk(|block| {
            if block.offset < target {
                return ControlFlow::Continue(());
            }

            found = block.offset == target && !block.free;
            ControlFlow::Break(())
        });

        walked.is_ok() && found
    }
}

/// A [`Heap`] that refuses pointers it didn't hand out.
///
/// [`free`](Checked::free) and [`realloc`](Checked::realloc) validate their pointer
/// with [`Heap::owns`] first, making them safe to call with anything, at the cost of
/// walking the heap every time.
///
/// # Example
/// ```
/// # use ffheap::*;
/// # let arena = Box::leak(vec![0u8; 1 << 16].into_boxed_slice());
/// let mut heap = Checked::new(Heap::new(unsafe { SliceSpace::new(arena.into()) }));
/// heap.init().unwrap();
///
/// let ptr = heap.malloc(10).unwrap();
/// assert_eq!(heap.free(ptr), Ok(()));
/// assert_eq!(heap.free(ptr), Err(HeapError::InvalidPointer));
/// ```
#[derive(Debug)]
pub struct Checked<S: AddressSpace>(Heap<S>);

impl<S: AddressSpace> Checked<S> {
    pub const fn new(heap: Heap<S>) -> Self {
        Self(heap)
    }

    /// Retrieve the inner `Heap`.
    pub fn into_inner(self) -> Heap<S> {
        self.0
    }

    pub fn heap(&self) -> &Heap<S> {
        &self.0
    }

    pub fn init(&mut self) -> Result<(), HeapError> {
        self.0.init()
    }

    pub fn malloc(&mut self, size: usize) -> Result<NonNull<u8>, HeapError> {
        self.0.malloc(size)
    }

    pub fn calloc(&mut self, count: usize, elem_size: usize) -> Result<NonNull<u8>, HeapError> {
        self.0.calloc(count, elem_size)
    }

    /// Like [`Heap::free`], but fails with [`HeapError::InvalidPointer`] instead of
    /// corrupting the heap on a double free or foreign pointer.
    pub fn free(&mut self, ptr: NonNull<u8>) -> Result<(), HeapError> {
        if !self.0.owns(ptr) {
            log::warn!("refused to free {:p}", ptr);
            return Err(HeapError::InvalidPointer);
        }

        // SAFETY: just validated as a live block
        unsafe { self.0.free(ptr) };
        Ok(())
    }

    /// Like [`Heap::realloc`], validating `ptr` the same way as [`Checked::free`].
    pub fn realloc(
        &mut self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<Option<NonNull<u8>>, HeapError> {
        if let Some(ptr) = ptr {
            if !self.0.owns(ptr) {
                log::warn!("refused to realloc {:p}", ptr);
                return Err(HeapError::InvalidPointer);
            }
        }

        // SAFETY: validated above, or `None`
        unsafe { self.0.realloc(ptr, size) }
    }

    pub fn check(&self) -> Result<(), HeapError> {
        self.0.check()
    }
}
