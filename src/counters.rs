//! Track heap statistics.

use core::fmt;

/// Heap bookkeeping for a [`Heap`](crate::Heap).
///
/// `committed_bytes` and `live_blocks` are maintained by every operation and always
/// satisfy `committed_bytes + free bytes == capacity`. The rest are accumulative.
///
/// # Example
///
/// ```
/// # use ffheap::*;
/// # let arena = Box::leak(vec![0u8; 1 << 16].into_boxed_slice());
/// let mut heap = Heap::new(unsafe { SliceSpace::new(arena.into()) });
/// heap.init().unwrap();
/// let counters = heap.counters();
/// assert_eq!(counters.live_blocks, 0);
/// eprintln!("{}", counters);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Counters {
    /// Bytes held by headers of any kind plus allocated payloads.
    pub committed_bytes: usize,
    /// Number of allocated blocks.
    pub live_blocks: usize,
    /// Declared size of the heap region.
    pub capacity: usize,

    /// Number of blocks ever allocated. Relocations count as allocations.
    pub total_allocations: u64,
    /// Number of times the heap region was extended.
    pub growth_count: u64,
    /// Number of reallocations that had to move the payload.
    pub relocations: u64,
    /// Number of reallocations done without moving the payload.
    pub in_place_resizes: u64,
    /// Number of free-block merges.
    pub merges: u64,
}

impl Counters {
    #[inline]
    pub(crate) const fn new() -> Self {
        Self {
            committed_bytes: 0,
            live_blocks: 0,
            capacity: 0,
            total_allocations: 0,
            growth_count: 0,
            relocations: 0,
            in_place_resizes: 0,
            merges: 0,
        }
    }

    /// Returns the number of bytes in free blocks, excluding their headers.
    #[inline]
    pub const fn free_bytes(&self) -> usize {
        self.capacity - self.committed_bytes
    }

    #[inline]
    pub(crate) fn account_init(&mut self, capacity: usize, header: usize) {
        *self = Self::new();
        self.capacity = capacity;
        self.committed_bytes = header;
    }

    #[inline]
    pub(crate) fn account_growth(&mut self, additional: usize, header: usize) {
        self.capacity += additional;
        self.committed_bytes += header;
        self.growth_count += 1;
    }

    #[inline]
    pub(crate) fn account_alloc(&mut self, block_size: usize) {
        self.live_blocks += 1;
        self.committed_bytes += block_size;
        self.total_allocations += 1;
    }

    #[inline]
    pub(crate) fn account_free(&mut self, reclaimed: usize) {
        self.live_blocks -= 1;
        self.committed_bytes -= reclaimed;
    }

    #[inline]
    pub(crate) fn account_merges(&mut self, merges: usize, header: usize) {
        self.committed_bytes -= merges * header;
        self.merges += merges as u64;
    }

    #[inline]
    pub(crate) fn account_grow_in_place(&mut self, delta: usize) {
        self.committed_bytes += delta;
        self.in_place_resizes += 1;
    }

    #[inline]
    pub(crate) fn account_shrink_in_place(&mut self, released: usize) {
        self.committed_bytes -= released;
        self.in_place_resizes += 1;
    }

    #[inline]
    pub(crate) fn account_relocation(&mut self) {
        self.relocations += 1;
    }
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"Stat                 | Current Total       | Accumulative Total
---------------------|---------------------|--------------------
# of Live Blocks     | {:>19} | {:>19}
# of Committed Bytes | {:>19} |                 N/A
# of Free Bytes      | {:>19} |                 N/A
# of Capacity Bytes  | {:>19} |                 N/A
# of Growths         |                 N/A | {:>19}
# of Relocations     |                 N/A | {:>19}
# of In-place Resizes|                 N/A | {:>19}
# of Merges          |                 N/A | {:>19}"#,
            self.live_blocks,
            self.total_allocations,
            self.committed_bytes,
            self.free_bytes(),
            self.capacity,
            self.growth_count,
            self.relocations,
            self.in_place_resizes,
            self.merges,
        )
    }
}
