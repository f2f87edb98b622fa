//! A snapshot view over a heap for reporting.

use core::fmt;

use crate::{freelist::Iter, space::AddressSpace, Heap};

/// Borrowed view of a [`Heap`]'s state, created by [`Heap::info`].
///
/// The [`Display`](fmt::Display) implementation prints the heap's report:
/// ```text
/// heap base:        0x7f3a1c000000
/// capacity:         8192
/// committed bytes:  4128
/// free list head:   0x7f3a1c001020
/// live blocks:      1
/// free block:       4048
/// ```
pub struct Info<'h, S: AddressSpace> {
    heap: &'h Heap<S>,
}

impl<S: AddressSpace> Heap<S> {
    /// Returns a view of the heap's state for reporting.
    pub fn info(&self) -> Info<'_, S> {
        Info { heap: self }
    }
}

impl<'h, S: AddressSpace> Info<'h, S> {
    /// Start of the heap region, null if uninitialised.
    pub fn base(&self) -> *mut u8 {
        self.heap.base()
    }

    pub fn capacity(&self) -> usize {
        self.heap.capacity()
    }

    pub fn committed_bytes(&self) -> usize {
        self.heap.counters().committed_bytes
    }

    /// Address of the lowest free block's header.
    pub fn free_list_head(&self) -> Option<*mut u8> {
        self.heap.free_list_head().map(|at| self.heap.base().wrapping_add(at))
    }

    pub fn live_blocks(&self) -> usize {
        self.heap.counters().live_blocks
    }

    /// Free sizes of the free-list nodes, lowest address first.
    pub fn free_blocks(&self) -> FreeBlocks<'h> {
        FreeBlocks { iter: self.heap.free_nodes(), _heap: core::marker::PhantomData }
    }
}

impl<S: AddressSpace> fmt::Display for Info<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "heap base:        {:p}", self.base())?;
        writeln!(f, "capacity:         {}", self.capacity())?;
        writeln!(f, "committed bytes:  {}", self.committed_bytes())?;
        match self.free_list_head() {
            Some(head) => writeln!(f, "free list head:   {:p}", head)?,
            None => writeln!(f, "free list head:   none")?,
        }
        writeln!(f, "live blocks:      {}", self.live_blocks())?;

        for size in self.free_blocks() {
            writeln!(f, "free block:       {}", size)?;
        }

        Ok(())
    }
}

/// Iterator over free-list node sizes, created by [`Info::free_blocks`].
#[derive(Debug, Clone)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct FreeBlocks<'h> {
    iter: Iter,
    _heap: core::marker::PhantomData<&'h ()>,
}

impl Iterator for FreeBlocks<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(_, size)| size)
    }
}

#[cfg(test)]
mod tests {
    use std::{format, string::String};

    use crate::{test_utils::heap_over, Heap, NoSpace, HEADER_SIZE, INITIAL_CAPACITY};

    #[test]
    fn report_lists_every_free_block() {
        let mut heap = heap_over(1 << 16);

        let a = heap.malloc(100).unwrap();
        let _b = heap.malloc(100).unwrap();
        unsafe { heap.free(a) };

        let info = heap.info();
        assert_eq!(info.base(), heap.span().base());
        assert_eq!(info.capacity(), INITIAL_CAPACITY);
        assert_eq!(info.live_blocks(), 1);
        assert_eq!(info.committed_bytes(), HEADER_SIZE * 3 + 112);
        assert_eq!(info.free_list_head(), Some(heap.span().base()));

        let sizes: std::vec::Vec<usize> = info.free_blocks().collect();
        assert_eq!(sizes, [112, INITIAL_CAPACITY - 2 * (HEADER_SIZE + 112) - HEADER_SIZE]);

        let report: String = format!("{}", info);
        assert_eq!(report.lines().count(), 5 + sizes.len());
        assert!(report.contains("live blocks:      1"));
        assert!(report.contains("free block:       112"));
    }

    #[test]
    fn report_of_uninitialised_heap() {
        let heap = Heap::new(NoSpace);
        let info = heap.info();

        assert!(info.base().is_null());
        assert_eq!(info.free_list_head(), None);
        assert_eq!(info.free_blocks().count(), 0);
        assert!(format!("{}", info).contains("free list head:   none"));
    }
}
