use std::{boxed::Box, vec::Vec};

use crate::{Heap, SliceSpace, Span, GRANULE};

#[repr(C, align(16))]
#[derive(Clone, Copy)]
struct Granule([u8; GRANULE]);

/// Leaks a zeroed, granule-aligned buffer of `size` bytes, rounded up to the granule.
pub fn leak_span(size: usize) -> Span {
    let count = (size + GRANULE - 1) / GRANULE;
    let buffer: &'static mut [Granule] = Box::leak(vec![Granule([0; GRANULE]); count].into_boxed_slice());
    Span::from_base_size(buffer.as_mut_ptr().cast(), count * GRANULE)
}

/// An initialised heap drawing from a leaked buffer of `size` bytes.
pub fn heap_over(size: usize) -> Heap<SliceSpace> {
    let mut heap = Heap::new(unsafe { SliceSpace::new(leak_span(size)) });
    heap.init().unwrap();
    heap
}

/// Free-list node sizes in address order.
pub fn free_sizes(heap: &Heap<SliceSpace>) -> Vec<usize> {
    heap.info().free_blocks().collect()
}
