//! Block headers.
//!
//! Every block, free or allocated, starts with a 16-byte header. The two header
//! kinds are views over the same bytes: freeing a block rewrites its header in place.
//!
//! ```not_rust
//!      allocated block                  free block
//!   ┌────────┬───────┬─────────┐     ┌────────┬────────┬──────────┐
//!   │ size   │ TAG   │ payload │     │ size   │ next   │ free ... │
//!   └────────┴───────┴─────────┘     └────────┴────────┴──────────┘
//!   ^ offset ^       ^ pointer       ^ offset ^
//! ```
//!
//! Links between free blocks are offsets from the heap base rather than addresses.

use core::mem::size_of;

/// Allocation granule. Payload sizes are multiples of this and payloads are aligned to it.
pub const GRANULE: usize = 16;

/// Length of both header kinds.
pub const HEADER_SIZE: usize = size_of::<UsedHeader>();

/// Sentinel stamped into allocated headers.
pub const TAG: usize = 1234567;

/// Link value terminating the free list.
pub(crate) const NIL: usize = usize::MAX;

/// Header of an allocated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(16))]
pub(crate) struct UsedHeader {
    /// Payload bytes following the header, a multiple of [`GRANULE`].
    pub size: usize,
    /// Always [`TAG`] while the block is live. Advisory only.
    pub tag: usize,
}

/// Header of a free block, doubling as a free-list node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(16))]
pub(crate) struct FreeHeader {
    /// Free bytes following the header.
    pub size: usize,
    /// Offset of the next free block, or [`NIL`].
    pub next: usize,
}

const _: () = assert!(size_of::<UsedHeader>() == size_of::<FreeHeader>());
const _: () = assert!(HEADER_SIZE == GRANULE);

/// Rounds `size` up to the next multiple of [`GRANULE`], or `None` on overflow.
#[inline]
pub const fn align_granule(size: usize) -> Option<usize> {
    match size.checked_add(GRANULE - 1) {
        Some(padded) => Some(padded & !(GRANULE - 1)),
        None => None,
    }
}

/// Payload size reserved for a request of `size` bytes.
///
/// Zero-byte requests still receive one granule so that every allocation is distinct.
#[inline]
pub const fn payload_size(size: usize) -> Option<usize> {
    if size == 0 {
        Some(GRANULE)
    } else {
        align_granule(size)
    }
}

/// Views the bytes at `base + offset` as a free header.
///
/// # Safety
/// `base + offset` must lie in the heap with at least [`HEADER_SIZE`] bytes after it
/// and be aligned to [`GRANULE`].
#[inline]
pub(crate) unsafe fn free_header(base: *mut u8, offset: usize) -> *mut FreeHeader {
    debug_assert!(offset % GRANULE == 0);
    base.add(offset).cast()
}

/// Views the bytes at `base + offset` as an allocated header.
///
/// # Safety
/// See [`free_header`].
#[inline]
pub(crate) unsafe fn used_header(base: *mut u8, offset: usize) -> *mut UsedHeader {
    debug_assert!(offset % GRANULE == 0);
    base.add(offset).cast()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_granule_test() {
        assert_eq!(align_granule(0), Some(0));
        assert_eq!(align_granule(1), Some(16));
        assert_eq!(align_granule(16), Some(16));
        assert_eq!(align_granule(17), Some(32));
        assert_eq!(align_granule(35), Some(48));
        assert_eq!(align_granule(10000), Some(10000));
        assert_eq!(align_granule(usize::MAX - 14), None);
        assert_eq!(align_granule(usize::MAX - 15), Some(usize::MAX - 15));
    }

    #[test]
    fn payload_size_test() {
        assert_eq!(payload_size(0), Some(GRANULE));
        assert_eq!(payload_size(1), Some(GRANULE));
        assert_eq!(payload_size(33), Some(48));
        assert_eq!(payload_size(usize::MAX), None);
    }

    #[test]
    fn headers_share_layout() {
        assert_eq!(HEADER_SIZE, 16);
        assert_eq!(core::mem::align_of::<FreeHeader>(), GRANULE);
        assert_eq!(core::mem::align_of::<UsedHeader>(), GRANULE);
    }
}
