//! The address-ordered free list.
//!
//! The list is:
//!  * **Intrusive**: each node is the [`FreeHeader`] at the start of the free run it describes
//!  * **Singly linked** through heap-relative offsets, terminated by [`NIL`]
//!  * **Address ordered**: offsets strictly ascend from the head
//!  * **Fully coalesced**: no node ends where the next begins once [`FreeList::insert`] returns
//!
//! ### Safety:
//! Every function here takes the heap base and trusts the offsets stored in the list.
//! Callers must pass the base of the heap that owns the list, and the list must
//! describe that heap.
//!
//! This data structure is not thread-safe, use mutexes/locks to mutually exclude data access.

use crate::block::{free_header, FreeHeader, HEADER_SIZE, NIL};

/// A position in the list: a node and the node linking to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    /// Offset of the predecessor, or [`NIL`] if `at` is the head.
    pub prev: usize,
    /// Offset of the node.
    pub at: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeList {
    head: usize,
}

impl FreeList {
    pub const fn new() -> Self {
        Self { head: NIL }
    }

    /// Offset of the lowest free block.
    pub fn head(&self) -> Option<usize> {
        (self.head != NIL).then_some(self.head)
    }

    /// Drops every node. The memory is not touched.
    pub fn clear(&mut self) {
        self.head = NIL;
    }

    /// Makes the free block at `at` the only node.
    ///
    /// ### Safety:
    /// `at` must be a writable free header in the heap at `base`.
    pub unsafe fn reset(&mut self, base: *mut u8, at: usize) {
        (*free_header(base, at)).next = NIL;
        self.head = at;
    }

    /// Iterates over `(offset, free_size)` pairs in address order.
    ///
    /// ### Safety:
    /// The list must remain in a valid state during iteration.
    pub unsafe fn iter(&self, base: *mut u8) -> Iter {
        Iter { base, cursor: self.head }
    }

    /// Points the link held by `prev` (the head if [`NIL`]) at `to`.
    ///
    /// ### Safety:
    /// `prev` must be a node of this list or [`NIL`].
    #[inline]
    pub unsafe fn relink(&mut self, base: *mut u8, prev: usize, to: usize) {
        if prev == NIL {
            self.head = to;
        } else {
            (*free_header(base, prev)).next = to;
        }
    }

    /// First node, in address order, with at least `total` free bytes.
    pub unsafe fn first_fit(&self, base: *mut u8, total: usize) -> Option<Cursor> {
        let mut prev = NIL;
        let mut at = self.head;

        while at != NIL {
            let node = free_header(base, at).read();
            if node.size >= total {
                return Some(Cursor { prev, at });
            }

            prev = at;
            at = node.next;
        }

        None
    }

    /// Locates the node starting exactly at `offset`.
    pub unsafe fn find(&self, base: *mut u8, offset: usize) -> Option<Cursor> {
        let mut prev = NIL;
        let mut at = self.head;

        // ordered, so stop as soon as we pass it
        while at != NIL && at <= offset {
            if at == offset {
                return Some(Cursor { prev, at });
            }

            prev = at;
            at = (*free_header(base, at)).next;
        }

        None
    }

    /// Moves the node at `cursor` up by `delta` bytes, shrinking it by as much.
    ///
    /// ### Safety:
    /// The node must have at least `delta` free bytes and `delta` must be a granule multiple.
    pub unsafe fn advance(&mut self, base: *mut u8, cursor: Cursor, delta: usize) -> usize {
        let node = free_header(base, cursor.at).read();
        debug_assert!(node.size >= delta);

        let moved = cursor.at + delta;
        // source and destination overlap when delta < HEADER_SIZE, hence read-then-write
        free_header(base, moved).write(FreeHeader { size: node.size - delta, next: node.next });
        self.relink(base, cursor.prev, moved);
        moved
    }

    /// Splices the free block at `at` into the list, then merges it with its neighbours.
    ///
    /// The block's header must already hold its free size; its link is overwritten.
    /// Backward merging happens before forward merging, so a block sandwiched between
    /// two free neighbours ends up absorbed into the lower one.
    ///
    /// Returns the number of merges, each of which retired one header.
    ///
    /// ### Safety:
    /// `at` must be a free header in the heap at `base` that is not yet listed,
    /// and must not overlap any listed block.
    pub unsafe fn insert(&mut self, base: *mut u8, at: usize) -> usize {
        let mut prev = NIL;
        let mut next = self.head;
        while next != NIL && next < at {
            prev = next;
            next = (*free_header(base, next)).next;
        }

        (*free_header(base, at)).next = next;
        self.relink(base, prev, at);

        let mut merges = 0;
        let mut node = at;

        if prev != NIL && end_of(base, prev) == at {
            let absorbed = free_header(base, at).read();
            let lower = free_header(base, prev);
            (*lower).size += HEADER_SIZE + absorbed.size;
            (*lower).next = absorbed.next;

            node = prev;
            merges += 1;
        }

        let succ = (*free_header(base, node)).next;
        if succ != NIL && end_of(base, node) == succ {
            let absorbed = free_header(base, succ).read();
            let merged = free_header(base, node);
            (*merged).size += HEADER_SIZE + absorbed.size;
            (*merged).next = absorbed.next;

            merges += 1;
        }

        merges
    }
}

/// Offset one past the last free byte of the node at `at`.
#[inline]
pub(crate) unsafe fn end_of(base: *mut u8, at: usize) -> usize {
    at + HEADER_SIZE + (*free_header(base, at)).size
}

/// An iterator over the free list, yielding `(offset, free_size)`.
///
/// This `struct` is created by `FreeList::iter`. See its documentation for more.
#[derive(Debug, Clone, Copy)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub(crate) struct Iter {
    base: *mut u8,
    cursor: usize,
}

impl Iterator for Iter {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NIL {
            return None;
        }

        // SAFETY: guaranteed by the caller of `FreeList::iter`
        let node = unsafe { free_header(self.base, self.cursor).read() };
        let item = (self.cursor, node.size);
        self.cursor = node.next;
        Some(item)
    }
}
