#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod block;
mod check;
mod counters;
mod error;
mod freelist;
mod heap;
mod info;
mod span;

pub mod space;

#[cfg(feature = "lock_api")]
mod sync;

#[cfg(test)]
mod test_utils;

pub use block::{align_granule, payload_size, GRANULE, HEADER_SIZE, TAG};
pub use check::Checked;
pub use counters::Counters;
pub use error::{Corruption, HeapError};
pub use heap::{Heap, INITIAL_CAPACITY};
pub use info::{FreeBlocks, Info};
pub use span::Span;

pub use space::{AddressSpace, NoSpace, SliceSpace};
#[cfg(all(unix, feature = "system-backed"))]
pub use space::MmapSpace;

#[cfg(feature = "lock_api")]
pub use sync::Heapck;
