use core::fmt;

/// Failure of a heap operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapError {
    /// The heap has not been initialised with [`Heap::init`](crate::Heap::init).
    Uninitialised,
    /// [`Heap::init`](crate::Heap::init) was called on an initialised heap.
    AlreadyInitialised,
    /// The address-space provider could not supply more memory.
    ProviderExhausted,
    /// The requested size cannot be represented once rounded and headed.
    SizeOverflow,
    /// The layout asks for more alignment than the granule provides.
    UnsupportedAlignment,
    /// The pointer is not the payload of a live block of this heap.
    InvalidPointer,
    /// A scan found the heap's structure broken.
    Corrupted(Corruption),
}

/// The invariant a heap scan found violated, and where.
///
/// Offsets are relative to the heap base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corruption {
    /// An allocated header does not carry the sentinel tag.
    BadTag { offset: usize },
    /// A block size is not a multiple of the granule.
    MisalignedSize { offset: usize },
    /// A block runs past the end of the heap.
    Overrun { offset: usize },
    /// A free-list node does not sit on a block boundary.
    StrayNode { offset: usize },
    /// Two consecutive blocks are both free.
    AdjacentFree { offset: usize },
    /// Free-list links do not strictly ascend.
    Unordered { offset: usize },
    /// The committed-size counter disagrees with the scan.
    CommittedMismatch { counted: usize, scanned: usize },
    /// The live-block counter disagrees with the scan.
    LiveBlockMismatch { counted: usize, scanned: usize },
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::Uninitialised => f.write_str("heap is not initialised"),
            HeapError::AlreadyInitialised => f.write_str("heap is already initialised"),
            HeapError::ProviderExhausted => f.write_str("address space provider is exhausted"),
            HeapError::SizeOverflow => f.write_str("requested size overflows"),
            HeapError::UnsupportedAlignment => f.write_str("alignment exceeds the granule"),
            HeapError::InvalidPointer => f.write_str("pointer is not a live allocation of this heap"),
            HeapError::Corrupted(corruption) => write!(f, "heap corrupted: {}", corruption),
        }
    }
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Corruption::BadTag { offset } => write!(f, "bad tag on block at {:#x}", offset),
            Corruption::MisalignedSize { offset } => {
                write!(f, "block at {:#x} has a size off the granule", offset)
            }
            Corruption::Overrun { offset } => {
                write!(f, "block at {:#x} runs past the end of the heap", offset)
            }
            Corruption::StrayNode { offset } => {
                write!(f, "free-list node at {:#x} is not on a block boundary", offset)
            }
            Corruption::AdjacentFree { offset } => {
                write!(f, "free block at {:#x} borders another free block", offset)
            }
            Corruption::Unordered { offset } => {
                write!(f, "free-list node at {:#x} links backwards", offset)
            }
            Corruption::CommittedMismatch { counted, scanned } => {
                write!(f, "committed bytes counted as {} but scanned as {}", counted, scanned)
            }
            Corruption::LiveBlockMismatch { counted, scanned } => {
                write!(f, "live blocks counted as {} but scanned as {}", counted, scanned)
            }
        }
    }
}

impl From<Corruption> for HeapError {
    fn from(value: Corruption) -> Self {
        HeapError::Corrupted(value)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HeapError {}

#[cfg(feature = "allocator-api2")]
impl From<HeapError> for allocator_api2::alloc::AllocError {
    fn from(_: HeapError) -> Self {
        allocator_api2::alloc::AllocError
    }
}
