use core::ptr::NonNull;

use super::AddressSpace;

/// Address range reserved up front unless configured otherwise.
const RESERVATION_DEFAULT: usize = 1 << 30;

/// Anonymous memory from the operating system via `mmap`.
///
/// On `acquire`, a large `PROT_NONE` range is reserved and its bottom is committed.
/// Every `extend` commits more of the same range with `mprotect`, so the heap stays one
/// linear range for as long as the reservation lasts. Fresh anonymous pages are zero-filled.
///
/// Reserving address space does not consume memory; only committed pages do.
#[derive(Debug)]
pub struct MmapSpace {
    reservation: usize,
    reserved: Option<NonNull<u8>>,
    /// Bytes committed from the bottom of the reservation, page-rounded.
    committed: usize,
}

unsafe impl Send for MmapSpace {}

impl MmapSpace {
    /// Reserves [`RESERVATION_DEFAULT`] bytes of address space on first use.
    pub const fn new() -> Self {
        Self::with_reservation(RESERVATION_DEFAULT)
    }

    /// Reserves `reservation` bytes of address space on first use.
    /// The heap can never grow beyond this.
    pub const fn with_reservation(reservation: usize) -> Self {
        Self { reservation, reserved: None, committed: 0 }
    }

    fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size <= 0 {
            4096
        } else {
            size as usize
        }
    }

    /// Makes the bottom `size` bytes of the reservation accessible.
    unsafe fn commit_to(&mut self, base: NonNull<u8>, size: usize) -> Result<(), ()> {
        if size <= self.committed {
            return Ok(());
        }

        let page_l1 = Self::page_size() - 1;
        let target = size.checked_add(page_l1).ok_or(())? & !page_l1;
        if target > self.reservation {
            return Err(());
        }

        let result = libc::mprotect(
            base.as_ptr().add(self.committed).cast(),
            target - self.committed,
            libc::PROT_READ | libc::PROT_WRITE,
        );

        if result != 0 {
            return Err(());
        }

        self.committed = target;
        Ok(())
    }
}

impl Default for MmapSpace {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: commits are prefixes of a single private anonymous mapping
unsafe impl AddressSpace for MmapSpace {
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>> {
        if self.reserved.is_some() || size > self.reservation {
            return None;
        }

        let x = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                self.reservation,
                libc::PROT_NONE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };

        if x == libc::MAP_FAILED {
            return None;
        }

        let base = NonNull::new(x.cast::<u8>())?;
        self.reserved = Some(base);
        self.committed = 0;

        match unsafe { self.commit_to(base, size) } {
            Ok(()) => Some(base),
            Err(()) => {
                unsafe { self.release(base, size) };
                None
            }
        }
    }

    unsafe fn extend(&mut self, end: NonNull<u8>, additional: usize) -> Result<(), ()> {
        let base = self.reserved.ok_or(())?;
        let size = end.as_ptr() as usize - base.as_ptr() as usize;

        self.commit_to(base, size.checked_add(additional).ok_or(())?)
    }

    unsafe fn release(&mut self, base: NonNull<u8>, _size: usize) {
        let result = libc::munmap(base.as_ptr().cast(), self.reservation);
        self.reserved = None;
        self.committed = 0;

        // a panic message could allocate from the heap being torn down, abort instead
        #[cfg(debug_assertions)]
        if result != 0 {
            libc::abort();
        }
        #[cfg(not(debug_assertions))]
        let _ = result;
    }
}
