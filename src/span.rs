use core::ops::Range;

use crate::block::GRANULE;

/// A half-open range of memory, `base..acme`.
///
/// Spans are plain address pairs: constructing one asserts nothing about the memory.
#[derive(Debug, Clone, Copy)]
pub struct Span {
    base: *mut u8,
    acme: *mut u8,
}

unsafe impl Send for Span {}

impl Default for Span {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Range<*mut u8>> for Span {
    fn from(value: Range<*mut u8>) -> Self {
        Self { base: value.start, acme: value.end }
    }
}

impl From<*mut [u8]> for Span {
    #[inline]
    fn from(value: *mut [u8]) -> Self {
        let base = value.cast::<u8>();
        Self { base, acme: base.wrapping_add(value.len()) }
    }
}

impl From<&mut [u8]> for Span {
    #[inline]
    fn from(value: &mut [u8]) -> Self {
        Self::from(value as *mut [u8])
    }
}

impl PartialEq for Span {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        (self.is_empty() && other.is_empty()) || (self.base == other.base && self.acme == other.acme)
    }
}
impl Eq for Span {}

impl Span {
    /// A span covering no memory.
    pub const fn empty() -> Self {
        Self { base: core::ptr::null_mut(), acme: core::ptr::null_mut() }
    }

    pub const fn new(base: *mut u8, acme: *mut u8) -> Self {
        Self { base, acme }
    }

    pub fn from_base_size(base: *mut u8, size: usize) -> Self {
        Self { base, acme: base.wrapping_add(size) }
    }

    pub const fn base(&self) -> *mut u8 {
        self.base
    }

    pub const fn acme(&self) -> *mut u8 {
        self.acme
    }

    pub fn size(&self) -> usize {
        (self.acme as usize).saturating_sub(self.base as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.acme as usize <= self.base as usize
    }

    /// Returns whether `self` contains `ptr`.
    pub fn contains(&self, ptr: *mut u8) -> bool {
        self.base as usize <= ptr as usize && (ptr as usize) < self.acme as usize
    }

    /// Returns whether `self` contains `other`.
    ///
    /// Empty spans are contained by any span.
    pub fn contains_span(&self, other: Span) -> bool {
        other.is_empty()
            || (self.base as usize <= other.base as usize
                && other.acme as usize <= self.acme as usize)
    }

    /// Aligns `base` up and `acme` down to [`GRANULE`].
    ///
    /// The result is empty if nothing aligned remains.
    pub fn granule_align_inward(self) -> Self {
        let mask = GRANULE - 1;
        let base_addr = self.base as usize;
        let acme_addr = self.acme as usize;

        let Some(aligned_base) = base_addr.checked_add(mask).map(|a| a & !mask) else {
            return Self::empty();
        };
        let aligned_acme = acme_addr & !mask;

        if aligned_acme <= aligned_base {
            return Self::empty();
        }

        // offsets keep the provenance of `base`
        let base = self.base.wrapping_add(aligned_base - base_addr);
        Self { base, acme: base.wrapping_add(aligned_acme - aligned_base) }
    }

    /// Splits off the lowest `size` bytes, returning them and the remainder.
    pub fn split_at(self, size: usize) -> Option<(Span, Span)> {
        if size > self.size() {
            return None;
        }

        let mid = self.base.wrapping_add(size);
        Some((Span::new(self.base, mid), Span::new(mid, self.acme)))
    }
}

impl core::fmt::Display for Span {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{:p}..{:p}", self.base, self.acme))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_inward_test() {
        let mut mem = [0u8; 256];
        let raw = Span::from(&mut mem[..]);
        let aligned = raw.granule_align_inward();

        assert!(raw.contains_span(aligned));
        assert_eq!(aligned.base() as usize % GRANULE, 0);
        assert_eq!(aligned.acme() as usize % GRANULE, 0);
        assert!(aligned.size() >= 256 - 2 * GRANULE + 2);

        let sliver = Span::from_base_size(aligned.base().wrapping_add(1), 14);
        assert!(sliver.granule_align_inward().is_empty());
    }

    #[test]
    fn split_at_test() {
        let mut mem = [0u8; 64];
        let span = Span::from(&mut mem[..]);

        let (low, high) = span.split_at(16).unwrap();
        assert_eq!(low.size(), 16);
        assert_eq!(high.size(), 48);
        assert_eq!(low.acme(), high.base());
        assert!(span.split_at(65).is_none());

        assert!(span.contains(low.base()));
        assert!(!span.contains(span.acme()));
    }

    #[test]
    fn empty_spans_are_equal() {
        let mut mem = [0u8; 8];
        let base = mem.as_mut_ptr();
        assert_eq!(Span::new(base, base), Span::empty());
        assert_ne!(Span::from_base_size(base, 8), Span::empty());
    }
}
