//! # Physical Addresses and Page Arithmetic

use core::fmt;

/// A physical memory address as handed to `AllocatePages`.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether the address sits on a boundary of `page_size` (a power of two).
    #[inline]
    #[must_use]
    pub const fn is_aligned_to(self, page_size: u64) -> bool {
        self.0 & (page_size - 1) == 0
    }

    /// Checked add of a byte length, returning `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, len: u64) -> Option<Self> {
        match self.0.checked_add(len) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalAddress(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

/// Number of `page_size` pages needed to hold `bytes` bytes.
///
/// `page_size` must be a power of two. Returns `None` if rounding up overflows.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u64, page_size: u64) -> Option<u64> {
    debug_assert!(page_size.is_power_of_two());
    match bytes.checked_add(page_size - 1) {
        Some(v) => Some(v / page_size),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_round_up() {
        assert_eq!(pages_for(0, 4096), Some(0));
        assert_eq!(pages_for(1, 4096), Some(1));
        assert_eq!(pages_for(4096, 4096), Some(1));
        assert_eq!(pages_for(4097, 4096), Some(2));
        assert_eq!(pages_for(3 * 4096, 4096), Some(3));
    }

    #[test]
    fn pages_overflow_is_reported() {
        assert_eq!(pages_for(u64::MAX, 4096), None);
    }

    #[test]
    fn alignment() {
        assert!(PhysicalAddress::new(0x10_0000).is_aligned_to(4096));
        assert!(!PhysicalAddress::new(0x10_0010).is_aligned_to(4096));
        assert!(PhysicalAddress::new(0).is_aligned_to(2 * 1024 * 1024));
    }

    #[test]
    fn display_is_zero_padded_hex() {
        assert_eq!(
            alloc::format!("{}", PhysicalAddress::new(0x10_0000)),
            "0x0000000000100000"
        );
    }
}
