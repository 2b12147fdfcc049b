//! CPU affinity masks
//!
//! Controls which CPUs a task may be placed on or migrated to.

use crate::runqueue::CpuId;

/// CPU affinity mask (64 CPUs max)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuMask(u64);

impl CpuMask {
    /// Create empty mask
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Create mask allowing all CPUs
    pub const fn all() -> Self {
        Self(u64::MAX)
    }

    /// Create mask for a single CPU
    pub const fn single(cpu: CpuId) -> Self {
        Self(1 << (cpu & 63))
    }

    /// Set CPU bit
    pub fn set(&mut self, cpu: CpuId) {
        self.0 |= 1 << (cpu & 63);
    }

    /// Clear CPU bit
    pub fn clear(&mut self, cpu: CpuId) {
        self.0 &= !(1 << (cpu & 63));
    }

    /// Check if CPU is set
    pub fn is_set(&self, cpu: CpuId) -> bool {
        (self.0 & (1 << (cpu & 63))) != 0
    }

    /// Count set CPUs
    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Get first set CPU
    pub fn first(&self) -> Option<CpuId> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as CpuId)
        }
    }

    /// Intersect with another mask
    pub fn intersect(&self, other: &Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Union with another mask
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for CpuMask {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_and_set() {
        let mut mask = CpuMask::single(2);
        assert!(mask.is_set(2));
        assert!(!mask.is_set(0));
        assert_eq!(mask.count(), 1);

        mask.set(5);
        assert!(mask.is_set(5));
        assert_eq!(mask.count(), 2);

        mask.clear(2);
        assert!(!mask.is_set(2));
        assert_eq!(mask.first(), Some(5));
    }

    #[test]
    fn test_empty_and_all() {
        assert!(CpuMask::empty().is_empty());
        assert_eq!(CpuMask::empty().first(), None);
        assert_eq!(CpuMask::all().count(), 64);
    }

    #[test]
    fn test_intersect_union() {
        let a = CpuMask::single(1).union(&CpuMask::single(3));
        let b = CpuMask::single(3).union(&CpuMask::single(4));
        let both = a.intersect(&b);
        assert!(both.is_set(3));
        assert_eq!(both.count(), 1);
        assert_eq!(a.union(&b).count(), 4);
    }
}
