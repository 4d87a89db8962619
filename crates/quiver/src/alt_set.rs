//! A small bitset over alternative numbers.
//!
//! Alternatives are numbered from 1 and rarely exceed a few dozen per
//! decision, so a handful of inline `u64` blocks covers every practical
//! grammar without allocation.

use smallvec::SmallVec;
use std::fmt;

/// A set of alternative numbers.
///
/// Alternative 0 is reserved as the invalid alternative and is never a
/// member.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct AltBitSet {
    blocks: SmallVec<[u64; 2]>,
}

impl AltBitSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set containing the alternatives `1..=n`.
    #[must_use]
    pub fn all(n: u32) -> Self {
        let mut set = Self::new();
        for alt in 1..=n {
            set.insert(alt);
        }
        set
    }

    /// Add an alternative to the set.
    pub fn insert(&mut self, alt: u32) {
        let block = (alt / 64) as usize;
        if self.blocks.len() <= block {
            self.blocks.resize(block + 1, 0);
        }
        self.blocks[block] |= 1 << (alt % 64);
    }

    /// Test membership.
    #[must_use]
    pub fn contains(&self, alt: u32) -> bool {
        self.blocks
            .get((alt / 64) as usize)
            .is_some_and(|b| b & (1 << (alt % 64)) != 0)
    }

    /// Number of alternatives in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// `true` when no alternative is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|&b| b == 0)
    }

    /// The smallest alternative in the set, if any.
    #[must_use]
    pub fn min(&self) -> Option<u32> {
        for (i, &block) in self.blocks.iter().enumerate() {
            if block != 0 {
                return Some(i as u32 * 64 + block.trailing_zeros());
            }
        }
        None
    }

    /// Union another set into this one.
    pub fn union_with(&mut self, other: &Self) {
        if self.blocks.len() < other.blocks.len() {
            self.blocks.resize(other.blocks.len(), 0);
        }
        for (dst, src) in self.blocks.iter_mut().zip(other.blocks.iter()) {
            *dst |= src;
        }
    }

    /// Iterate the members in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.blocks.iter().enumerate().flat_map(|(i, &block)| {
            (0..64).filter_map(move |bit| {
                if block & (1 << bit) != 0 {
                    Some(i as u32 * 64 + bit)
                } else {
                    None
                }
            })
        })
    }
}

impl fmt::Debug for AltBitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<u32> for AltBitSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut set = Self::new();
        for alt in iter {
            set.insert(alt);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains() {
        let mut set = AltBitSet::new();
        assert!(set.is_empty());

        set.insert(1);
        set.insert(3);
        set.insert(120);

        assert!(set.contains(1));
        assert!(!set.contains(2));
        assert!(set.contains(3));
        assert!(set.contains(120));
        assert_eq!(set.len(), 3);
        assert_eq!(set.min(), Some(1));
    }

    #[test]
    fn union_and_iter() {
        let a: AltBitSet = [1u32, 2].into_iter().collect();
        let b: AltBitSet = [2u32, 5].into_iter().collect();

        let mut u = a.clone();
        u.union_with(&b);
        assert_eq!(u.iter().collect::<Vec<_>>(), vec![1, 2, 5]);
    }

    #[test]
    fn equality_ignores_trailing_zero_blocks() {
        let mut a = AltBitSet::new();
        a.insert(1);
        let b: AltBitSet = [1u32].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(AltBitSet::all(3).iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
