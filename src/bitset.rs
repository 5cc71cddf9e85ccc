//! Compact leaf sets for clade comparison.
//!
//! # Overview
//! Each bit position stands for one leaf of a fixed, sorted leaf list (usually
//! the common leaves of a pair). A clade restricted to that list is then a
//! bitset, and two trees can be compared by comparing sets of bitsets.
//!
//! # Example
//! For leaves [A, B, C, D] mapped to indices [0, 1, 2, 3]:
//! - Clade {A, C} → bitset `0b0101` (bits 0 and 2 set)
//! - Clade {B, C, D} → bitset `0b1110` (bits 1, 2, 3 set)

/// A set of leaf indices packed into `u64` words.
///
/// Each word holds 64 leaf indices, so trees of any size fit.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates an empty set.
    ///
    /// # Parameters
    /// - `words`: number of `u64` words, `num_leaves.div_ceil(64)`
    ///
    /// # Example
    /// ```
    /// # use kncl_tree_completion::bitset::Bitset;
    /// // 100 leaves need 2 words (128 bits)
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// assert!(bs.is_empty());
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Adds leaf `idx` to the set.
    ///
    /// # Example
    /// ```
    /// # use kncl_tree_completion::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(5);
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6; // idx / 64
        let bit = idx & 63; // idx % 64
        self.0[word] |= 1u64 << bit;
    }

    /// Whether leaf `idx` is in the set.
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        (self.0[idx >> 6] >> (idx & 63)) & 1 == 1
    }

    /// Union in place: `self` becomes `self ∪ other`.
    ///
    /// # Example
    /// ```
    /// # use kncl_tree_completion::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(0);
    /// let mut right = Bitset::zeros(1);
    /// right.set(1);
    /// left.or_assign(&right);
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Number of leaves in the set.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_contains() {
        let mut bs = Bitset::zeros(1);
        bs.set(0);
        bs.set(2);
        assert_eq!(bs.0[0], 0b0101);
        assert!(bs.contains(2));
        assert!(!bs.contains(1));
        assert!(!bs.is_empty());
    }

    /// ```text
    ///           root
    ///          /    \
    ///        node1   D
    ///        /   \
    ///       A    node2
    ///            /   \
    ///           B     C
    /// ```
    ///
    /// A=0, B=1, C=2, D=3: node2 = {B, C} → `0b0110`, node1 = {A, B, C} → `0b0111`
    #[test]
    fn test_clades_merge_upwards() {
        let mut node2 = Bitset::zeros(1);
        node2.set(1);
        node2.set(2);
        assert_eq!(node2.count_ones(), 2);

        let mut node1 = Bitset::zeros(1);
        node1.set(0);
        node1.or_assign(&node2);
        assert_eq!(node1.0[0], 0b0111);
        assert_eq!(node1.count_ones(), 3);
    }

    #[test]
    fn test_multiple_words() {
        let mut bs = Bitset::zeros(2);
        bs.set(0);
        bs.set(63);
        bs.set(64);
        bs.set(127);

        assert_eq!(bs.count_ones(), 4);
        assert_eq!(bs.0[0], 1u64 | (1u64 << 63));
        assert_eq!(bs.0[1], 1u64 | (1u64 << 63));
        assert!(bs.contains(64));
        assert!(!bs.contains(65));
    }
}
