//! Clade snapshots of a tree restricted to a leaf list.
//!
//! # Overview
//! A [`CladeSnapshot`] holds every clade (set of leaves below one node) of a
//! tree, intersected with a fixed list of leaves. Two rooted trees restricted
//! to the same leaves have the same shape exactly when their snapshots hold
//! the same clades, so the snapshot answers "did completion disturb the common
//! backbone?" without pruning anything.
//!
//! ```text
//!          root                      restricted to [A, B, C]
//!         /    \
//!        x      C                    x    → {A, B}
//!       / \                          y    → {B}      (trivial, skipped)
//!      A   y                         root → {A, B, C} (whole set, skipped)
//!         / \
//!        B   D
//! ```
//!
//! # Why names and not node ids
//! Ids depend on parse order and on every graft. Bit positions come from the
//! position of each name in the leaf list, so the same taxon maps to the same
//! bit in every tree.

use std::collections::{HashMap, HashSet};

use crate::bitset::Bitset;
use crate::error::KnclError;
use crate::tree::Tree;

#[derive(Debug, Clone)]
pub struct CladeSnapshot {
    /// Non-trivial clades: at least two leaves and not the whole leaf list.
    pub clades: HashSet<Bitset>,
    /// Number of `u64` words in each bitset.
    pub words: usize,
    pub num_leaves: usize,
}

impl CladeSnapshot {
    /// Build the snapshot of `tree` over `leaves`.
    ///
    /// # Algorithm
    /// 1. Map each name of `leaves` to its position
    /// 2. Walk the tree in postorder, OR-ing child bitsets into their parent
    /// 3. Keep the bitsets that are neither trivial nor the full set
    ///
    /// Leaves of `tree` that are not in `leaves` contribute nothing.
    ///
    /// # Errors
    /// `MissingLeaf` if a name of `leaves` is not a leaf of `tree`.
    pub fn from_tree(tree: &Tree, leaves: &[String]) -> Result<Self, KnclError> {
        let num_leaves = leaves.len();
        let words = num_leaves.div_ceil(64);
        let index: HashMap<&str, usize> = leaves
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut found = Bitset::zeros(words);
        let mut clades = HashSet::new();
        // Bitset of every node, consumed by its parent
        let mut below: Vec<Option<Bitset>> = vec![None; tree.arena_len()];

        for id in tree.postorder() {
            let node = tree.node(id);
            let mut bits = Bitset::zeros(words);
            if node.is_leaf() {
                if let Some(&i) = node.name.as_deref().and_then(|name| index.get(name)) {
                    bits.set(i);
                    found.set(i);
                }
            } else {
                for &child in &node.children {
                    if let Some(child_bits) = below[child].take() {
                        bits.or_assign(&child_bits);
                    }
                }
                let size = bits.count_ones();
                if size >= 2 && size < num_leaves {
                    clades.insert(bits.clone());
                }
            }
            below[id] = Some(bits);
        }

        if let Some(missing) = (0..num_leaves).find(|&i| !found.contains(i)) {
            return Err(KnclError::MissingLeaf(leaves[missing].clone()));
        }

        Ok(CladeSnapshot {
            clades,
            words,
            num_leaves,
        })
    }
}
