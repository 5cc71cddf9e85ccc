//! Common / distinct leaf partition of two trees.
//!
//! Common leaves are kept in lexicographic order and every later step iterates
//! them in that order, which keeps completion deterministic regardless of how
//! the input trees list their taxa.

use std::collections::BTreeSet;

use crate::error::KnclError;
use crate::tree::{NodeId, Tree};

#[derive(Debug, Clone)]
pub struct LeafPartition {
    /// Leaves present in both trees, sorted.
    pub common: Vec<String>,
    /// Leaves only present in the first tree.
    pub distinct1: BTreeSet<String>,
    /// Leaves only present in the second tree.
    pub distinct2: BTreeSet<String>,
}

impl LeafPartition {
    /// Split the leaves of two trees into common and distinct sets.
    ///
    /// # Errors
    /// `InsufficientOverlap` when fewer than two leaves are shared.
    pub fn new(t1: &Tree, t2: &Tree) -> Result<Self, KnclError> {
        let leaves1 = t1.leaf_names();
        let leaves2 = t2.leaf_names();

        // BTreeSet intersection already yields names in lexicographic order
        let common: Vec<String> = leaves1.intersection(&leaves2).cloned().collect();
        if common.len() < 2 {
            return Err(KnclError::InsufficientOverlap { common: common.len() });
        }

        let distinct1 = leaves1.difference(&leaves2).cloned().collect();
        let distinct2 = leaves2.difference(&leaves1).cloned().collect();

        Ok(LeafPartition { common, distinct1, distinct2 })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.common.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.common.is_empty()
    }

    /// Node ids of the common leaves in `tree`, in canonical order.
    ///
    /// # Errors
    /// `MissingLeaf` if a common leaf cannot be found in `tree`.
    pub fn common_ids(&self, tree: &Tree) -> Result<Vec<NodeId>, KnclError> {
        let lookup = tree.leaf_index();
        self.common
            .iter()
            .map(|name| {
                lookup
                    .get(name)
                    .copied()
                    .ok_or_else(|| KnclError::MissingLeaf(name.clone()))
            })
            .collect()
    }

    /// Every leaf of either tree, sorted.
    pub fn union(&self) -> BTreeSet<String> {
        self.common
            .iter()
            .chain(self.distinct1.iter())
            .chain(self.distinct2.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_newick;

    #[test]
    fn test_partition_sets() {
        let t1 = parse_newick("(D:1,(B:1,C:1):1,A:2);").unwrap();
        let t2 = parse_newick("(A:1,(B:1,E:1):1,D:1);").unwrap();
        let part = LeafPartition::new(&t1, &t2).unwrap();
        assert_eq!(part.common, vec!["A", "B", "D"]);
        assert_eq!(part.distinct1.iter().collect::<Vec<_>>(), vec!["C"]);
        assert_eq!(part.distinct2.iter().collect::<Vec<_>>(), vec!["E"]);
        assert_eq!(part.union().len(), 5);
    }

    #[test]
    fn test_common_ids_follow_canonical_order() {
        let t1 = parse_newick("(D:1,(B:1,C:1):1,A:2);").unwrap();
        let t2 = parse_newick("(A:1,(B:1,E:1):1,D:1);").unwrap();
        let part = LeafPartition::new(&t1, &t2).unwrap();
        let ids = part.common_ids(&t1).unwrap();
        let names: Vec<_> = ids.iter().map(|&id| t1.node(id).name.clone().unwrap()).collect();
        assert_eq!(names, part.common);
    }

    #[test]
    fn test_insufficient_overlap() {
        let t1 = parse_newick("(A:1,B:1);").unwrap();
        let t2 = parse_newick("(A:1,C:1);").unwrap();
        assert!(matches!(
            LeafPartition::new(&t1, &t2),
            Err(KnclError::InsufficientOverlap { common: 1 })
        ));
    }
}
