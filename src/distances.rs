//! Tree comparison over a shared leaf list.
//!
//! Two measures are provided:
//!
//! 1. **Branch Score Distance (BSD)**: compares path lengths between every pair
//!    of leaves, `sqrt(Σ (d_a(x, y) - d_b(x, y))²)`. After completion it is
//!    reported twice: BSD(+) on the completed trees over the union leaf set and
//!    BSD(-) on the input trees over the common leaves.
//!
//! 2. **Rooted Robinson-Foulds (RF)**: counts the clades found in only one of
//!    the two trees once both are restricted to the same leaves. A zero RF over
//!    the common leaves means completion left the original backbone intact.

use itertools::Itertools;

use crate::error::KnclError;
use crate::oracle::DistanceOracle;
use crate::snapshot::CladeSnapshot;
use crate::tree::{NodeId, Tree};

/// Branch Score Distance between `tree_a` and `tree_b` over `leaves`.
///
/// # Algorithm
/// Pairs are visited in the order of `leaves`; path lengths come from one
/// [`DistanceOracle`] per tree, so the cost is O(n log n + |leaves|²).
///
/// # Example
/// ```text
/// Tree A: (A:1,(B:1,C:1):1);    d(A,B) = 3, d(A,C) = 3, d(B,C) = 2
/// Tree B: (A:1,(B:1,C:2):1);    d(A,B) = 3, d(A,C) = 4, d(B,C) = 3
///
/// BSD = sqrt(0 + 1 + 1) = 1.414...
/// ```
///
/// # Errors
/// `MissingLeaf` if a name of `leaves` is not a leaf of either tree.
pub fn branch_score_distance(
    tree_a: &Tree,
    tree_b: &Tree,
    leaves: &[String],
) -> Result<f64, KnclError> {
    let ids_a = leaf_ids(tree_a, leaves)?;
    let ids_b = leaf_ids(tree_b, leaves)?;
    let oracle_a = DistanceOracle::new(tree_a);
    let oracle_b = DistanceOracle::new(tree_b);

    let sum_squared: f64 = (0..leaves.len())
        .tuple_combinations()
        .map(|(i, j)| {
            let diff = oracle_a.distance(ids_a[i], ids_a[j]) - oracle_b.distance(ids_b[i], ids_b[j]);
            diff * diff
        })
        .sum();

    Ok(sum_squared.sqrt())
}

/// Rooted Robinson-Foulds distance between two trees restricted to `leaves`.
///
/// # Algorithm
/// RF = |A| + |B| - 2|A ∩ B| where A and B are the clade sets of the snapshots.
///
/// # Example
/// ```text
/// Tree 1: ((A,B),(C,D))     Clades: {A,B}, {C,D}
/// Tree 2: ((A,C),(B,D))     Clades: {A,C}, {B,D}
///
/// RF = 2 + 2 - 2*0 = 4
/// ```
///
/// # Errors
/// `MissingLeaf` if a name of `leaves` is not a leaf of either tree.
pub fn robinson_foulds(tree_a: &Tree, tree_b: &Tree, leaves: &[String]) -> Result<usize, KnclError> {
    let snap_a = CladeSnapshot::from_tree(tree_a, leaves)?;
    let snap_b = CladeSnapshot::from_tree(tree_b, leaves)?;
    Ok(rf_from_snapshots(&snap_a, &snap_b))
}

/// Robinson-Foulds distance from two snapshots over the same leaf list.
pub fn rf_from_snapshots(a: &CladeSnapshot, b: &CladeSnapshot) -> usize {
    let inter = a.clades.intersection(&b.clades).count();
    a.clades.len() + b.clades.len() - 2 * inter
}

/// Whether `completed`, restricted to `leaves`, has the shape of `original`
/// restricted to the same leaves.
pub fn topology_preserved(
    original: &Tree,
    completed: &Tree,
    leaves: &[String],
) -> Result<bool, KnclError> {
    Ok(robinson_foulds(original, completed, leaves)? == 0)
}

fn leaf_ids(tree: &Tree, leaves: &[String]) -> Result<Vec<NodeId>, KnclError> {
    let lookup = tree.leaf_index();
    leaves
        .iter()
        .map(|name| {
            lookup
                .get(name)
                .copied()
                .ok_or_else(|| KnclError::MissingLeaf(name.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_newick;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bsd_identical_trees() {
        let t = parse_newick("(A:1,(B:1,C:1):1);").unwrap();
        assert_eq!(branch_score_distance(&t, &t, &names(&["A", "B", "C"])).unwrap(), 0.0);
    }

    #[test]
    fn test_bsd_one_longer_branch() {
        let a = parse_newick("(A:1,(B:1,C:1):1);").unwrap();
        let b = parse_newick("(A:1,(B:1,C:2):1);").unwrap();
        let bsd = branch_score_distance(&a, &b, &names(&["A", "B", "C"])).unwrap();
        assert!((bsd - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_bsd_ignores_leaves_outside_the_list() {
        let a = parse_newick("(A:1,(B:1,C:5):1);").unwrap();
        let b = parse_newick("(A:1,(B:1,D:1):1);").unwrap();
        assert_eq!(branch_score_distance(&a, &b, &names(&["A", "B"])).unwrap(), 0.0);
        assert!(matches!(
            branch_score_distance(&a, &b, &names(&["A", "C"])),
            Err(KnclError::MissingLeaf(name)) if name == "C"
        ));
    }

    #[test]
    fn test_bsd_is_symmetric() {
        let a = parse_newick("((A:0.3,B:1.2):0.4,(C:0.9,D:0.1):0.7);").unwrap();
        let b = parse_newick("((A:0.5,C:0.2):0.1,(B:1.9,D:0.6):0.3);").unwrap();
        let leaves = names(&["A", "B", "C", "D"]);
        let ab = branch_score_distance(&a, &b, &leaves).unwrap();
        let ba = branch_score_distance(&b, &a, &leaves).unwrap();
        assert!((ab - ba).abs() < 1e-12);
        assert!(ab > 0.0);
    }

    #[test]
    fn test_rooted_rf() {
        let a = parse_newick("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let b = parse_newick("((A:1,C:1):1,(B:1,D:1):1);").unwrap();
        let leaves = names(&["A", "B", "C", "D"]);
        assert_eq!(robinson_foulds(&a, &b, &leaves).unwrap(), 4);
        assert_eq!(robinson_foulds(&a, &a, &leaves).unwrap(), 0);
    }

    #[test]
    fn test_topology_preserved_after_adding_leaves() {
        let original = parse_newick("((A:1,B:1):1,C:1);").unwrap();
        let grown = parse_newick("((A:1,(B:1,X:1):1):1,(C:1,Y:1):1);").unwrap();
        let moved = parse_newick("(A:1,(B:1,C:1,X:1):1);").unwrap();
        let leaves = names(&["A", "B", "C"]);
        assert!(topology_preserved(&original, &grown, &leaves).unwrap());
        assert!(!topology_preserved(&original, &moved, &leaves).unwrap());
    }
}
