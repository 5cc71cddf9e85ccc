//! Choosing where a missing subtree goes.
//!
//! # Overview
//! For every candidate edge `(p, c)` of length `L` the grafting point sits at
//! fraction `x ∈ [0, 1)` from `p`. Its distance to a reference leaf `l` is
//!
//! ```text
//! d(x, l) = A_l + ε_l · x · L      A_l = d(p, l),  ε_l = -1 if l is below c, else +1
//! ```
//!
//! and the objective is `Σ (d(x, l) - d_p[l])²` over the nearest common leaves,
//! where `d_p[l]` is the rate-corrected distance observed in the source tree.
//! Because `ε_l² = 1` the objective is a parabola in `x` with its minimum at
//!
//! ```text
//! x* = Σ ε_l (d_p[l] - A_l) / (L · |NCL|)
//! ```
//!
//! Each edge contributes at most two candidates: `x = 0` and `x*` clamped into
//! the admissible range. The best candidate over all edges wins, ties being
//! broken by height and then by edge rank so results never depend on hash or
//! traversal accidents.

use std::collections::BTreeSet;

use crate::oracle::DistanceOracle;
use crate::tree::{NodeId, Tree};

/// Shortest terminal branch an insertion may leave behind by default.
pub const MIN_TERMINAL_LENGTH: f64 = 1e-3;

/// Edges shorter than this only offer their parent end.
const ZERO_LENGTH: f64 = 1e-15;

/// Objective values (and heights) within this tolerance compare equal.
const OBJECTIVE_TOLERANCE: f64 = 1e-12;

/// Distances within this tolerance of the k-th nearest leaf count as ties.
const NEAREST_TIE_TOLERANCE: f64 = 1e-10;

/// Largest admissible fraction on an internal edge.
const MAX_FRACTION: f64 = 1.0 - 1e-12;

/// The `k` common leaves closest to `from` in the source tree.
///
/// Returns indices into the canonical common-leaf order, nearest first. Equal
/// distances keep canonical order, and leaves tied with the `k`-th one (within
/// `1e-10`) are included as well, so the result can hold more than `k` entries.
pub fn nearest_common_leaves(
    source: &DistanceOracle,
    from: NodeId,
    source_ids: &[NodeId],
    k: usize,
) -> Vec<usize> {
    let mut ranked: Vec<(usize, f64)> = source_ids
        .iter()
        .enumerate()
        .map(|(i, &id)| (i, source.distance(from, id)))
        .collect();
    // stable: equal distances stay in canonical order
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    if k == 0 || ranked.len() <= k {
        return ranked.into_iter().map(|(i, _)| i).collect();
    }
    let cutoff = ranked[k - 1].1;
    ranked
        .into_iter()
        .enumerate()
        .take_while(|&(pos, (_, d))| pos < k || (d - cutoff).abs() <= NEAREST_TIE_TOLERANCE)
        .map(|(_, (i, _))| i)
        .collect()
}

/// A point on an edge of the target tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsertionPoint {
    pub parent: NodeId,
    pub child: NodeId,
    /// Fraction of the edge length measured from `parent`.
    pub x: f64,
    pub objective: f64,
    /// Distance from the root to the point.
    pub height: f64,
    pub edge_rank: usize,
}

impl InsertionPoint {
    /// Lower objective, then closer to the root, then smaller edge rank.
    fn is_better_than(&self, other: &InsertionPoint) -> bool {
        if self.objective < other.objective - OBJECTIVE_TOLERANCE {
            return true;
        }
        if self.objective > other.objective + OBJECTIVE_TOLERANCE {
            return false;
        }
        if self.height < other.height - OBJECTIVE_TOLERANCE {
            return true;
        }
        if self.height > other.height + OBJECTIVE_TOLERANCE {
            return false;
        }
        self.edge_rank < other.edge_rank
    }
}

/// Flags the edges whose child subtree holds a leaf of `own_distinct`.
///
/// Those edges lead into the target's own distinct material and are not
/// candidate insertion edges. The result is indexed by [`NodeId`].
pub fn reserved_edges(tree: &Tree, own_distinct: &BTreeSet<String>) -> Vec<bool> {
    let mut reserved = vec![false; tree.arena_len()];
    for id in tree.postorder() {
        let node = tree.node(id);
        reserved[id] = if node.is_leaf() {
            node.name.as_ref().is_some_and(|name| own_distinct.contains(name))
        } else {
            node.children.iter().any(|&c| reserved[c])
        };
    }
    reserved
}

/// Best grafting point in `tree` for the given reference leaves.
///
/// `targets[i]` is a common leaf of `tree` and `expected[i]` the distance the
/// grafting point should have from it. Edges whose child is part of an inserted
/// subtree or is flagged in `reserved` are skipped. A leaf edge never keeps a
/// terminal branch shorter than `min_terminal`.
///
/// Returns `None` if no edge is eligible.
pub fn find_insertion_point(
    tree: &Tree,
    oracle: &DistanceOracle,
    reserved: &[bool],
    targets: &[NodeId],
    expected: &[f64],
    min_terminal: f64,
) -> Option<InsertionPoint> {
    debug_assert_eq!(targets.len(), expected.len());
    if targets.is_empty() {
        return None;
    }
    let count = targets.len() as f64;
    let mut best: Option<InsertionPoint> = None;
    // (A_l, ε_l, d_p[l]) for the current edge
    let mut terms: Vec<(f64, f64, f64)> = Vec::with_capacity(targets.len());

    for child in tree.preorder() {
        let node = tree.node(child);
        let Some(parent) = node.parent else { continue };
        if node.in_inserted || reserved[child] {
            continue;
        }
        let length = node.dist;

        terms.clear();
        terms.extend(targets.iter().zip(expected).map(|(&leaf, &d)| {
            let sign = if oracle.is_ancestor(child, leaf) { -1.0 } else { 1.0 };
            (oracle.distance(parent, leaf), sign, d)
        }));
        let objective = |x: f64| {
            terms
                .iter()
                .map(|&(a, sign, d)| {
                    let r = a + sign * x * length - d;
                    r * r
                })
                .sum::<f64>()
        };

        let mut candidates = [Some(0.0), None];
        if length >= ZERO_LENGTH {
            let x_star =
                terms.iter().map(|&(a, sign, d)| sign * (d - a)).sum::<f64>() / (length * count);
            // Past the child end of an internal edge the child node is offered
            // as x = 0 on its own eligible edges.
            let past_child = !node.is_leaf()
                && x_star >= 1.0
                && node
                    .children
                    .iter()
                    .any(|&c| !reserved[c] && !tree.node(c).in_inserted);
            let upper = if node.is_leaf() {
                (1.0 - min_terminal / length).max(0.0)
            } else {
                MAX_FRACTION
            };
            let x = x_star.clamp(0.0, upper);
            if x > 0.0 && !past_child {
                candidates[1] = Some(x);
            }
        }

        let base = oracle.dist_to_root(parent);
        for x in candidates.into_iter().flatten() {
            let point = InsertionPoint {
                parent,
                child,
                x,
                objective: objective(x),
                height: base + x * length,
                edge_rank: node.edge_rank,
            };
            if best.is_none_or(|b| point.is_better_than(&b)) {
                best = Some(point);
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_newick;
    use crate::partition::LeafPartition;

    fn distinct(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_nearest_leaves_with_ties() {
        // From the inner node, B and C are both at distance 1, A at 2, D at 3
        let tree = parse_newick("((B:1,C:1):1,A:1,D:2);").unwrap();
        let idx = tree.leaf_index();
        let oracle = DistanceOracle::new(&tree);
        let ids: Vec<NodeId> = ["A", "B", "C", "D"].iter().map(|n| idx[*n]).collect();
        let inner = tree.node(idx["B"]).parent.unwrap();

        assert_eq!(nearest_common_leaves(&oracle, inner, &ids, 3), vec![1, 2, 0]);
        // k = 1 cuts at B, but C ties with it
        assert_eq!(nearest_common_leaves(&oracle, inner, &ids, 1), vec![1, 2]);
        assert_eq!(nearest_common_leaves(&oracle, inner, &ids, 10).len(), 4);
    }

    #[test]
    fn test_reserved_edges() {
        let tree = parse_newick("(A:1,(B:1,C:1):1);").unwrap();
        let idx = tree.leaf_index();
        let reserved = reserved_edges(&tree, &distinct(&["C"]));
        let inner = tree.node(idx["B"]).parent.unwrap();
        assert!(reserved[idx["C"]]);
        assert!(reserved[inner]);
        assert!(!reserved[idx["B"]]);
        assert!(!reserved[idx["A"]]);
    }

    /// D hangs next to B in `(A:1,(B:1,D:1):1);`, so it belongs at the top of
    /// B's edge in `(A:1,(B:1,C:1):1);` with a perfect fit.
    #[test]
    fn test_sibling_of_matching_leaf() {
        let target = parse_newick("(A:1,(B:1,C:1):1);").unwrap();
        let source = parse_newick("(A:1,(B:1,D:1):1);").unwrap();
        let part = LeafPartition::new(&target, &source).unwrap();
        let (t_ids, s_ids) = (part.common_ids(&target).unwrap(), part.common_ids(&source).unwrap());
        let (t_oracle, s_oracle) = (DistanceOracle::new(&target), DistanceOracle::new(&source));

        let d = source.find_leaf("D").unwrap();
        let attach = source.node(d).parent.unwrap();
        let ncl = nearest_common_leaves(&s_oracle, d, &s_ids, 2);
        let expected: Vec<f64> = ncl.iter().map(|&i| s_oracle.distance(attach, s_ids[i])).collect();
        let targets: Vec<NodeId> = ncl.iter().map(|&i| t_ids[i]).collect();

        let reserved = reserved_edges(&target, &part.distinct1);
        let point =
            find_insertion_point(&target, &t_oracle, &reserved, &targets, &expected, MIN_TERMINAL_LENGTH)
                .unwrap();

        let b = target.find_leaf("B").unwrap();
        assert_eq!(point.child, b);
        assert_eq!(point.parent, target.node(b).parent.unwrap());
        assert_eq!(point.x, 0.0);
        assert!(point.objective.abs() < 1e-12);
    }

    #[test]
    fn test_interior_optimum() {
        // The point should sit 0.5 below the root on the edge to A
        let target = parse_newick("(A:2,B:2);").unwrap();
        let idx = target.leaf_index();
        let oracle = DistanceOracle::new(&target);
        let reserved = vec![false; target.arena_len()];
        let targets = [idx["A"], idx["B"]];
        let expected = [1.5, 2.5];

        let point =
            find_insertion_point(&target, &oracle, &reserved, &targets, &expected, MIN_TERMINAL_LENGTH)
                .unwrap();
        assert_eq!(point.child, idx["A"]);
        assert!((point.x - 0.25).abs() < 1e-12);
        assert!(point.objective.abs() < 1e-12);
    }

    #[test]
    fn test_terminal_edge_keeps_minimum_length() {
        // The optimum would be at the tip of A; the point stops min_terminal short of it
        let target = parse_newick("(A:1,B:1);").unwrap();
        let idx = target.leaf_index();
        let oracle = DistanceOracle::new(&target);
        let reserved = vec![false; target.arena_len()];
        let targets = [idx["A"], idx["B"]];
        let expected = [0.0, 2.0];

        let point = find_insertion_point(&target, &oracle, &reserved, &targets, &expected, 0.1).unwrap();
        assert_eq!(point.child, idx["A"]);
        assert!((point.x - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_ties_prefer_point_closer_to_root() {
        // Both root edges have the same objective at x = 0; the earlier edge wins
        let mut target = parse_newick("(A:1,B:1);").unwrap();
        target.assign_edge_ranks();
        let idx = target.leaf_index();
        let oracle = DistanceOracle::new(&target);
        let reserved = vec![false; target.arena_len()];
        let targets = [idx["A"], idx["B"]];
        let expected = [1.0, 1.0];

        let point =
            find_insertion_point(&target, &oracle, &reserved, &targets, &expected, MIN_TERMINAL_LENGTH)
                .unwrap();
        assert_eq!(point.child, idx["A"]);
        assert_eq!(point.x, 0.0);
    }

    #[test]
    fn test_optimum_at_internal_node_keeps_polytomy() {
        // The optimum is the inner node itself; the point is the top of B's edge
        let mut target = parse_newick("(A:2,(B:2,C:2):2);").unwrap();
        target.assign_edge_ranks();
        let idx = target.leaf_index();
        let oracle = DistanceOracle::new(&target);
        let reserved = vec![false; target.arena_len()];
        let inner = target.node(idx["B"]).parent.unwrap();

        let point = find_insertion_point(
            &target,
            &oracle,
            &reserved,
            &[idx["B"], idx["C"]],
            &[2.0, 2.0],
            MIN_TERMINAL_LENGTH,
        )
        .unwrap();
        assert_eq!(point.child, idx["B"]);
        assert_eq!(point.parent, inner);
        assert_eq!(point.x, 0.0);
    }

    #[test]
    fn test_optimum_past_blocked_node_stays_on_edge() {
        let mut target = parse_newick("(A:2,(B:2,C:2):2);").unwrap();
        target.assign_edge_ranks();
        let idx = target.leaf_index();
        let oracle = DistanceOracle::new(&target);
        let mut reserved = vec![false; target.arena_len()];
        reserved[idx["B"]] = true;
        reserved[idx["C"]] = true;
        let inner = target.node(idx["B"]).parent.unwrap();

        let point = find_insertion_point(
            &target,
            &oracle,
            &reserved,
            &[idx["B"], idx["C"]],
            &[2.0, 2.0],
            MIN_TERMINAL_LENGTH,
        )
        .unwrap();
        assert_eq!(point.child, inner);
        assert_eq!(point.x, MAX_FRACTION);
    }

    #[test]
    fn test_no_eligible_edge() {
        let target = parse_newick("(A:1,B:1);").unwrap();
        let idx = target.leaf_index();
        let oracle = DistanceOracle::new(&target);
        let reserved = vec![true; target.arena_len()];
        assert!(
            find_insertion_point(&target, &oracle, &reserved, &[idx["A"]], &[1.0], MIN_TERMINAL_LENGTH)
                .is_none()
        );
    }

    #[test]
    fn test_zero_length_edge_offers_parent_end() {
        let target = parse_newick("(A:0,B:1);").unwrap();
        let idx = target.leaf_index();
        let oracle = DistanceOracle::new(&target);
        let mut reserved = vec![false; target.arena_len()];
        reserved[idx["B"]] = true;

        let point =
            find_insertion_point(&target, &oracle, &reserved, &[idx["B"]], &[5.0], MIN_TERMINAL_LENGTH)
                .unwrap();
        assert_eq!(point.child, idx["A"]);
        assert_eq!(point.x, 0.0);
    }
}
