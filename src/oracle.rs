//! Constant-time path distances on a static tree.
//!
//! # Overview
//! A [`DistanceOracle`] is a read-only snapshot of one [`Tree`]:
//! - `dist_to_root`: summed branch length from the root to every node
//! - an Euler tour recording `(node, depth)` on entry and after each child returns
//! - a sparse table over the tour depths answering range-minimum (LCA) queries in O(1)
//!
//! ```text
//! d(a, b) = root(a) + root(b) - 2 * root(lca(a, b))
//! ```
//!
//! Construction is O(n log n). Any structural change to the source tree
//! invalidates the snapshot: build a new oracle instead of patching the old one.
//! The pair cache belongs to the oracle and is dropped with it.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::tree::{NodeId, Tree};

/// Upper bound on cached pair distances; the cache is flushed when it fills up.
const PAIR_CACHE_CAPACITY: usize = 1 << 16;

const UNVISITED: usize = usize::MAX;

#[derive(Debug)]
pub struct DistanceOracle {
    dist_to_root: Vec<f64>,
    euler: Vec<NodeId>,
    depth: Vec<usize>,
    /// First and last position of each node in the Euler tour (`UNVISITED` if unreachable).
    first: Vec<usize>,
    last: Vec<usize>,
    /// `sparse[j][i]` = tour position with minimum depth in `[i, i + 2^j)`.
    sparse: Vec<Vec<usize>>,
    cache: RefCell<HashMap<(NodeId, NodeId), f64>>,
}

impl DistanceOracle {
    /// Build the oracle for the current shape of `tree`.
    pub fn new(tree: &Tree) -> Self {
        let n = tree.arena_len();
        let root = tree.root();

        // (a) distances to the root, top-down
        let mut dist_to_root = vec![0.0; n];
        for id in tree.preorder() {
            if let Some(parent) = tree.node(id).parent {
                dist_to_root[id] = dist_to_root[parent] + tree.node(id).dist;
            }
        }

        // (b) Euler tour; the stack holds (node, next child) and its height is the depth
        let mut euler = Vec::with_capacity(2 * n);
        let mut depth = Vec::with_capacity(2 * n);
        let mut first = vec![UNVISITED; n];
        let mut last = vec![UNVISITED; n];
        let mut stack = vec![(root, 0usize)];
        while let Some((id, next)) = stack.pop() {
            if next == 0 {
                first[id] = euler.len();
            }
            euler.push(id);
            depth.push(stack.len());
            last[id] = euler.len() - 1;

            if let Some(&child) = tree.node(id).children.get(next) {
                stack.push((id, next + 1));
                stack.push((child, 0));
            }
        }

        // (c) sparse table over the depth array
        let sparse = Self::build_sparse_table(&depth);

        DistanceOracle {
            dist_to_root,
            euler,
            depth,
            first,
            last,
            sparse,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn build_sparse_table(depth: &[usize]) -> Vec<Vec<usize>> {
        let m = depth.len();
        let mut sparse = vec![(0..m).collect::<Vec<_>>()];
        let mut j = 1;
        while (1usize << j) <= m {
            let half = 1usize << (j - 1);
            let prev = &sparse[j - 1];
            let row = (0..=m - (1 << j))
                .map(|i| {
                    let (a, b) = (prev[i], prev[i + half]);
                    if depth[b] < depth[a] { b } else { a }
                })
                .collect();
            sparse.push(row);
            j += 1;
        }
        sparse
    }

    /// Summed branch length from the root to `id`.
    #[inline]
    pub fn dist_to_root(&self, id: NodeId) -> f64 {
        self.dist_to_root[id]
    }

    /// Lowest common ancestor of `a` and `b`.
    pub fn lca(&self, a: NodeId, b: NodeId) -> NodeId {
        debug_assert!(self.first[a] != UNVISITED && self.first[b] != UNVISITED);
        let (mut l, mut r) = (self.first[a], self.first[b]);
        if l > r {
            std::mem::swap(&mut l, &mut r);
        }
        let span = r - l + 1;
        let j = (usize::BITS - 1 - span.leading_zeros()) as usize;
        let x = self.sparse[j][l];
        let y = self.sparse[j][r + 1 - (1 << j)];
        if self.depth[y] < self.depth[x] { self.euler[y] } else { self.euler[x] }
    }

    /// Path length between `a` and `b`.
    pub fn distance(&self, a: NodeId, b: NodeId) -> f64 {
        if a == b {
            return 0.0;
        }
        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(&d) = self.cache.borrow().get(&key) {
            return d;
        }

        let lca = self.lca(a, b);
        let d = self.dist_to_root[a] + self.dist_to_root[b] - 2.0 * self.dist_to_root[lca];
        let d = d.max(0.0);

        let mut cache = self.cache.borrow_mut();
        if cache.len() >= PAIR_CACHE_CAPACITY {
            cache.clear();
        }
        cache.insert(key, d);
        d
    }

    /// Whether `ancestor` lies on the path from the root to `node` (inclusive).
    #[inline]
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.first[ancestor] <= self.first[node] && self.last[node] <= self.last[ancestor]
    }

    /// Number of entries in the Euler tour (`2n - 1` for `n` reachable nodes).
    pub fn tour_len(&self) -> usize {
        self.euler.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_newick;
    use itertools::Itertools;

    /// Walk up from both nodes; reference implementation for the tests.
    fn naive_distance(tree: &Tree, a: NodeId, b: NodeId) -> f64 {
        let path = |mut id: NodeId| {
            let mut acc = vec![(id, 0.0)];
            let mut total = 0.0;
            while let Some(p) = tree.node(id).parent {
                total += tree.node(id).dist;
                acc.push((p, total));
                id = p;
            }
            acc
        };
        let pa = path(a);
        let pb = path(b);
        for &(na, da) in &pa {
            if let Some(&(_, db)) = pb.iter().find(|(nb, _)| *nb == na) {
                return da + db;
            }
        }
        unreachable!("nodes share the root")
    }

    #[test]
    fn test_distances_match_naive_walk() {
        let tree = parse_newick(
            "(((L4:1.1058,L6:0.7225):0.6678,(L10:0.5582,(L1:0.8540,L5:0.6621):1.1539):1.1164):1.8280,(L3:0.6057,L8:1.0215):0.9939,(L7:1.1467,(X2:1.0002,X9:1.3349):1.5883):0.6401);",
        )
        .unwrap();
        let oracle = DistanceOracle::new(&tree);
        for (a, b) in tree.preorder().into_iter().tuple_combinations() {
            let expected = naive_distance(&tree, a, b);
            assert!((oracle.distance(a, b) - expected).abs() < 1e-10);
            // cached path
            assert!((oracle.distance(b, a) - expected).abs() < 1e-10);
        }
    }

    #[test]
    fn test_lca_and_ancestry() {
        let tree = parse_newick("(A:1,(B:1,C:1):1);").unwrap();
        let idx = tree.leaf_index();
        let oracle = DistanceOracle::new(&tree);
        let inner = tree.node(idx["B"]).parent.unwrap();

        assert_eq!(oracle.lca(idx["B"], idx["C"]), inner);
        assert_eq!(oracle.lca(idx["A"], idx["C"]), tree.root());
        assert_eq!(oracle.lca(inner, idx["B"]), inner);
        assert!(oracle.is_ancestor(inner, idx["C"]));
        assert!(!oracle.is_ancestor(inner, idx["A"]));
        assert!(oracle.is_ancestor(tree.root(), inner));
        assert_eq!(oracle.distance(idx["A"], idx["B"]), 3.0);
        assert_eq!(oracle.dist_to_root(idx["C"]), 2.0);
        assert_eq!(oracle.tour_len(), 2 * 5 - 1);
    }

    #[test]
    fn test_single_node_tree() {
        let tree = Tree::new();
        let oracle = DistanceOracle::new(&tree);
        assert_eq!(oracle.distance(0, 0), 0.0);
        assert_eq!(oracle.lca(0, 0), 0);
    }
}
