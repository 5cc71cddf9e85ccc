//! Arena-backed rooted tree with weighted edges.
//!
//! # Overview
//! Nodes live in a `Vec` and refer to each other by [`NodeId`] (their index in
//! the arena). Structural edits (edge splits, grafts, leaf removal) only rewire
//! `parent`/`children` indices, so ids stay stable for the lifetime of a tree.
//! Nodes that get spliced out stay in the arena but are no longer reachable
//! from the root; every traversal starts at the root and never sees them.
//!
//! All traversals use an explicit stack so trees with thousands of taxa do not
//! hit recursion limits.

use std::collections::{BTreeSet, HashMap};

use crate::error::KnclError;

/// Index of a node inside its [`Tree`] arena.
pub type NodeId = usize;

/// A node of a [`Tree`].
///
/// `all_distinct`, `in_inserted` and `edge_rank` are run-scoped state used while
/// completing a tree; they are reset by [`Tree::clear_run_state`].
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Taxon name. Only leaves carry names in finished trees.
    pub name: Option<String>,
    /// Length of the edge to the parent (0 for the root).
    pub dist: f64,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Every leaf below this node is a distinct leaf.
    pub all_distinct: bool,
    /// Node belongs to a subtree grafted during the current run.
    pub in_inserted: bool,
    /// Fixed rank of the edge above this node, used for deterministic tie-breaks.
    pub edge_rank: usize,
}

impl Node {
    fn new(name: Option<String>, dist: f64, parent: Option<NodeId>) -> Self {
        Node {
            name,
            dist,
            parent,
            children: Vec::new(),
            all_distinct: false,
            in_inserted: false,
            edge_rank: 0,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// An owning rooted tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Creates a tree made of a single unnamed root.
    pub fn new() -> Self {
        Tree {
            nodes: vec![Node::new(None, 0.0, None)],
            root: 0,
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of slots in the arena, including nodes no longer attached to the root.
    #[inline]
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    #[inline]
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id].is_leaf()
    }

    /// Appends a new child under `parent` and returns its id.
    pub fn add_child(&mut self, parent: NodeId, name: Option<String>, dist: f64) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node::new(name, dist, Some(parent)));
        self.nodes[parent].children.push(id);
        id
    }

    /// Allocates a node that is not yet attached anywhere.
    pub(crate) fn alloc_detached(&mut self, name: Option<String>, dist: f64) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node::new(name, dist, None));
        id
    }

    /// Makes a previously detached node the new root.
    pub(crate) fn set_root(&mut self, id: NodeId) {
        self.nodes[id].parent = None;
        self.nodes[id].dist = 0.0;
        self.root = id;
    }

    /// Nodes reachable from the root, parents before children, children in stored order.
    pub fn preorder(&self) -> Vec<NodeId> {
        self.preorder_from(self.root)
    }

    /// Preorder traversal of the subtree rooted at `start`.
    pub fn preorder_from(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Nodes reachable from the root, children before parents, left to right.
    pub fn postorder(&self) -> Vec<NodeId> {
        // Visiting children right-to-left and reversing yields a left-to-right postorder
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter());
        }
        order.reverse();
        order
    }

    /// Leaf ids in preorder.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.subtree_leaves(self.root)
    }

    /// Leaf ids below `id` (or `id` itself if it is a leaf), in preorder.
    pub fn subtree_leaves(&self, id: NodeId) -> Vec<NodeId> {
        self.preorder_from(id)
            .into_iter()
            .filter(|&n| self.nodes[n].is_leaf())
            .collect()
    }

    /// Leaf names, sorted.
    pub fn leaf_names(&self) -> BTreeSet<String> {
        self.leaves()
            .into_iter()
            .filter_map(|id| self.nodes[id].name.clone())
            .collect()
    }

    /// Names of the leaves below `id`, sorted.
    pub fn subtree_leaf_names(&self, id: NodeId) -> Vec<String> {
        let mut names: Vec<String> = self
            .subtree_leaves(id)
            .into_iter()
            .filter_map(|n| self.nodes[n].name.clone())
            .collect();
        names.sort();
        names
    }

    /// Map from leaf name to leaf id.
    pub fn leaf_index(&self) -> HashMap<String, NodeId> {
        self.leaves()
            .into_iter()
            .filter_map(|id| self.nodes[id].name.clone().map(|name| (name, id)))
            .collect()
    }

    /// Finds a leaf by name.
    pub fn find_leaf(&self, name: &str) -> Option<NodeId> {
        self.leaves()
            .into_iter()
            .find(|&id| self.nodes[id].name.as_deref() == Some(name))
    }

    /// Checks the invariants expected from parsed input: every leaf named, names unique.
    pub fn validate(&self) -> Result<(), KnclError> {
        let mut seen = BTreeSet::new();
        for id in self.leaves() {
            match &self.nodes[id].name {
                None => return Err(KnclError::InvalidTree("unnamed leaf".to_string())),
                Some(name) if name.is_empty() => {
                    return Err(KnclError::InvalidTree("unnamed leaf".to_string()));
                }
                Some(name) => {
                    if !seen.insert(name.clone()) {
                        return Err(KnclError::InvalidTree(format!(
                            "duplicate leaf name '{name}'"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Copies the subtree rooted at `id` into a new tree.
    ///
    /// The copy keeps the length of the edge above `id` as its root length, so a
    /// grafted copy reattaches with its original connection length.
    pub fn extract_subtree(&self, id: NodeId) -> Tree {
        let mut copy = Tree {
            nodes: vec![Node::new(self.nodes[id].name.clone(), self.nodes[id].dist, None)],
            root: 0,
        };
        let mut stack = vec![(id, 0)];
        while let Some((src, dst)) = stack.pop() {
            for &child in &self.nodes[src].children {
                let node = &self.nodes[child];
                let new_id = copy.add_child(dst, node.name.clone(), node.dist);
                stack.push((child, new_id));
            }
        }
        copy
    }

    /// Copies all of `other` below `parent`; returns the id of the copied root.
    ///
    /// The copied root keeps `other`'s root length as its edge length and every
    /// copied node is flagged `in_inserted`.
    pub fn graft(&mut self, parent: NodeId, other: &Tree) -> NodeId {
        let top = {
            let root = other.node(other.root);
            self.add_child(parent, root.name.clone(), root.dist)
        };
        self.nodes[top].in_inserted = true;
        let mut stack = vec![(other.root, top)];
        while let Some((src, dst)) = stack.pop() {
            for &child in &other.nodes[src].children {
                let node = &other.nodes[child];
                let new_id = self.add_child(dst, node.name.clone(), node.dist);
                self.nodes[new_id].in_inserted = true;
                stack.push((child, new_id));
            }
        }
        top
    }

    /// Multiplies every branch length, the root's included, by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for id in self.preorder() {
            self.nodes[id].dist *= factor;
        }
    }

    /// Removes the names of all internal nodes.
    pub fn clear_internal_names(&mut self) {
        for id in self.preorder() {
            if !self.nodes[id].is_leaf() {
                self.nodes[id].name = None;
            }
        }
    }

    /// Resets the per-run flags on every node.
    pub fn clear_run_state(&mut self) {
        for node in self.nodes.iter_mut() {
            node.all_distinct = false;
            node.in_inserted = false;
            node.edge_rank = 0;
        }
    }

    /// Gives every reachable edge its preorder position as a fixed rank.
    pub fn assign_edge_ranks(&mut self) {
        for (rank, id) in self.preorder().into_iter().enumerate() {
            self.nodes[id].edge_rank = rank;
        }
    }

    /// Position of `child` inside its parent's children list.
    pub(crate) fn child_position(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.nodes[parent].children.iter().position(|&c| c == child)
    }
}
