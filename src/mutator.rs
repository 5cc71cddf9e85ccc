//! Structural edits on a [`Tree`].
//!
//! Every edit rewires arena indices in place. Callers holding a
//! [`DistanceOracle`](crate::oracle::DistanceOracle) for the edited tree must
//! rebuild it afterwards.

use crate::error::KnclError;
use crate::tree::{NodeId, Tree};

/// Points closer than this to the parent end of an edge attach to the parent itself.
pub const ATTACH_EPSILON: f64 = 1e-15;

/// Split lengths below `-NEGATIVE_TOLERANCE` are reported before being clamped.
pub const NEGATIVE_TOLERANCE: f64 = 1e-9;

/// Tolerance used when matching path distances during temporary-leaf insertion.
const PATH_TOLERANCE: f64 = 1e-10;

/// Clamp a computed branch length to be non-negative.
///
/// Values below `-NEGATIVE_TOLERANCE` are recorded as [`KnclError::NegativeLength`]
/// warnings; smaller round-off is clamped silently.
pub fn clamp_length(value: f64, warnings: &mut Vec<KnclError>) -> f64 {
    if value < -NEGATIVE_TOLERANCE {
        warnings.push(KnclError::NegativeLength { value });
    }
    value.max(0.0)
}

/// Split the edge above `child` at fraction `x` (measured from the parent).
///
/// A new internal node `M` takes `child`'s place under the parent with length
/// `x * len`; `child` hangs below `M` with `(1 - x) * len`. `M` inherits the
/// edge rank of `child`. Returns `M`.
pub fn split_edge(
    tree: &mut Tree,
    child: NodeId,
    x: f64,
    warnings: &mut Vec<KnclError>,
) -> Result<NodeId, KnclError> {
    let parent = tree
        .node(child)
        .parent
        .ok_or_else(|| KnclError::InvalidTree("cannot split above the root".to_string()))?;
    let pos = tree
        .child_position(parent, child)
        .ok_or_else(|| KnclError::InvalidTree(format!("node {child} is not a child of {parent}")))?;

    let length = tree.node(child).dist;
    let upper = clamp_length(x * length, warnings);
    let lower = clamp_length((1.0 - x) * length, warnings);
    let rank = tree.node(child).edge_rank;

    let mid = tree.alloc_detached(None, upper);
    {
        let m = tree.node_mut(mid);
        m.parent = Some(parent);
        m.children.push(child);
        m.edge_rank = rank;
    }
    tree.node_mut(parent).children[pos] = mid;
    let c = tree.node_mut(child);
    c.parent = Some(mid);
    c.dist = lower;

    Ok(mid)
}

/// Graft a copy of `subtree` at fraction `x` along the edge `(parent, child)`.
///
/// For `x < ATTACH_EPSILON` the copy becomes an extra child of `parent` and no
/// edge is split. Returns the id of the grafted root.
pub fn insert_subtree_at_point(
    tree: &mut Tree,
    parent: NodeId,
    child: NodeId,
    x: f64,
    subtree: &Tree,
    warnings: &mut Vec<KnclError>,
) -> Result<NodeId, KnclError> {
    if tree.node(child).parent != Some(parent) {
        return Err(KnclError::InvalidTree(format!(
            "({parent}, {child}) is not an edge of the tree"
        )));
    }
    if x < ATTACH_EPSILON {
        return Ok(tree.graft(parent, subtree));
    }
    let mid = split_edge(tree, child, x, warnings)?;
    Ok(tree.graft(mid, subtree))
}

/// Graft a copy of `subtree` as an extra child of the root.
pub fn attach_at_root(tree: &mut Tree, subtree: &Tree) -> NodeId {
    let root = tree.root();
    tree.graft(root, subtree)
}

enum TempPoint {
    /// Exactly on an internal node.
    AtNode(NodeId),
    /// Inside the edge above `child`, at fraction `x` from its parent.
    OnEdge { child: NodeId, x: f64 },
}

/// Insert temporary leaves at every point lying `distance` away from leaf `target`.
///
/// The walk leaves `target` through its terminal edge and spreads over ancestor
/// and sibling edges, accumulating branch length until `distance` is reached on
/// each path; the edge where that happens is split and a leaf of length
/// `leaf_length` named `{base_name}{i}` (1-based) is hung from the split point.
/// Paths that end before reaching `distance` receive no leaf.
///
/// Returns the ids of the inserted leaves in walk order.
pub fn insert_temporary_leaves(
    tree: &mut Tree,
    target: NodeId,
    base_name: &str,
    leaf_length: f64,
    distance: f64,
    warnings: &mut Vec<KnclError>,
) -> Result<Vec<NodeId>, KnclError> {
    if !tree.is_leaf(target) || tree.node(target).parent.is_none() {
        return Err(KnclError::InvalidTree(
            "temporary leaves must start from a non-root leaf".to_string(),
        ));
    }

    let mut points = Vec::new();
    if distance <= PATH_TOLERANCE {
        points.push(TempPoint::OnEdge { child: target, x: 1.0 });
    } else {
        // (node, node we arrived from, accumulated distance)
        let mut stack: Vec<(NodeId, Option<NodeId>, f64)> = vec![(target, None, 0.0)];
        while let Some((id, from, acc)) = stack.pop() {
            let node = tree.node(id);
            let downward = node.children.iter().map(|&c| (c, tree.node(c).dist, true));
            let upward = node.parent.map(|p| (p, node.dist, false));

            for (next, length, down) in downward.chain(upward) {
                if Some(next) == from {
                    continue;
                }
                let reach = acc + length;
                if reach < distance - PATH_TOLERANCE {
                    stack.push((next, Some(id), reach));
                } else if (reach - distance).abs() <= PATH_TOLERANCE && !tree.is_leaf(next) {
                    points.push(TempPoint::AtNode(next));
                } else {
                    let fraction = ((distance - acc) / length).clamp(0.0, 1.0);
                    points.push(if down {
                        TempPoint::OnEdge { child: next, x: fraction }
                    } else {
                        TempPoint::OnEdge { child: id, x: 1.0 - fraction }
                    });
                }
            }
        }
    }

    let mut inserted = Vec::with_capacity(points.len());
    for (i, point) in points.into_iter().enumerate() {
        let anchor = match point {
            TempPoint::AtNode(id) => id,
            TempPoint::OnEdge { child, x } => split_edge(tree, child, x, warnings)?,
        };
        let name = format!("{base_name}{}", i + 1);
        inserted.push(tree.add_child(anchor, Some(name), leaf_length));
    }
    Ok(inserted)
}

/// Remove leaf `leaf`; if its former parent is left with a single child, splice
/// the parent out and add its branch length to the surviving child.
pub fn remove_leaf(tree: &mut Tree, leaf: NodeId) -> Result<(), KnclError> {
    if !tree.is_leaf(leaf) {
        return Err(KnclError::InvalidTree(format!("node {leaf} is not a leaf")));
    }
    let parent = tree
        .node(leaf)
        .parent
        .ok_or_else(|| KnclError::InvalidTree("cannot remove the root".to_string()))?;
    let pos = tree
        .child_position(parent, leaf)
        .ok_or_else(|| KnclError::InvalidTree(format!("node {leaf} is not a child of {parent}")))?;

    tree.node_mut(parent).children.remove(pos);
    tree.node_mut(leaf).parent = None;

    if tree.node(parent).children.len() == 1 {
        collapse_unary(tree, parent)?;
    }
    Ok(())
}

/// Remove several temporary leaves, collapsing single-child nodes as they appear.
pub fn remove_temporary_leaves(tree: &mut Tree, leaves: &[NodeId]) -> Result<(), KnclError> {
    leaves.iter().try_for_each(|&leaf| remove_leaf(tree, leaf))
}

fn collapse_unary(tree: &mut Tree, node: NodeId) -> Result<(), KnclError> {
    let child = tree.node(node).children[0];
    match tree.node(node).parent {
        Some(grandparent) => {
            let pos = tree.child_position(grandparent, node).ok_or_else(|| {
                KnclError::InvalidTree(format!("node {node} is not a child of {grandparent}"))
            })?;
            let extra = tree.node(node).dist;
            tree.node_mut(grandparent).children[pos] = child;
            let c = tree.node_mut(child);
            c.parent = Some(grandparent);
            c.dist += extra;
        }
        None => tree.set_root(child),
    }
    let n = tree.node_mut(node);
    n.children.clear();
    n.parent = None;
    Ok(())
}
