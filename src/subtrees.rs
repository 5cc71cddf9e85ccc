//! Maximal distinct-leaf subtrees (SD).
//!
//! A node is *all-distinct* when every leaf below it is a distinct leaf. The SD
//! elements of a tree are the all-distinct nodes whose parent is not
//! all-distinct; their leaf sets partition the tree's distinct leaves.

use std::collections::BTreeSet;

use crate::tree::{NodeId, Tree};

/// Mark `all_distinct` on every node in a single postorder pass and return the
/// roots of the maximal all-distinct subtrees, in postorder.
pub fn find_maximal_distinct_subtrees(tree: &mut Tree, distinct: &BTreeSet<String>) -> Vec<NodeId> {
    let order = tree.postorder();

    for &id in &order {
        let flag = {
            let node = tree.node(id);
            if node.is_leaf() {
                node.name.as_ref().is_some_and(|name| distinct.contains(name))
            } else {
                node.children.iter().all(|&c| tree.node(c).all_distinct)
            }
        };
        tree.node_mut(id).all_distinct = flag;
    }

    order
        .into_iter()
        .filter(|&id| {
            let node = tree.node(id);
            node.all_distinct && node.parent.is_none_or(|p| !tree.node(p).all_distinct)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_newick;

    fn sd_leaf_sets(newick: &str, distinct: &[&str]) -> Vec<Vec<String>> {
        let mut tree = parse_newick(newick).unwrap();
        let distinct: BTreeSet<String> = distinct.iter().map(|s| s.to_string()).collect();
        let roots = find_maximal_distinct_subtrees(&mut tree, &distinct);
        roots.iter().map(|&r| tree.subtree_leaf_names(r)).collect()
    }

    #[test]
    fn test_single_leaves() {
        let sets = sd_leaf_sets("(A:1,(B:1,C:1):1);", &["C"]);
        assert_eq!(sets, vec![vec!["C".to_string()]]);
    }

    #[test]
    fn test_whole_clade_is_one_element() {
        let sets = sd_leaf_sets("((A:1,B:1):1,((C:1,D:1):1,E:1):1);", &["C", "D", "E"]);
        assert_eq!(sets, vec![vec!["C".to_string(), "D".into(), "E".into()]]);
    }

    /// Distinct leaves {L1, L3, L4, L5, L7, L8, L10}:
    ///
    /// ```text
    /// ((L4,L6),(L10,(L1,L5))), (L3,L8), (L7,(2,9))
    /// ```
    /// gives SD = {L4}, {L10,L1,L5}, {L3,L8}, {L7}.
    #[test]
    fn test_partition_of_distinct_leaves() {
        let newick = "(((L4:1.1058,L6:0.7225):0.6678,(L10:0.5582,(L1:0.8540,L5:0.6621):1.1539):1.1164):1.8280,(L3:0.6057,L8:1.0215):0.9939,(L7:1.1467,(2:1.0002,9:1.3349):1.5883):0.6401);";
        let distinct = ["L1", "L3", "L4", "L5", "L7", "L8", "L10"];
        let sets = sd_leaf_sets(newick, &distinct);

        assert_eq!(sets.len(), 4);
        let mut all: Vec<String> = sets.iter().flatten().cloned().collect();
        let total = all.len();
        all.sort();
        all.dedup();
        // Disjoint and covering
        assert_eq!(all.len(), total);
        let mut expected: Vec<String> = distinct.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(all, expected);
        assert!(sets.contains(&vec!["L1".to_string(), "L10".into(), "L5".into()]));
    }

    #[test]
    fn test_no_distinct_leaves() {
        assert!(sd_leaf_sets("(A:1,B:1);", &[]).is_empty());
    }
}
