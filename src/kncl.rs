//! k-nearest-common-leaves tree completion.
//!
//! # Overview
//! Given two trees on overlapping leaf sets, [`complete`] returns two trees
//! that both span the union of the leaves:
//!
//! ```text
//! Partition → ExtractSD → ComputeRates → Graft(T2 → T1) → Graft(T1 → T2) → Clean
//! ```
//!
//! For every maximal distinct subtree `S` of the source tree:
//! 1. copy `S` and scale the copy by the global rate
//! 2. pick the `k` common leaves nearest to `S` in the source tree
//! 3. estimate the distance from the grafting point to each of them, corrected
//!    by that leaf's own rate
//! 4. graft the copy at the best fitting point of the target tree and rebuild
//!    the target's oracle
//!
//! The inputs are borrowed and never modified; each run works on its own
//! copies, so independent pairs can be completed in parallel.

use crate::distances::{branch_score_distance, topology_preserved};
use crate::error::KnclError;
use crate::insertion::{
    MIN_TERMINAL_LENGTH, find_insertion_point, nearest_common_leaves, reserved_edges,
};
use crate::mutator::{attach_at_root, insert_subtree_at_point};
use crate::oracle::DistanceOracle;
use crate::partition::LeafPartition;
use crate::rates::{global_rate, leaf_rates};
use crate::subtrees::find_maximal_distinct_subtrees;
use crate::tree::{NodeId, Tree};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt;

/// Parameters of a completion run.
///
/// # Example
/// ```
/// # use kncl_tree_completion::kncl::KnclParams;
/// let params = KnclParams::builder().k(3).min_terminal_length(1e-4).build();
/// assert_eq!(params.k(), Some(3));
/// assert_eq!(KnclParams::default().k(), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct KnclParams {
    k: Option<usize>,
    min_terminal_length: f64,
}

impl Default for KnclParams {
    fn default() -> Self {
        KnclParams {
            k: None,
            min_terminal_length: MIN_TERMINAL_LENGTH,
        }
    }
}

impl KnclParams {
    pub fn builder() -> KnclParamsBuilder {
        KnclParamsBuilder::default()
    }

    /// Requested `k`; `None` selects `⌊(|CL| + 2) / 2⌋`.
    pub fn k(&self) -> Option<usize> {
        self.k
    }

    pub fn min_terminal_length(&self) -> f64 {
        self.min_terminal_length
    }

    /// # Errors
    /// `InvalidMinTerminal` when the minimum terminal length is negative or not finite.
    pub fn validate(&self) -> Result<(), KnclError> {
        let value = self.min_terminal_length;
        if !value.is_finite() || value < 0.0 {
            return Err(KnclError::InvalidMinTerminal { value });
        }
        Ok(())
    }

    /// The `k` used for a pair sharing `common` leaves.
    ///
    /// With exactly two common leaves `k` is forced to 2.
    ///
    /// # Errors
    /// `InvalidK` when the requested `k` lies outside `[2, common]`.
    pub fn resolve_k(&self, common: usize) -> Result<usize, KnclError> {
        if common == 2 {
            return Ok(2);
        }
        let k = self.k.unwrap_or((common + 2) / 2);
        if k < 2 || k > common {
            return Err(KnclError::InvalidK { k, common });
        }
        Ok(k)
    }
}

#[derive(Debug, Default)]
pub struct KnclParamsBuilder {
    k: Option<usize>,
    min_terminal_length: Option<f64>,
}

impl KnclParamsBuilder {
    pub fn k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Shortest terminal branch left behind when grafting onto a leaf edge.
    pub fn min_terminal_length(mut self, length: f64) -> Self {
        self.min_terminal_length = Some(length);
        self
    }

    pub fn build(self) -> KnclParams {
        KnclParams {
            k: self.k,
            min_terminal_length: self.min_terminal_length.unwrap_or(MIN_TERMINAL_LENGTH),
        }
    }
}

/// Which tree receives the grafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Subtrees of the second tree grafted into the first.
    IntoFirst,
    /// Subtrees of the first tree grafted into the second.
    IntoSecond,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::IntoFirst => write!(f, "T2 -> T1"),
            Direction::IntoSecond => write!(f, "T1 -> T2"),
        }
    }
}

/// One grafted subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct GraftRecord {
    pub direction: Direction,
    /// Leaves of the grafted subtree, sorted.
    pub leaves: Vec<String>,
    /// Common leaves the position was fitted against, nearest first.
    pub nearest: Vec<String>,
    /// Fraction along the chosen edge; `0` for a node attachment.
    pub x: f64,
    /// Residual sum of squares at the chosen point; `None` for a root attachment.
    pub objective: Option<f64>,
    /// No eligible edge existed and the subtree went under the root.
    pub at_root: bool,
}

/// What happened during a run.
#[derive(Debug, Default)]
pub struct CompletionReport {
    pub k: usize,
    pub common_leaves: usize,
    /// SD elements of the first and second tree.
    pub subtrees: (usize, usize),
    /// Global rate applied to subtrees grafted into the first tree.
    pub rate_into_first: f64,
    /// Global rate applied to subtrees grafted into the second tree.
    pub rate_into_second: f64,
    pub grafts: Vec<GraftRecord>,
    /// Whether both completed trees still show the input clades on the common leaves.
    pub backbone_preserved: bool,
    /// Non-fatal conditions (`DegenerateInsertion`, `NegativeLength`).
    pub warnings: Vec<KnclError>,
}

impl CompletionReport {
    /// Number of subtrees that fell back to a root attachment.
    pub fn degraded(&self) -> usize {
        self.grafts.iter().filter(|g| g.at_root).count()
    }
}

/// The completed pair.
#[derive(Debug)]
pub struct Completion {
    pub t1: Tree,
    pub t2: Tree,
    pub report: CompletionReport,
}

/// A completed pair with its branch score distances.
#[derive(Debug)]
pub struct PairCompletion {
    pub completion: Completion,
    /// BSD over the completed trees and the union leaf set.
    pub bsd_plus: f64,
    /// BSD over the input trees and the common leaves.
    pub bsd_minus: f64,
}

/// Everything one graft pass needs about its source side.
struct GraftPass<'a> {
    direction: Direction,
    source: &'a Tree,
    source_oracle: &'a DistanceOracle,
    source_ids: &'a [NodeId],
    subtrees: &'a [NodeId],
    rate: f64,
    leaf_rates: &'a [f64],
    /// Distinct leaves of the target; edges leading to them are off limits.
    target_distinct: &'a BTreeSet<String>,
}

/// Complete `t1` and `t2` so that both span the union of their leaves.
///
/// # Errors
/// - `InsufficientOverlap` if fewer than two leaves are shared
/// - `InvalidK` if the requested `k` lies outside `[2, |CL|]`
/// - `InvalidMinTerminal` if the minimum terminal length is negative or not finite
/// - `LeafSetMismatch` if the output fails the final leaf-set validation
pub fn complete(t1: &Tree, t2: &Tree, params: &KnclParams) -> Result<Completion, KnclError> {
    params.validate()?;
    let partition = LeafPartition::new(t1, t2)?;
    let k = params.resolve_k(partition.len())?;

    // SD flags are marked on private copies of the sources
    let mut source1 = t1.clone();
    let mut source2 = t2.clone();
    let sd1 = find_maximal_distinct_subtrees(&mut source1, &partition.distinct1);
    let sd2 = find_maximal_distinct_subtrees(&mut source2, &partition.distinct2);

    let oracle1 = DistanceOracle::new(&source1);
    let oracle2 = DistanceOracle::new(&source2);
    let ids1 = partition.common_ids(&source1)?;
    let ids2 = partition.common_ids(&source2)?;

    let rate_into_first = global_rate(&oracle1, &ids1, &oracle2, &ids2);
    let rate_into_second = global_rate(&oracle2, &ids2, &oracle1, &ids1);
    let leaf_rates_into_first = leaf_rates(&oracle1, &ids1, &oracle2, &ids2);
    let leaf_rates_into_second = leaf_rates(&oracle2, &ids2, &oracle1, &ids1);

    let mut report = CompletionReport {
        k,
        common_leaves: partition.len(),
        subtrees: (sd1.len(), sd2.len()),
        rate_into_first,
        rate_into_second,
        ..Default::default()
    };

    let mut out1 = t1.clone();
    out1.assign_edge_ranks();
    graft_subtrees(
        &mut out1,
        &partition,
        &GraftPass {
            direction: Direction::IntoFirst,
            source: &source2,
            source_oracle: &oracle2,
            source_ids: &ids2,
            subtrees: &sd2,
            rate: rate_into_first,
            leaf_rates: &leaf_rates_into_first,
            target_distinct: &partition.distinct1,
        },
        k,
        params.min_terminal_length,
        &mut report,
    )?;

    let mut out2 = t2.clone();
    out2.assign_edge_ranks();
    graft_subtrees(
        &mut out2,
        &partition,
        &GraftPass {
            direction: Direction::IntoSecond,
            source: &source1,
            source_oracle: &oracle1,
            source_ids: &ids1,
            subtrees: &sd1,
            rate: rate_into_second,
            leaf_rates: &leaf_rates_into_second,
            target_distinct: &partition.distinct2,
        },
        k,
        params.min_terminal_length,
        &mut report,
    )?;

    for tree in [&mut out1, &mut out2] {
        tree.clear_internal_names();
        tree.clear_run_state();
    }

    let union = partition.union();
    if out1.leaf_names() != union || out2.leaf_names() != union {
        return Err(KnclError::LeafSetMismatch);
    }
    report.backbone_preserved = topology_preserved(t1, &out1, &partition.common)?
        && topology_preserved(t2, &out2, &partition.common)?;

    Ok(Completion {
        t1: out1,
        t2: out2,
        report,
    })
}

/// [`complete`] followed by BSD(+) on the completed trees and BSD(−) on the inputs.
pub fn complete_pair(t1: &Tree, t2: &Tree, params: &KnclParams) -> Result<PairCompletion, KnclError> {
    let completion = complete(t1, t2, params)?;

    let union: Vec<String> = completion.t1.leaf_names().into_iter().collect();
    let common: Vec<String> = t1.leaf_names().intersection(&t2.leaf_names()).cloned().collect();
    let bsd_plus = branch_score_distance(&completion.t1, &completion.t2, &union)?;
    let bsd_minus = branch_score_distance(t1, t2, &common)?;

    Ok(PairCompletion {
        completion,
        bsd_plus,
        bsd_minus,
    })
}

/// Complete every unordered pair `(i, j)`, `i < j`, of `trees` in parallel.
///
/// Results come back in pair order (0-based indices); a failed pair does not
/// stop the others.
pub fn complete_all_pairs(
    trees: &[Tree],
    params: &KnclParams,
) -> Vec<(usize, usize, Result<PairCompletion, KnclError>)> {
    let n = trees.len();
    (0..n)
        .into_par_iter()
        .flat_map_iter(|i| (i + 1..n).map(move |j| (i, j)))
        .map(|(i, j)| (i, j, complete_pair(&trees[i], &trees[j], params)))
        .collect()
}

fn graft_subtrees(
    target: &mut Tree,
    partition: &LeafPartition,
    pass: &GraftPass<'_>,
    k: usize,
    min_terminal: f64,
    report: &mut CompletionReport,
) -> Result<(), KnclError> {
    // Common leaves keep their ids while the target grows
    let target_ids = partition.common_ids(target)?;
    let mut target_oracle = DistanceOracle::new(target);

    for &root in pass.subtrees {
        let mut copy = pass.source.extract_subtree(root);
        copy.scale(pass.rate);
        let leaves = pass.source.subtree_leaf_names(root);

        let ncl = nearest_common_leaves(pass.source_oracle, root, pass.source_ids, k);
        let attach = pass.source.node(root).parent.unwrap_or(root);
        let expected: Vec<f64> = ncl
            .iter()
            .map(|&i| pass.source_oracle.distance(attach, pass.source_ids[i]) * pass.leaf_rates[i])
            .collect();
        let targets: Vec<NodeId> = ncl.iter().map(|&i| target_ids[i]).collect();
        let nearest = ncl.iter().map(|&i| partition.common[i].clone()).collect();

        let reserved = reserved_edges(target, pass.target_distinct);
        let record = match find_insertion_point(
            target,
            &target_oracle,
            &reserved,
            &targets,
            &expected,
            min_terminal,
        ) {
            Some(point) => {
                insert_subtree_at_point(
                    target,
                    point.parent,
                    point.child,
                    point.x,
                    &copy,
                    &mut report.warnings,
                )?;
                GraftRecord {
                    direction: pass.direction,
                    leaves,
                    nearest,
                    x: point.x,
                    objective: Some(point.objective),
                    at_root: false,
                }
            }
            None => {
                attach_at_root(target, &copy);
                report.warnings.push(KnclError::DegenerateInsertion {
                    leaves: leaves.clone(),
                });
                GraftRecord {
                    direction: pass.direction,
                    leaves,
                    nearest,
                    x: 0.0,
                    objective: None,
                    at_root: true,
                }
            }
        };
        report.grafts.push(record);

        target_oracle = DistanceOracle::new(target);
    }
    Ok(())
}
