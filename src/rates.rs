//! Branch-length adjustment rates between two trees.
//!
//! Trees estimated independently rarely share a time scale. The global rate
//! rescales a grafted subtree into target units; the per-leaf rate corrects the
//! estimated distance from a grafting point to one particular common leaf.

use itertools::Itertools;

use crate::oracle::DistanceOracle;
use crate::tree::NodeId;

/// Denominators closer to zero than this fall back to a rate of `1.0`.
const RATE_EPSILON: f64 = 1e-15;

#[inline]
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() < RATE_EPSILON { 1.0 } else { numerator / denominator }
}

/// `Σ d_target(a, b) / Σ d_source(a, b)` over all pairs of common leaves.
///
/// `target_ids[i]` and `source_ids[i]` must name the same common leaf.
/// Returns exactly `1.0` when the source sum is (numerically) zero.
pub fn global_rate(
    target: &DistanceOracle,
    target_ids: &[NodeId],
    source: &DistanceOracle,
    source_ids: &[NodeId],
) -> f64 {
    debug_assert_eq!(target_ids.len(), source_ids.len());
    let (num, den) = (0..target_ids.len())
        .tuple_combinations()
        .fold((0.0, 0.0), |(num, den), (i, j)| {
            (
                num + target.distance(target_ids[i], target_ids[j]),
                den + source.distance(source_ids[i], source_ids[j]),
            )
        });
    ratio(num, den)
}

/// Same ratio as [`global_rate`], restricted to distances from common leaf `leaf`
/// (an index into the canonical common-leaf order) to every other common leaf.
pub fn leaf_rate(
    leaf: usize,
    target: &DistanceOracle,
    target_ids: &[NodeId],
    source: &DistanceOracle,
    source_ids: &[NodeId],
) -> f64 {
    let (num, den) = (0..target_ids.len())
        .filter(|&j| j != leaf)
        .fold((0.0, 0.0), |(num, den), j| {
            (
                num + target.distance(target_ids[leaf], target_ids[j]),
                den + source.distance(source_ids[leaf], source_ids[j]),
            )
        });
    ratio(num, den)
}

/// Per-leaf rates for every common leaf, in canonical order.
pub fn leaf_rates(
    target: &DistanceOracle,
    target_ids: &[NodeId],
    source: &DistanceOracle,
    source_ids: &[NodeId],
) -> Vec<f64> {
    (0..target_ids.len())
        .map(|leaf| leaf_rate(leaf, target, target_ids, source, source_ids))
        .collect()
}
