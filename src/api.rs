//! Python binding layer for tree completion.
//!
//! Provides Python functions to complete pairs of Newick trees and to compute
//! their branch score distances.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::error::KnclError;
use crate::io::{parse_newick, read_newick_file, to_newick};
use crate::kncl::{KnclParams, complete, complete_all_pairs, complete_pair};

fn to_py_err(err: KnclError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn params(k: Option<usize>) -> KnclParams {
    match k {
        Some(k) => KnclParams::builder().k(k).build(),
        None => KnclParams::default(),
    }
}

/// Complete two trees so that both span the union of their leaves.
///
/// Args:
///     newick1: First tree in Newick format
///     newick2: Second tree in Newick format
///     k: Number of nearest common leaves (default: (|CL| + 2) // 2)
///
/// Returns:
///     A tuple (completed_tree_1, completed_tree_2) of Newick strings
///
/// Raises:
///     ValueError: If a tree cannot be parsed, fewer than 2 leaves are shared, or k is out of range
#[pyfunction]
#[pyo3(signature = (newick1, newick2, k=None))]
fn complete_trees(newick1: &str, newick2: &str, k: Option<usize>) -> PyResult<(String, String)> {
    let t1 = parse_newick(newick1).map_err(to_py_err)?;
    let t2 = parse_newick(newick2).map_err(to_py_err)?;
    let completion = complete(&t1, &t2, &params(k)).map_err(to_py_err)?;
    Ok((to_newick(&completion.t1), to_newick(&completion.t2)))
}

/// Branch score distances of a tree pair.
///
/// Args:
///     newick1: First tree in Newick format
///     newick2: Second tree in Newick format
///     k: Number of nearest common leaves (default: (|CL| + 2) // 2)
///
/// Returns:
///     A tuple (bsd_plus, bsd_minus): BSD of the completed trees over all leaves,
///     and BSD of the input trees over the common leaves
///
/// Raises:
///     ValueError: If a tree cannot be parsed, fewer than 2 leaves are shared, or k is out of range
#[pyfunction]
#[pyo3(signature = (newick1, newick2, k=None))]
fn branch_score_distances(newick1: &str, newick2: &str, k: Option<usize>) -> PyResult<(f64, f64)> {
    let t1 = parse_newick(newick1).map_err(to_py_err)?;
    let t2 = parse_newick(newick2).map_err(to_py_err)?;
    let pair = complete_pair(&t1, &t2, &params(k)).map_err(to_py_err)?;
    Ok((pair.bsd_plus, pair.bsd_minus))
}

/// Complete every pair of trees of a Newick file (one tree per line).
///
/// Args:
///     path: Path to the tree file (may be gzip-compressed with a .gz suffix)
///     k: Number of nearest common leaves (default per pair: (|CL| + 2) // 2)
///
/// Returns:
///     A list of (i, j, bsd_plus, bsd_minus, completed_tree_1, completed_tree_2)
///     with 1-based tree indices. Pairs that could not be completed are skipped.
///
/// Raises:
///     ValueError: If the file cannot be read or holds fewer than 2 trees
#[pyfunction]
#[pyo3(signature = (path, k=None))]
fn pairwise_completion(
    path: &str,
    k: Option<usize>,
) -> PyResult<Vec<(usize, usize, f64, f64, String, String)>> {
    let trees = read_newick_file(path).map_err(to_py_err)?;
    if trees.len() < 2 {
        return Err(PyValueError::new_err(format!(
            "Need at least 2 trees to complete pairs, found {} in '{}'",
            trees.len(),
            path
        )));
    }

    let rows = complete_all_pairs(&trees, &params(k))
        .into_iter()
        .filter_map(|(i, j, outcome)| {
            let pair = outcome.ok()?;
            Some((
                i + 1,
                j + 1,
                pair.bsd_plus,
                pair.bsd_minus,
                to_newick(&pair.completion.t1),
                to_newick(&pair.completion.t2),
            ))
        })
        .collect();
    Ok(rows)
}

/// Python module definition
#[pymodule]
fn kncl_tree_completion(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(complete_trees, m)?)?;
    m.add_function(wrap_pyfunction!(branch_score_distances, m)?)?;
    m.add_function(wrap_pyfunction!(pairwise_completion, m)?)?;
    Ok(())
}
