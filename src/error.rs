//! Error taxonomy for tree completion.
//!
//! Pair-level preconditions (`InsufficientOverlap`, `InvalidK`) abort a single
//! tree pair. Subtree-level problems (`DegenerateInsertion`, `NegativeLength`)
//! never abort a run; they are collected as warnings in the
//! [`CompletionReport`](crate::kncl::CompletionReport).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KnclError {
    /// Fewer than two leaves are shared by the trees.
    #[error("trees share {common} leaves, at least 2 common leaves are required")]
    InsufficientOverlap { common: usize },

    /// `k` lies outside `[2, |CL|]`.
    #[error("k = {k} is out of range, it must lie in [2, {common}]")]
    InvalidK { k: usize, common: usize },

    /// The minimum terminal branch length is negative or not finite.
    #[error("minimum terminal length {value} is invalid, it must be finite and non-negative")]
    InvalidMinTerminal { value: f64 },

    /// A leaf expected in a tree could not be found.
    #[error("leaf '{0}' is missing from the tree")]
    MissingLeaf(String),

    /// No eligible edge was found for a subtree; it was attached at the root.
    #[error("no eligible insertion edge for subtree {leaves:?}, attached at the root")]
    DegenerateInsertion { leaves: Vec<String> },

    /// A split produced a branch length below the tolerance; it was clamped to zero.
    #[error("negative branch length {value:e} clamped to zero")]
    NegativeLength { value: f64 },

    /// The completed trees do not span the union of the input leaf sets.
    #[error("completed trees do not span the union of the input leaf sets")]
    LeafSetMismatch,

    #[error("invalid tree: {0}")]
    InvalidTree(String),

    #[error("could not parse newick: {0}")]
    Newick(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<phylotree::tree::TreeError> for KnclError {
    fn from(err: phylotree::tree::TreeError) -> Self {
        KnclError::InvalidTree(err.to_string())
    }
}
