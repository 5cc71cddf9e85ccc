//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `tree`: arena tree model with stable node ids.
//! - `io`: Newick reading/writing and result-block output.
//! - `partition`, `subtrees`, `oracle`, `rates`, `insertion`, `mutator`: the
//!   building blocks of k-NCL completion.
//! - `kncl`: the completion driver, its parameters and run report.
//! - `distances`: branch score distance and rooted RF over a leaf list.
//! - `bitset`, `snapshot`: clade bitsets used by `distances`.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod distances;
pub mod error;
pub mod insertion;
pub mod io;
pub mod kncl;
pub mod mutator;
pub mod oracle;
pub mod partition;
pub mod rates;
pub mod snapshot;
pub mod subtrees;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use distances::branch_score_distance;
pub use error::KnclError;
pub use io::{parse_newick, read_newick_file, to_newick};
pub use kncl::{Completion, CompletionReport, KnclParams, PairCompletion, complete, complete_pair};
pub use tree::{NodeId, Tree};
