//! Error taxonomy for cluster-statistics runs
//!
//! Fatal problems surface as [`ClusterStatsError`] from the engine. A failure
//! while computing a single statistic map is a [`ComputeError`]; the engine
//! promotes it to [`ClusterStatsError::Computation`] for the real data and
//! demotes it to an [`IterationWarning`] inside a permutation iteration.

use thiserror::Error;

/// Errors that abort a cluster-statistics run
#[derive(Error, Debug)]
pub enum ClusterStatsError {
    /// Missing or mismatched inputs, out-of-range selectors, invalid parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Empty surface, missing topology, or disconnected pieces
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Degenerate statistic for the real (unshuffled) data
    #[error("Computation error: {0}")]
    Computation(String),

    /// Caller raised the cancellation flag
    #[error("Run cancelled after {completed} of {total} iterations")]
    Cancelled { completed: usize, total: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed table, mesh, or configuration file contents
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type for cluster-statistics operations
pub type Result<T> = std::result::Result<T, ClusterStatsError>;

/// Failure while computing one statistic map
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    #[error("degenerate statistic at node {node}: {detail}")]
    Degenerate { node: usize, detail: String },

    #[error("non-finite statistic at node {node}")]
    NonFinite { node: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<ComputeError> for ClusterStatsError {
    fn from(err: ComputeError) -> Self {
        ClusterStatsError::Computation(err.to_string())
    }
}

/// A permutation iteration that failed and contributed area 0
#[derive(Debug, Clone, PartialEq)]
pub struct IterationWarning {
    pub iteration: usize,
    pub message: String,
}

impl std::fmt::Display for IterationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "iteration {}: {}", self.iteration, self.message)
    }
}
