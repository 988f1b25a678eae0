//! Error types for graph mutation and traversal

use thiserror::Error;

/// Result type alias for graph traversal
pub type Result<T> = std::result::Result<T, GraphError>;

/// An edge was rejected because it would close a cycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{from}] -> [{to}] form a cycle")]
pub struct CycleError {
    /// Source of the rejected edge
    pub from: String,
    /// Target of the rejected edge
    pub to: String,
}

/// Graph error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Edge insertion rejected
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// Traversal attempted on a graph that is not acyclic
    #[error("Not a DAG")]
    NotAcyclic,
}
