// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagexecError {
    #[error("Selection error: {0}")]
    SelectionError(String),

    #[error("Invalid selector '{spec}': {message}")]
    InvalidSelector { spec: String, message: String },

    #[error("No nodes matched the selection criteria '{0}'")]
    NoMatchingNodes(String),

    #[error("Node not found in manifest: {0}")]
    NodeNotFound(String),

    #[error("Cycle detected in dependency graph: {0}")]
    GraphCycle(String),

    #[error("Timed out waiting for a ready node after {0:?}")]
    QueueTimeout(std::time::Duration),

    #[error("Graph queue is exhausted; no nodes remain")]
    QueueExhausted,

    #[error("Graph queue lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Execution interrupted; {completed} node result(s) were recorded")]
    Interrupted {
        completed: usize,
        results: Vec<crate::runner::NodeResult>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagexecError>;
