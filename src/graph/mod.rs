// src/graph/mod.rs

//! Dependency graph and the work queue built over it.
//!
//! - [`graph`] wraps a directed acyclic graph of node ids with the
//!   traversals selection needs (ancestors, descendants, `@` closure).
//! - [`queue`] is the thread-safe priority queue that yields nodes whose
//!   prerequisites have completed.

pub mod graph;
pub mod queue;

pub use graph::Graph;
pub use queue::GraphQueue;
