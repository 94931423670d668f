// src/lib.rs

//! `dagexec`: the graph-based execution core of a SQL transformation
//! orchestrator.
//!
//! Given an already-built dependency graph and a manifest of parsed
//! resources, this crate:
//!
//! - resolves a selection expression into a set of node ids
//!   ([`selector`]),
//! - wraps the selected subgraph in a thread-safe, dependency-respecting
//!   work queue ([`graph::GraphQueue`]),
//! - and drains that queue with a bounded pool of worker threads, invoking
//!   an injected per-node callback and aggregating results ([`runner`]).
//!
//! Templating, SQL compilation, adapter connections and artifact writing
//! are external collaborators behind narrow interfaces: the manifest in,
//! the [`runner::NodeExecutor`] callback out, and [`runner::RunResults`]
//! back.

pub mod errors;
pub mod graph;
pub mod logging;
pub mod manifest;
pub mod runner;
pub mod selector;

pub use errors::{DagexecError, Result};
pub use graph::{Graph, GraphQueue};
pub use manifest::{Manifest, ManifestNode, ResourceType, UniqueId};
pub use runner::{ExecutionRunner, NodeExecutor, RunResults, RunnerConfig};
pub use selector::{IndirectSelection, NodeSelector, SelectionSpec, SelectorConfig};
