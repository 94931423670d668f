// src/runner/mod.rs

//! Concurrent execution of queued nodes.
//!
//! - [`result`] defines per-node results and the aggregated run results.
//! - [`runner`] drives the worker pool over the graph queue.

pub mod result;
pub mod runner;

pub use result::{NodeResult, PreviousRunArgs, RunResults, RunStatus, StatusCounts, TimingInfo};
pub use runner::{ExecutionRunner, FatalError, NodeExecutor, NodeOutcome, RunnerConfig};
