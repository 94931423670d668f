//! Fake [`NodeExecutor`] implementations for tests.
//!
//! The runner talks to a `NodeExecutor` trait object, so tests can record
//! which nodes were executed and script per-node outcomes without touching
//! a real warehouse.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dagexec::manifest::ManifestNode;
use dagexec::runner::{FatalError, NodeExecutor, NodeOutcome};

/// Scriptable executor: records execution order, reports configured
/// failures, and counts `cancel_all` calls.
#[derive(Default)]
pub struct FakeExecutor {
    executed: Mutex<Vec<String>>,
    failing: HashSet<String>,
    fatal: HashSet<String>,
    panicking: HashSet<String>,
    cancel_calls: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes with these ids report [`NodeOutcome::Error`].
    pub fn failing_on(mut self, unique_id: &str) -> Self {
        self.failing.insert(unique_id.to_string());
        self
    }

    /// Nodes with these ids return a [`FatalError`], aborting the run.
    pub fn fatal_on(mut self, unique_id: &str) -> Self {
        self.fatal.insert(unique_id.to_string());
        self
    }

    /// Nodes with these ids panic mid-execution.
    pub fn panicking_on(mut self, unique_id: &str) -> Self {
        self.panicking.insert(unique_id.to_string());
        self
    }

    /// Sleep this long per node, to widen concurrency windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Ids of executed nodes, in completion order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().expect("executed lock").clone()
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

impl NodeExecutor for FakeExecutor {
    fn execute(&self, node: &ManifestNode) -> Result<NodeOutcome, FatalError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.executed
            .lock()
            .expect("executed lock")
            .push(node.unique_id.clone());
        if self.panicking.contains(&node.unique_id) {
            panic!("scripted panic in {}", node.unique_id);
        }
        if self.fatal.contains(&node.unique_id) {
            return Err(FatalError(format!("fatal failure in {}", node.unique_id)));
        }
        if self.failing.contains(&node.unique_id) {
            return Ok(NodeOutcome::Error(format!(
                "scripted failure in {}",
                node.unique_id
            )));
        }
        Ok(NodeOutcome::Success)
    }

    fn cancel_all(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
    }
}
