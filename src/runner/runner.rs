// src/runner/runner.rs

//! The execution runner: a fixed pool of worker threads draining the graph
//! queue.
//!
//! Per node the state machine is `queued -> in_progress -> {success | error
//! | skipped}`. A node whose upstream failed is skipped without invoking the
//! executor, and still goes through `mark_done` so its own descendants get
//! evaluated for skip in turn.

use std::collections::{BTreeMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::errors::{DagexecError, Result};
use crate::graph::GraphQueue;
use crate::manifest::{ManifestNode, UniqueId};
use crate::runner::result::{
    current_thread_name, NodeResult, PreviousRunArgs, RunResults, RunStatus, TimingInfo,
};

/// A failure that must abort the whole run, as opposed to a node-level
/// error (operator interrupt, unrecoverable signal, poisoned adapter).
#[derive(Debug, Error)]
#[error("fatal execution error: {0}")]
pub struct FatalError(pub String);

/// Outcome reported by the per-node execution callback for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Success,
    /// The node ran but reported a non-fatal warning.
    Warn(String),
    /// A test ran and its assertion failed.
    Fail(String),
    /// The node errored; descendants will be skipped.
    Error(String),
}

/// Injected per-node execution callback, owned by the task-type
/// collaborator (run/test/seed/snapshot/build/clone).
///
/// Production implementations compile the node and submit SQL through an
/// adapter connection owned by the calling worker thread; tests substitute
/// fakes. A `FatalError` return aborts the run and triggers best-effort
/// cancellation of every worker's in-flight connection via
/// [`cancel_all`](Self::cancel_all).
pub trait NodeExecutor: Send + Sync {
    fn execute(&self, node: &ManifestNode) -> std::result::Result<NodeOutcome, FatalError>;

    /// Request cancellation of all in-flight warehouse operations. Called
    /// at most once per run, only on fatal errors.
    fn cancel_all(&self) {}
}

/// Runner options, threaded in explicitly.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub threads: usize,
    /// Stop dispatching new nodes after the first failure.
    pub fail_fast: bool,
    /// Bound on how long a worker may wait for a ready node; `None` waits
    /// indefinitely. Exceeding it is a scheduler-level fault.
    pub get_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            fail_fast: false,
            get_timeout: None,
        }
    }
}

impl RunnerConfig {
    /// Resolve the thread count for an invocation: an explicit request
    /// wins, then the previous run's recorded count (retry), then the
    /// default.
    pub fn resolve_threads(
        requested: Option<usize>,
        previous: Option<&PreviousRunArgs>,
        default: usize,
    ) -> usize {
        requested
            .or(previous.map(|p| p.threads))
            .unwrap_or(default)
            .max(1)
    }
}

/// Shared mutable state of one run. The queue has its own lock; everything
/// else lives here behind a second, runner-local mutex.
struct RunState {
    results: Vec<NodeResult>,
    /// Nodes that errored, failed or were skipped; membership of a direct
    /// dependency here forces a skip.
    failed: HashSet<UniqueId>,
}

/// Drains a [`GraphQueue`] with `config.threads` worker threads.
pub struct ExecutionRunner {
    queue: Arc<GraphQueue>,
    executor: Arc<dyn NodeExecutor>,
    config: RunnerConfig,
}

impl ExecutionRunner {
    pub fn new(
        queue: Arc<GraphQueue>,
        executor: Arc<dyn NodeExecutor>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            queue,
            executor,
            config,
        }
    }

    /// Run every queued node to a terminal state and aggregate results.
    ///
    /// Node-level errors are recovered locally and recorded as data; only
    /// structural faults (queue timeout, lock poisoning) and fatal
    /// interrupts abort the run. On interrupt, already-recorded results are
    /// preserved inside the returned error.
    pub fn execute(&self) -> Result<RunResults> {
        let started = Instant::now();
        let threads = self.config.threads.max(1);
        let state = Mutex::new(RunState {
            results: Vec::new(),
            failed: HashSet::new(),
        });
        let stop_dispatch = AtomicBool::new(false);
        let interrupted = AtomicBool::new(false);

        info!(threads, fail_fast = self.config.fail_fast, "starting execution");

        let worker_outcomes: Vec<Result<()>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(threads);
            for i in 0..threads {
                let builder = thread::Builder::new().name(format!("worker-{}", i + 1));
                let state = &state;
                let stop_dispatch = &stop_dispatch;
                let interrupted = &interrupted;
                let handle = builder
                    .spawn_scoped(scope, move || {
                        self.worker_loop(state, stop_dispatch, interrupted)
                    })
                    .map_err(|e| DagexecError::Other(e.into()));
                handles.push(handle);
            }
            handles
                .into_iter()
                .map(|handle| {
                    handle?.join().map_err(|_| {
                        DagexecError::Other(anyhow::anyhow!("worker thread panicked"))
                    })?
                })
                .collect()
        });

        let state = state
            .into_inner()
            .map_err(|e| DagexecError::LockPoisoned(e.to_string()))?;
        let results = RunResults {
            elapsed: started.elapsed().as_secs_f64(),
            generated_at: Utc::now(),
            threads,
            results: state.results,
        };

        for outcome in worker_outcomes {
            outcome?;
        }

        if interrupted.load(Ordering::SeqCst) {
            error!("execution interrupted; surfacing partial results");
            return Err(DagexecError::Interrupted {
                completed: results.results.len(),
                results: results.results,
            });
        }

        self.log_summary(&results);
        Ok(results)
    }

    fn worker_loop(
        &self,
        state: &Mutex<RunState>,
        stop_dispatch: &AtomicBool,
        interrupted: &AtomicBool,
    ) -> Result<()> {
        loop {
            let unique_id = match self.queue.get(self.config.get_timeout) {
                Ok(id) => id,
                Err(DagexecError::QueueExhausted) => return Ok(()),
                Err(e) => return Err(e),
            };

            // Whatever happens to this node, mark_done must run so its
            // descendants do not deadlock.
            let outcome = self.process_node(&unique_id, state, stop_dispatch, interrupted);
            let done = self.queue.mark_done(&unique_id);
            outcome?;
            done?;
        }
    }

    fn process_node(
        &self,
        unique_id: &str,
        state: &Mutex<RunState>,
        stop_dispatch: &AtomicBool,
        interrupted: &AtomicBool,
    ) -> Result<()> {
        match self.skip_reason(unique_id, state, stop_dispatch)? {
            Some(reason) => {
                debug!(node = %unique_id, reason = %reason, "skipping node");
                let result = NodeResult::skipped(unique_id.to_string(), reason);
                let mut guard = state
                    .lock()
                    .map_err(|e| DagexecError::LockPoisoned(e.to_string()))?;
                guard.failed.insert(unique_id.to_string());
                guard.results.push(result);
                Ok(())
            }
            None => self.run_node(unique_id, state, stop_dispatch, interrupted),
        }
    }

    fn skip_reason(
        &self,
        unique_id: &str,
        state: &Mutex<RunState>,
        stop_dispatch: &AtomicBool,
    ) -> Result<Option<String>> {
        if stop_dispatch.load(Ordering::SeqCst) {
            return Ok(Some("run stopped before this node was dispatched".to_string()));
        }
        let guard = state
            .lock()
            .map_err(|e| DagexecError::LockPoisoned(e.to_string()))?;
        let failed_upstream = self
            .queue
            .dependencies_of(unique_id)
            .iter()
            .find(|dep| guard.failed.contains(*dep));
        Ok(failed_upstream.map(|dep| format!("upstream node {dep} failed")))
    }

    fn run_node(
        &self,
        unique_id: &str,
        state: &Mutex<RunState>,
        stop_dispatch: &AtomicBool,
        interrupted: &AtomicBool,
    ) -> Result<()> {
        let node = self
            .queue
            .node(unique_id)
            .ok_or_else(|| DagexecError::NodeNotFound(unique_id.to_string()))?;

        debug!(node = %unique_id, resource_type = %node.resource_type, "executing node");
        let started_at = Utc::now();
        let clock = Instant::now();
        // A panic unwinding out of the callback must not bypass result
        // recording or `mark_done`; it is handled like a fatal error.
        let outcome = catch_unwind(AssertUnwindSafe(|| self.executor.execute(node)))
            .unwrap_or_else(|payload| Err(FatalError(panic_description(payload))));
        let execution_time = clock.elapsed().as_secs_f64();
        let timing = Some(TimingInfo {
            started_at,
            completed_at: Utc::now(),
        });

        let (status, message) = match outcome {
            Ok(NodeOutcome::Success) => (RunStatus::Success, None),
            Ok(NodeOutcome::Warn(msg)) => (RunStatus::Warn, Some(msg)),
            Ok(NodeOutcome::Fail(msg)) => (RunStatus::Fail, Some(msg)),
            Ok(NodeOutcome::Error(msg)) => (RunStatus::Error, Some(msg)),
            Err(fatal) => {
                // First fatal error requests cancellation of every other
                // worker's in-flight operation; the run then drains by
                // skipping.
                if !interrupted.swap(true, Ordering::SeqCst) {
                    warn!(node = %unique_id, error = %fatal, "fatal error; cancelling connections");
                    self.executor.cancel_all();
                }
                stop_dispatch.store(true, Ordering::SeqCst);
                (RunStatus::Error, Some(fatal.to_string()))
            }
        };

        match status {
            RunStatus::Error | RunStatus::Fail => {
                warn!(node = %unique_id, status = %status, "node did not complete successfully");
                if self.config.fail_fast && !stop_dispatch.swap(true, Ordering::SeqCst) {
                    info!("fail-fast: no further nodes will be dispatched");
                }
            }
            _ => {
                info!(node = %unique_id, status = %status, execution_time, "node finished");
            }
        }

        let result = NodeResult {
            unique_id: unique_id.to_string(),
            status,
            message,
            thread: current_thread_name(),
            execution_time,
            timing,
        };

        let mut guard = state
            .lock()
            .map_err(|e| DagexecError::LockPoisoned(e.to_string()))?;
        if matches!(status, RunStatus::Error | RunStatus::Fail) {
            guard.failed.insert(unique_id.to_string());
        }
        guard.results.push(result);
        Ok(())
    }

    fn log_summary(&self, results: &RunResults) {
        let by_type: BTreeMap<String, usize> =
            results.counts_by_resource_type(self.queue.manifest());
        let described = by_type
            .iter()
            .map(|(label, count)| format!("{count} {label}"))
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            summary = %results.summary(),
            elapsed = results.elapsed,
            "finished running {described}"
        );
    }
}

/// Best-effort text for a panic payload caught from the execution callback.
fn panic_description(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("node execution panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("node execution panicked: {msg}")
    } else {
        "node execution panicked".to_string()
    }
}
