// src/runner/result.rs

//! Per-node results and the aggregated run results handed to the
//! artifact-writer collaborator.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::manifest::UniqueId;

/// Terminal status of one executed (or skipped) node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
    Skipped,
    /// A test ran and its assertion failed.
    Fail,
    Warn,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
            RunStatus::Skipped => "skipped",
            RunStatus::Fail => "fail",
            RunStatus::Warn => "warn",
        };
        f.write_str(s)
    }
}

/// Wall-clock bounds of one node's execution.
#[derive(Debug, Clone, Serialize)]
pub struct TimingInfo {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Result of one node, immutable after creation.
#[derive(Debug, Clone, Serialize)]
pub struct NodeResult {
    pub unique_id: UniqueId,
    pub status: RunStatus,
    pub message: Option<String>,
    /// Name of the worker thread that produced this result.
    pub thread: String,
    /// Execution time in seconds; zero for skipped nodes.
    pub execution_time: f64,
    pub timing: Option<TimingInfo>,
}

impl NodeResult {
    /// A node skipped without ever executing.
    pub fn skipped(unique_id: UniqueId, message: impl Into<String>) -> Self {
        Self {
            unique_id,
            status: RunStatus::Skipped,
            message: Some(message.into()),
            thread: current_thread_name(),
            execution_time: 0.0,
            timing: None,
        }
    }
}

pub(crate) fn current_thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("main")
        .to_string()
}

/// Status counts for the final summary line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub success: usize,
    pub error: usize,
    pub skipped: usize,
    pub fail: usize,
    pub warn: usize,
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PASS={} WARN={} ERROR={} FAIL={} SKIP={}",
            self.success, self.warn, self.error, self.fail, self.skipped
        )
    }
}

/// Arguments recorded from a previous invocation, consulted when resolving
/// a retry's configuration.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PreviousRunArgs {
    pub threads: usize,
}

/// Ordered collection of per-node results plus run-level metadata.
#[derive(Debug, Clone, Serialize)]
pub struct RunResults {
    pub results: Vec<NodeResult>,
    /// Total wall-clock seconds for the whole run.
    pub elapsed: f64,
    pub generated_at: DateTime<Utc>,
    /// Thread count used, recorded for retry invocations.
    pub threads: usize,
}

impl RunResults {
    pub fn summary(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for result in &self.results {
            match result.status {
                RunStatus::Success => counts.success += 1,
                RunStatus::Error => counts.error += 1,
                RunStatus::Skipped => counts.skipped += 1,
                RunStatus::Fail => counts.fail += 1,
                RunStatus::Warn => counts.warn += 1,
            }
        }
        counts
    }

    /// Overall pass/fail: any errored node or failed test fails the run.
    pub fn success(&self) -> bool {
        let counts = self.summary();
        counts.error == 0 && counts.fail == 0
    }

    /// Per-status result ids, useful for retry (everything not successful).
    pub fn ids_with_status(&self, status: RunStatus) -> Vec<&UniqueId> {
        self.results
            .iter()
            .filter(|r| r.status == status)
            .map(|r| &r.unique_id)
            .collect()
    }

    /// The run-argument record a retry invocation consults.
    pub fn as_previous_args(&self) -> PreviousRunArgs {
        PreviousRunArgs {
            threads: self.threads,
        }
    }

    /// Count results grouped by the node's resource type, for the
    /// pluralised "N models, M tests" summary. Nodes unknown to the
    /// manifest are counted under their id's leading tag verbatim.
    pub fn counts_by_resource_type(
        &self,
        manifest: &crate::manifest::Manifest,
    ) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for result in &self.results {
            let label = match manifest.get(&result.unique_id) {
                Some(node) => node.resource_type.pluralized().to_string(),
                None => result
                    .unique_id
                    .split('.')
                    .next()
                    .unwrap_or("nodes")
                    .to_string(),
            };
            *counts.entry(label).or_default() += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, status: RunStatus) -> NodeResult {
        NodeResult {
            unique_id: id.to_string(),
            status,
            message: None,
            thread: "main".to_string(),
            execution_time: 0.1,
            timing: None,
        }
    }

    #[test]
    fn summary_counts_and_success() {
        let results = RunResults {
            results: vec![
                result("model.p.a", RunStatus::Success),
                result("model.p.b", RunStatus::Error),
                result("model.p.c", RunStatus::Skipped),
                result("test.p.t", RunStatus::Fail),
            ],
            elapsed: 1.0,
            generated_at: Utc::now(),
            threads: 2,
        };
        let counts = results.summary();
        assert_eq!(counts.success, 1);
        assert_eq!(counts.error, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.fail, 1);
        assert!(!results.success());
        assert_eq!(results.ids_with_status(RunStatus::Error).len(), 1);
        assert_eq!(results.as_previous_args().threads, 2);
    }

    #[test]
    fn warn_does_not_fail_the_run() {
        let results = RunResults {
            results: vec![result("model.p.a", RunStatus::Warn)],
            elapsed: 0.1,
            generated_at: Utc::now(),
            threads: 1,
        };
        assert!(results.success());
    }

    #[test]
    fn serializes_for_artifact_writer() {
        let results = RunResults {
            results: vec![result("model.p.a", RunStatus::Success)],
            elapsed: 0.5,
            generated_at: Utc::now(),
            threads: 1,
        };
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["results"][0]["status"], "success");
        assert_eq!(json["threads"], 1);
    }
}
