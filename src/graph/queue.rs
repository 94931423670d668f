// src/graph/queue.rs

//! Thread-safe, dependency-respecting work queue over a pruned graph.
//!
//! The queue is a monitor object: one mutex guards {ready heap, queued set,
//! in_progress set, per-node in-degrees}, and a condition variable wakes
//! blocked `get` callers whenever `mark_done` may have made new nodes ready.
//!
//! A node enters the ready heap only once its in-degree within the queue's
//! private subgraph reaches zero. Ties between simultaneously-ready nodes
//! break by enqueue sequence number, which follows the graph's insertion
//! order, so dispatch order is deterministic for a fixed graph.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::errors::{DagexecError, Result};
use crate::graph::Graph;
use crate::manifest::{Manifest, ManifestNode, UniqueId};

/// Entry in the ready heap. Lower `priority` wins; `seq` breaks ties FIFO.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ReadyEntry {
    priority: usize,
    seq: u64,
    unique_id: UniqueId,
}

#[derive(Debug)]
struct QueueState {
    /// Min-heap of ready nodes.
    ready: BinaryHeap<Reverse<ReadyEntry>>,
    /// Every id that has ever been pushed into `ready`.
    queued: HashSet<UniqueId>,
    /// Ids popped by `get` but not yet `mark_done`d.
    in_progress: HashSet<UniqueId>,
    /// Unresolved-prerequisite count per not-yet-ready node.
    indegree: HashMap<UniqueId, usize>,
    /// Successor adjacency of the private subgraph; entries are removed as
    /// nodes complete.
    successors: HashMap<UniqueId, Vec<UniqueId>>,
    /// Nodes that have not had `mark_done` called yet.
    remaining: usize,
    /// Next enqueue sequence number.
    seq: u64,
}

impl QueueState {
    fn push_ready(&mut self, unique_id: UniqueId) {
        self.queued.insert(unique_id.clone());
        self.ready.push(Reverse(ReadyEntry {
            priority: 0,
            seq: self.seq,
            unique_id,
        }));
        self.seq += 1;
    }
}

/// Dependency-ordered work queue shared by the runner's worker threads.
///
/// Created once per execution phase from the full dependency graph, the
/// manifest and the selected node set; discarded when the phase completes.
#[derive(Debug)]
pub struct GraphQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    manifest: Arc<Manifest>,
    /// Immutable snapshot of each queued node's in-subgraph prerequisites,
    /// taken at construction. Used by callers to decide whether a popped
    /// node must be skipped because an upstream node failed.
    dependencies: HashMap<UniqueId, Vec<UniqueId>>,
}

impl GraphQueue {
    /// Build a queue over the subgraph of `graph` induced by `selected`.
    ///
    /// With `preserve_edges` set, edges between two selected nodes are kept
    /// and enforce ordering. With it unset, all edges are stripped and every
    /// selected node is immediately ready (unordered phases such as clone).
    ///
    /// Selected ids missing from the graph are treated as isolated nodes.
    /// The pruned subgraph is re-validated for acyclicity; a cycle is a
    /// structural error.
    pub fn new(
        graph: &Graph,
        manifest: Arc<Manifest>,
        selected: &HashSet<UniqueId>,
        preserve_edges: bool,
    ) -> Result<Self> {
        let mut sub = graph.subgraph(selected);
        for id in selected {
            if !sub.contains(id) {
                sub.add_node(id.clone());
            }
        }
        if !preserve_edges {
            let nodes: Vec<UniqueId> = sub.nodes_in_order().cloned().collect();
            let mut stripped = Graph::new();
            for id in nodes {
                stripped.add_node(id);
            }
            sub = stripped;
        }
        sub.ensure_acyclic()?;

        let mut dependencies = HashMap::new();
        let mut successors = HashMap::new();
        let mut indegree = HashMap::new();
        for id in sub.nodes_in_order() {
            let deps = sub.dependencies_of(id);
            indegree.insert(id.clone(), deps.len());
            dependencies.insert(id.clone(), deps);
            successors.insert(id.clone(), sub.dependents_of(id));
        }

        let mut state = QueueState {
            ready: BinaryHeap::new(),
            queued: HashSet::new(),
            in_progress: HashSet::new(),
            indegree,
            successors,
            remaining: sub.node_count(),
            seq: 0,
        };

        // Seed the ready heap in graph insertion order.
        for id in sub.nodes_in_order() {
            if state.indegree.get(id).copied() == Some(0) {
                state.indegree.remove(id);
                state.push_ready(id.clone());
            }
        }

        debug!(
            nodes = state.remaining,
            ready = state.ready.len(),
            preserve_edges,
            "graph queue constructed"
        );

        Ok(Self {
            state: Mutex::new(state),
            available: Condvar::new(),
            manifest,
            dependencies,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>> {
        self.state
            .lock()
            .map_err(|e| DagexecError::LockPoisoned(e.to_string()))
    }

    /// Pop the next ready node, blocking until one becomes available.
    ///
    /// The returned id is moved into `in_progress` atomically with the pop,
    /// so no two callers receive the same node. Fails with
    /// [`DagexecError::QueueExhausted`] once every node has completed, and
    /// with [`DagexecError::QueueTimeout`] if `timeout` elapses first.
    pub fn get(&self, timeout: Option<Duration>) -> Result<UniqueId> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock()?;
        loop {
            if let Some(Reverse(entry)) = state.ready.pop() {
                state.in_progress.insert(entry.unique_id.clone());
                trace!(node = %entry.unique_id, "popped ready node");
                return Ok(entry.unique_id);
            }
            if state.remaining == 0 {
                return Err(DagexecError::QueueExhausted);
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(DagexecError::QueueTimeout(timeout.unwrap_or_default()));
                    }
                    let (guard, _) = self
                        .available
                        .wait_timeout(state, deadline - now)
                        .map_err(|e| DagexecError::LockPoisoned(e.to_string()))?;
                    guard
                }
                None => self
                    .available
                    .wait(state)
                    .map_err(|e| DagexecError::LockPoisoned(e.to_string()))?,
            };
        }
    }

    /// Record a popped node as finished, whatever its outcome.
    ///
    /// Must be called exactly once per id returned by [`get`](Self::get);
    /// skipped and errored nodes included, otherwise their descendants
    /// deadlock. Successors whose last unresolved prerequisite this was are
    /// pushed into the ready heap before the node leaves `in_progress`, so
    /// `empty()` never observes a transiently-drained queue mid-completion.
    pub fn mark_done(&self, unique_id: &str) -> Result<()> {
        let mut state = self.lock()?;
        if !state.in_progress.contains(unique_id) {
            return Err(DagexecError::NodeNotFound(format!(
                "{unique_id} is not in progress"
            )));
        }

        if let Some(successors) = state.successors.remove(unique_id) {
            for succ in successors {
                let now_ready = match state.indegree.get_mut(&succ) {
                    Some(count) => {
                        *count = count.saturating_sub(1);
                        *count == 0
                    }
                    None => false,
                };
                if now_ready {
                    state.indegree.remove(&succ);
                    state.push_ready(succ);
                }
            }
        }

        state.in_progress.remove(unique_id);
        state.remaining -= 1;
        trace!(node = %unique_id, remaining = state.remaining, "marked done");

        drop(state);
        self.available.notify_all();
        Ok(())
    }

    /// True iff nothing is ready and nothing is in progress.
    pub fn empty(&self) -> Result<bool> {
        let state = self.lock()?;
        Ok(state.ready.is_empty() && state.in_progress.is_empty())
    }

    /// Number of nodes that have not yet completed.
    pub fn remaining(&self) -> Result<usize> {
        Ok(self.lock()?.remaining)
    }

    pub fn manifest(&self) -> &Arc<Manifest> {
        &self.manifest
    }

    /// Manifest node for a queued id, if the manifest knows it.
    pub fn node(&self, unique_id: &str) -> Option<&ManifestNode> {
        self.manifest.get(unique_id)
    }

    /// In-subgraph prerequisites of a queued node (construction-time
    /// snapshot; unaffected by completions).
    pub fn dependencies_of(&self, unique_id: &str) -> &[UniqueId] {
        self.dependencies
            .get(unique_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Snapshot of every id that has entered the ready heap so far.
    pub fn queued_snapshot(&self) -> Result<BTreeSet<UniqueId>> {
        Ok(self.lock()?.queued.iter().cloned().collect())
    }

    /// Snapshot of ids currently being executed.
    pub fn in_progress_snapshot(&self) -> Result<BTreeSet<UniqueId>> {
        Ok(self.lock()?.in_progress.iter().cloned().collect())
    }

    /// Current ready-heap contents as (priority, id), in pop order.
    pub fn ready_snapshot(&self) -> Result<Vec<(usize, UniqueId)>> {
        let state = self.lock()?;
        let mut entries: Vec<ReadyEntry> =
            state.ready.iter().map(|Reverse(e)| e.clone()).collect();
        entries.sort();
        Ok(entries
            .into_iter()
            .map(|e| (e.priority, e.unique_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestNode, ResourceType};

    fn manifest() -> Arc<Manifest> {
        Arc::new(Manifest::from_nodes([
            ManifestNode::new(ResourceType::Model, "pkg", "upstream_model"),
            ManifestNode::new(ResourceType::Model, "pkg", "downstream_model"),
        ]))
    }

    fn graph() -> Graph {
        let mut g = Graph::new();
        g.add_edge("model.pkg.upstream_model", "model.pkg.downstream_model");
        g
    }

    fn all_selected() -> HashSet<UniqueId> {
        ["model.pkg.upstream_model", "model.pkg.downstream_model"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn preserve_edges_only_roots_ready() {
        let queue = GraphQueue::new(&graph(), manifest(), &all_selected(), true).unwrap();
        assert_eq!(
            queue.ready_snapshot().unwrap(),
            vec![(0, "model.pkg.upstream_model".to_string())]
        );
        assert_eq!(
            queue.queued_snapshot().unwrap(),
            BTreeSet::from(["model.pkg.upstream_model".to_string()])
        );
        assert!(queue.in_progress_snapshot().unwrap().is_empty());
    }

    #[test]
    fn no_edges_everything_ready() {
        let queue = GraphQueue::new(&graph(), manifest(), &all_selected(), false).unwrap();
        let ready = queue.ready_snapshot().unwrap();
        assert_eq!(ready.len(), 2);
        assert!(ready.iter().all(|(priority, _)| *priority == 0));
        assert_eq!(queue.queued_snapshot().unwrap(), all_selected().into_iter().collect());
    }

    #[test]
    fn mark_done_releases_successor() {
        let queue = GraphQueue::new(&graph(), manifest(), &all_selected(), true).unwrap();
        let first = queue.get(None).unwrap();
        assert_eq!(first, "model.pkg.upstream_model");
        // Downstream is not ready until upstream completes.
        assert!(queue.ready_snapshot().unwrap().is_empty());
        queue.mark_done(&first).unwrap();
        let second = queue.get(None).unwrap();
        assert_eq!(second, "model.pkg.downstream_model");
        queue.mark_done(&second).unwrap();
        assert!(queue.empty().unwrap());
        assert!(matches!(
            queue.get(Some(Duration::from_millis(1))),
            Err(DagexecError::QueueExhausted)
        ));
    }

    #[test]
    fn mark_done_requires_in_progress() {
        let queue = GraphQueue::new(&graph(), manifest(), &all_selected(), true).unwrap();
        assert!(matches!(
            queue.mark_done("model.pkg.downstream_model"),
            Err(DagexecError::NodeNotFound(_))
        ));
    }

    #[test]
    fn get_times_out_when_nothing_ready() {
        let queue = GraphQueue::new(&graph(), manifest(), &all_selected(), true).unwrap();
        let first = queue.get(None).unwrap();
        // Upstream is in progress, downstream blocked: bounded wait expires.
        let err = queue.get(Some(Duration::from_millis(20))).unwrap_err();
        assert!(matches!(err, DagexecError::QueueTimeout(_)));
        queue.mark_done(&first).unwrap();
    }

    #[test]
    fn cycle_in_selection_is_structural_error() {
        let mut g = graph();
        g.add_edge("model.pkg.downstream_model", "model.pkg.upstream_model");
        let result = GraphQueue::new(&g, manifest(), &all_selected(), true);
        assert!(matches!(result, Err(DagexecError::GraphCycle(_))));
    }
}
