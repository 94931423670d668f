// src/graph/graph.rs

//! Directed dependency graph over node unique ids.
//!
//! Edge direction is producer -> consumer: an edge (A, B) means B depends on
//! A and cannot run until A has reached a terminal state. Node iteration
//! order is insertion order, which is what makes queue tie-breaking
//! deterministic for a fixed graph.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::errors::{DagexecError, Result};
use crate::manifest::{Manifest, UniqueId};

/// Dependency graph wrapper around a [`petgraph::graph::DiGraph`].
#[derive(Debug, Clone, Default)]
pub struct Graph {
    inner: DiGraph<UniqueId, ()>,
    indices: HashMap<UniqueId, NodeIndex>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the dependency graph implied by the `depends_on` entries of a
    /// manifest. Nodes are added in manifest (id-sorted) order; dependencies
    /// on ids missing from the manifest are an error.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self> {
        let mut graph = Self::new();
        for node in manifest.nodes() {
            graph.add_node(node.unique_id.clone());
        }
        for node in manifest.nodes() {
            for dep in &node.depends_on {
                if !manifest.contains(dep) {
                    return Err(DagexecError::NodeNotFound(format!(
                        "{} (dependency of {})",
                        dep, node.unique_id
                    )));
                }
                graph.add_edge(dep, &node.unique_id);
            }
        }
        Ok(graph)
    }

    /// Add a node if not already present; returns its index.
    pub fn add_node(&mut self, id: UniqueId) -> NodeIndex {
        match self.indices.get(&id) {
            Some(ix) => *ix,
            None => {
                let ix = self.inner.add_node(id.clone());
                self.indices.insert(id, ix);
                ix
            }
        }
    }

    /// Add a dependency edge: `to` depends on `from`. Creates missing nodes.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from_ix = self.add_node(from.to_string());
        let to_ix = self.add_node(to.to_string());
        if self.inner.find_edge(from_ix, to_ix).is_none() {
            self.inner.add_edge(from_ix, to_ix, ());
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.indices.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// All node ids as a set.
    pub fn nodes(&self) -> HashSet<UniqueId> {
        self.indices.keys().cloned().collect()
    }

    /// Node ids in insertion order. This order is the deterministic
    /// tie-break used by the graph queue.
    pub fn nodes_in_order(&self) -> impl Iterator<Item = &UniqueId> {
        self.inner.node_indices().map(|ix| &self.inner[ix])
    }

    /// All edges as (from, to) id pairs.
    pub fn edges(&self) -> Vec<(UniqueId, UniqueId)> {
        self.inner
            .edge_indices()
            .filter_map(|e| self.inner.edge_endpoints(e))
            .map(|(a, b)| (self.inner[a].clone(), self.inner[b].clone()))
            .collect()
    }

    /// Direct prerequisites of a node.
    pub fn dependencies_of(&self, id: &str) -> Vec<UniqueId> {
        self.neighbors_of(id, Direction::Incoming)
    }

    /// Direct dependents of a node.
    pub fn dependents_of(&self, id: &str) -> Vec<UniqueId> {
        self.neighbors_of(id, Direction::Outgoing)
    }

    fn neighbors_of(&self, id: &str, dir: Direction) -> Vec<UniqueId> {
        match self.indices.get(id) {
            Some(ix) => self
                .inner
                .neighbors_directed(*ix, dir)
                .map(|n| self.inner[n].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// All transitive prerequisites of `id`, up to `max_depth` hops if given.
    /// The node itself is not included.
    pub fn ancestors(&self, id: &str, max_depth: Option<usize>) -> HashSet<UniqueId> {
        self.traverse(std::iter::once(id), Direction::Incoming, max_depth)
    }

    /// All transitive dependents of `id`, up to `max_depth` hops if given.
    /// The node itself is not included.
    pub fn descendants(&self, id: &str, max_depth: Option<usize>) -> HashSet<UniqueId> {
        self.traverse(std::iter::once(id), Direction::Outgoing, max_depth)
    }

    /// Union of the ancestors of every node in `selected`.
    pub fn select_parents(
        &self,
        selected: &HashSet<UniqueId>,
        max_depth: Option<usize>,
    ) -> HashSet<UniqueId> {
        self.traverse(selected.iter().map(String::as_str), Direction::Incoming, max_depth)
    }

    /// Union of the descendants of every node in `selected`.
    pub fn select_children(
        &self,
        selected: &HashSet<UniqueId>,
        max_depth: Option<usize>,
    ) -> HashSet<UniqueId> {
        self.traverse(selected.iter().map(String::as_str), Direction::Outgoing, max_depth)
    }

    /// The `@` operator closure: the selected nodes, all of their
    /// descendants, and all ancestors of both. This pulls in the full set of
    /// inputs needed to rebuild and re-validate everything downstream of the
    /// selection.
    pub fn select_childrens_parents(&self, selected: &HashSet<UniqueId>) -> HashSet<UniqueId> {
        let mut ancestors_for = self.select_children(selected, None);
        ancestors_for.extend(selected.iter().cloned());
        let mut result = ancestors_for.clone();
        result.extend(self.select_parents(&ancestors_for, None));
        result
    }

    /// Breadth-first traversal from a seed set in the given direction,
    /// bounded by `max_depth` hops when provided.
    fn traverse<'a>(
        &self,
        seeds: impl Iterator<Item = &'a str>,
        dir: Direction,
        max_depth: Option<usize>,
    ) -> HashSet<UniqueId> {
        let mut frontier: VecDeque<(NodeIndex, usize)> = seeds
            .filter_map(|id| self.indices.get(id))
            .map(|ix| (*ix, 0))
            .collect();
        let seed_ixs: HashSet<NodeIndex> = frontier.iter().map(|(ix, _)| *ix).collect();

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        while let Some((ix, depth)) = frontier.pop_front() {
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for next in self.inner.neighbors_directed(ix, dir) {
                if visited.insert(next) {
                    frontier.push_back((next, depth + 1));
                }
            }
        }

        visited
            .into_iter()
            .filter(|ix| !seed_ixs.contains(ix))
            .map(|ix| self.inner[ix].clone())
            .collect()
    }

    /// Induced subgraph over `selected`: nodes restricted to the selection,
    /// edges restricted to selected x selected. Node insertion order is
    /// preserved from this graph.
    pub fn subgraph(&self, selected: &HashSet<UniqueId>) -> Graph {
        let mut sub = Graph::new();
        for id in self.nodes_in_order() {
            if selected.contains(id) {
                sub.add_node(id.clone());
            }
        }
        for (from, to) in self.edges() {
            if selected.contains(&from) && selected.contains(&to) {
                sub.add_edge(&from, &to);
            }
        }
        debug!(
            nodes = sub.node_count(),
            edges = sub.edge_count(),
            "built induced subgraph"
        );
        sub
    }

    /// Fail with a structural error if the graph contains a cycle.
    pub fn ensure_acyclic(&self) -> Result<()> {
        match toposort(&self.inner, None) {
            Ok(_) => Ok(()),
            Err(cycle) => {
                let node = &self.inner[cycle.node_id()];
                Err(DagexecError::GraphCycle(format!(
                    "cycle detected through node {node}"
                )))
            }
        }
    }
}
