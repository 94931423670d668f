// src/manifest/mod.rs

//! The manifest: every parsed resource of a project, keyed by unique id.
//!
//! - [`node`] defines the per-resource metadata the scheduler consumes.
//! - [`resource_type`] defines the resource-type tag and its display forms.
//!
//! The manifest is read-only from the scheduler's perspective; it is built by
//! the parsing/compilation collaborator before scheduling starts.

pub mod node;
pub mod resource_type;

pub use node::{ManifestNode, NodeConfig, TestKind, UniqueId};
pub use resource_type::ResourceType;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Complete parsed representation of a project's resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    nodes: BTreeMap<UniqueId, ManifestNode>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = ManifestNode>) -> Self {
        Self {
            nodes: nodes
                .into_iter()
                .map(|n| (n.unique_id.clone(), n))
                .collect(),
        }
    }

    pub fn add_node(&mut self, node: ManifestNode) {
        self.nodes.insert(node.unique_id.clone(), node);
    }

    pub fn get(&self, unique_id: &str) -> Option<&ManifestNode> {
        self.nodes.get(unique_id)
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.nodes.contains_key(unique_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, in stable (id-sorted) order.
    pub fn nodes(&self) -> impl Iterator<Item = &ManifestNode> {
        self.nodes.values()
    }

    /// Ids of all nodes, in stable order.
    pub fn unique_ids(&self) -> impl Iterator<Item = &UniqueId> {
        self.nodes.keys()
    }

    /// Direct prerequisites of a node, as recorded in its definition.
    pub fn dependencies_of(&self, unique_id: &str) -> &[UniqueId] {
        self.nodes
            .get(unique_id)
            .map(|n| n.depends_on.as_slice())
            .unwrap_or(&[])
    }
}
