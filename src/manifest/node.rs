// src/manifest/node.rs

//! Node metadata as seen by the scheduler.
//!
//! The parsing/compilation collaborator owns the full resource definitions;
//! the scheduler only needs the attributes that selection methods and the
//! runner consume: identity, resource type, tags, config and dependencies.

use serde::{Deserialize, Serialize};

use crate::manifest::ResourceType;

/// Globally unique node identifier: `<resource_type>.<package>.<name>[.<version>]`.
pub type UniqueId = String;

/// Kind of test node, used by the `test_type` selection method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    /// Schema-defined test rendered from a generic definition.
    Generic,
    /// A standalone test defined in its own file.
    Singular,
}

/// Node configuration values consulted by selection and execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub enabled: bool,
    /// Materialization strategy, e.g. "table", "view", "ephemeral".
    pub materialized: Option<String>,
    /// Free-form metadata, reachable via `config.meta.<key>:<value>` selectors.
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            materialized: None,
            meta: serde_json::Map::new(),
        }
    }
}

/// A single schedulable resource owned by the [`Manifest`](crate::manifest::Manifest).
///
/// Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestNode {
    pub unique_id: UniqueId,
    pub name: String,
    pub package_name: String,
    pub resource_type: ResourceType,
    /// Fully qualified name, e.g. `["my_package", "marts", "orders"]`.
    pub fqn: Vec<String>,
    /// Project-relative path of the defining file.
    pub path: String,
    pub tags: Vec<String>,
    /// Group this node belongs to, if any.
    pub group: Option<String>,
    /// For sources: the source name (`source:<source_name>.<table>` selectors).
    pub source_name: Option<String>,
    /// For tests: the kind of test.
    pub test_kind: Option<TestKind>,
    /// Content checksum, compared by the `state:modified` method.
    pub checksum: Option<String>,
    pub version: Option<String>,
    pub config: NodeConfig,
    /// Direct prerequisites of this node.
    pub depends_on: Vec<UniqueId>,
}

impl ManifestNode {
    pub fn new(
        resource_type: ResourceType,
        package_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let package_name = package_name.into();
        let name = name.into();
        let unique_id = format!("{resource_type}.{package_name}.{name}");
        Self {
            unique_id,
            fqn: vec![package_name.clone(), name.clone()],
            name,
            package_name,
            resource_type,
            path: String::new(),
            tags: Vec::new(),
            group: None,
            source_name: None,
            test_kind: None,
            checksum: None,
            version: None,
            config: NodeConfig::default(),
            depends_on: Vec::new(),
        }
    }

    /// Ephemeral nodes are inlined into their dependents and never executed
    /// standalone.
    pub fn is_ephemeral(&self) -> bool {
        self.config.materialized.as_deref() == Some("ephemeral")
    }

    /// Whether this node can appear in an execution subgraph at all.
    pub fn is_executable(&self) -> bool {
        self.config.enabled && self.resource_type.is_buildable() && !self.is_ephemeral()
    }

    /// File name component of `path`, e.g. "orders.sql".
    pub fn file_name(&self) -> Option<&str> {
        self.path.rsplit(['/', '\\']).next().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_format() {
        let node = ManifestNode::new(ResourceType::Model, "jaffle", "orders");
        assert_eq!(node.unique_id, "model.jaffle.orders");
        assert_eq!(node.fqn, vec!["jaffle", "orders"]);
    }

    #[test]
    fn ephemeral_is_not_executable() {
        let mut node = ManifestNode::new(ResourceType::Model, "jaffle", "stg_orders");
        node.config.materialized = Some("ephemeral".to_string());
        assert!(node.is_ephemeral());
        assert!(!node.is_executable());
    }

    #[test]
    fn file_name_from_path() {
        let mut node = ManifestNode::new(ResourceType::Model, "jaffle", "orders");
        node.path = "models/marts/orders.sql".to_string();
        assert_eq!(node.file_name(), Some("orders.sql"));
    }
}
