#![allow(dead_code)]

use dagexec::graph::Graph;
use dagexec::manifest::{Manifest, ManifestNode, ResourceType, TestKind};

/// Builder for a [`ManifestNode`] to simplify test setup.
pub struct NodeBuilder {
    node: ManifestNode,
}

impl NodeBuilder {
    pub fn new(resource_type: ResourceType, package: &str, name: &str) -> Self {
        Self {
            node: ManifestNode::new(resource_type, package, name),
        }
    }

    pub fn model(package: &str, name: &str) -> Self {
        Self::new(ResourceType::Model, package, name)
    }

    pub fn seed(package: &str, name: &str) -> Self {
        Self::new(ResourceType::Seed, package, name)
    }

    pub fn test(package: &str, name: &str) -> Self {
        let mut builder = Self::new(ResourceType::Test, package, name);
        builder.node.test_kind = Some(TestKind::Generic);
        builder
    }

    pub fn source(package: &str, source_name: &str, table: &str) -> Self {
        let mut builder = Self::new(ResourceType::Source, package, table);
        builder.node.source_name = Some(source_name.to_string());
        builder
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.node.tags.push(tag.to_string());
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.node.path = path.to_string();
        self
    }

    pub fn fqn(mut self, fqn: &[&str]) -> Self {
        self.node.fqn = fqn.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.node.group = Some(group.to_string());
        self
    }

    pub fn depends_on(mut self, unique_id: &str) -> Self {
        self.node.depends_on.push(unique_id.to_string());
        self
    }

    pub fn materialized(mut self, materialized: &str) -> Self {
        self.node.config.materialized = Some(materialized.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.node.config.enabled = false;
        self
    }

    pub fn checksum(mut self, checksum: &str) -> Self {
        self.node.checksum = Some(checksum.to_string());
        self
    }

    pub fn test_kind(mut self, kind: TestKind) -> Self {
        self.node.test_kind = Some(kind);
        self
    }

    pub fn build(self) -> ManifestNode {
        self.node
    }

    pub fn unique_id(&self) -> String {
        self.node.unique_id.clone()
    }
}

/// Builder for a [`Manifest`] plus the dependency [`Graph`] implied by the
/// nodes' `depends_on` entries.
pub struct ManifestBuilder {
    nodes: Vec<ManifestNode>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn with_node(mut self, builder: NodeBuilder) -> Self {
        self.nodes.push(builder.build());
        self
    }

    pub fn build(self) -> Manifest {
        Manifest::from_nodes(self.nodes)
    }

    /// Build both the manifest and its dependency graph.
    pub fn build_with_graph(self) -> (Manifest, Graph) {
        let manifest = self.build();
        let graph =
            Graph::from_manifest(&manifest).expect("builder produced inconsistent dependencies");
        (manifest, graph)
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
