// src/manifest/resource_type.rs

//! Resource-type tags carried by manifest nodes.
//!
//! The tag drives two things in the scheduler:
//! - selection-method dispatch (e.g. `resource_type:model`, `source:...`)
//! - pluralised display in run summaries ("2 models, 1 seed")

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of resource a manifest node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Model,
    Seed,
    Snapshot,
    Test,
    Source,
    Macro,
    Exposure,
    Metric,
    Group,
    SemanticModel,
    Function,
    Operation,
    SqlOperation,
    Documentation,
    RpcCall,
}

impl ResourceType {
    /// Resource types that the runner can actually build and execute.
    ///
    /// Everything else is compile-time or documentation-only metadata and is
    /// excluded from execution subgraphs.
    pub fn is_buildable(self) -> bool {
        matches!(
            self,
            ResourceType::Model
                | ResourceType::Seed
                | ResourceType::Snapshot
                | ResourceType::Test
                | ResourceType::Operation
                | ResourceType::SqlOperation
        )
    }

    /// Whether nodes of this type may be pulled in by indirect selection
    /// rather than requiring an explicit match.
    pub fn is_indirectly_selectable(self) -> bool {
        matches!(self, ResourceType::Test)
    }

    /// Human readable plural, used in run summaries.
    pub fn pluralized(self) -> &'static str {
        match self {
            ResourceType::Model => "models",
            ResourceType::Seed => "seeds",
            ResourceType::Snapshot => "snapshots",
            ResourceType::Test => "tests",
            ResourceType::Source => "sources",
            ResourceType::Macro => "macros",
            ResourceType::Exposure => "exposures",
            ResourceType::Metric => "metrics",
            ResourceType::Group => "groups",
            ResourceType::SemanticModel => "semantic models",
            ResourceType::Function => "functions",
            ResourceType::Operation => "operations",
            ResourceType::SqlOperation => "sql operations",
            ResourceType::Documentation => "docs",
            ResourceType::RpcCall => "rpc calls",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ResourceType::Model => "model",
            ResourceType::Seed => "seed",
            ResourceType::Snapshot => "snapshot",
            ResourceType::Test => "test",
            ResourceType::Source => "source",
            ResourceType::Macro => "macro",
            ResourceType::Exposure => "exposure",
            ResourceType::Metric => "metric",
            ResourceType::Group => "group",
            ResourceType::SemanticModel => "semantic_model",
            ResourceType::Function => "function",
            ResourceType::Operation => "operation",
            ResourceType::SqlOperation => "sql_operation",
            ResourceType::Documentation => "doc",
            ResourceType::RpcCall => "rpc",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "model" => Ok(ResourceType::Model),
            "seed" => Ok(ResourceType::Seed),
            "snapshot" => Ok(ResourceType::Snapshot),
            "test" => Ok(ResourceType::Test),
            "source" => Ok(ResourceType::Source),
            "macro" => Ok(ResourceType::Macro),
            "exposure" => Ok(ResourceType::Exposure),
            "metric" => Ok(ResourceType::Metric),
            "group" => Ok(ResourceType::Group),
            "semantic_model" => Ok(ResourceType::SemanticModel),
            "function" => Ok(ResourceType::Function),
            "operation" => Ok(ResourceType::Operation),
            "sql_operation" => Ok(ResourceType::SqlOperation),
            "doc" | "documentation" => Ok(ResourceType::Documentation),
            "rpc" => Ok(ResourceType::RpcCall),
            other => Err(format!("unknown resource type: {other}")),
        }
    }
}
