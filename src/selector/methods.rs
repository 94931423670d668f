// src/selector/methods.rs

//! Selection methods: the pure predicates behind `method:value` expressions.
//!
//! Each method is a function `(context, criteria) -> set of unique ids`,
//! registered once into an explicit table keyed by [`MethodName`]. Values
//! support `*` wildcards.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use regex::Regex;

use crate::errors::{DagexecError, Result};
use crate::manifest::{Manifest, ManifestNode, ResourceType, TestKind, UniqueId};
use crate::selector::spec::SelectionCriteria;

/// Name of a selection method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodName {
    Fqn,
    Tag,
    Group,
    Source,
    Path,
    File,
    Package,
    Config,
    TestName,
    TestType,
    ResourceType,
    Exposure,
    Metric,
    State,
}

impl FromStr for MethodName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fqn" => Ok(MethodName::Fqn),
            "tag" => Ok(MethodName::Tag),
            "group" => Ok(MethodName::Group),
            "source" => Ok(MethodName::Source),
            "path" => Ok(MethodName::Path),
            "file" => Ok(MethodName::File),
            "package" => Ok(MethodName::Package),
            "config" => Ok(MethodName::Config),
            "test_name" => Ok(MethodName::TestName),
            "test_type" => Ok(MethodName::TestType),
            "resource_type" => Ok(MethodName::ResourceType),
            "exposure" => Ok(MethodName::Exposure),
            "metric" => Ok(MethodName::Metric),
            "state" => Ok(MethodName::State),
            other => Err(format!("unknown selection method: {other}")),
        }
    }
}

/// Read-only inputs available to every method.
pub struct MethodContext<'a> {
    pub manifest: &'a Manifest,
    /// Manifest of a prior invocation, required by the `state` method.
    pub previous_state: Option<&'a Manifest>,
}

type MethodFn = fn(&MethodContext<'_>, &SelectionCriteria) -> Result<HashSet<UniqueId>>;

/// Fixed dispatch table from method name to implementation.
pub struct MethodTable {
    table: HashMap<MethodName, MethodFn>,
}

impl MethodTable {
    /// Register every supported method.
    pub fn new() -> Self {
        let mut table: HashMap<MethodName, MethodFn> = HashMap::new();
        table.insert(MethodName::Fqn, select_fqn);
        table.insert(MethodName::Tag, select_tag);
        table.insert(MethodName::Group, select_group);
        table.insert(MethodName::Source, select_source);
        table.insert(MethodName::Path, select_path);
        table.insert(MethodName::File, select_file);
        table.insert(MethodName::Package, select_package);
        table.insert(MethodName::Config, select_config);
        table.insert(MethodName::TestName, select_test_name);
        table.insert(MethodName::TestType, select_test_type);
        table.insert(MethodName::ResourceType, select_resource_type);
        table.insert(MethodName::Exposure, select_exposure);
        table.insert(MethodName::Metric, select_metric);
        table.insert(MethodName::State, select_state);
        Self { table }
    }

    /// Evaluate one criteria against the manifest.
    pub fn evaluate(
        &self,
        context: &MethodContext<'_>,
        criteria: &SelectionCriteria,
    ) -> Result<HashSet<UniqueId>> {
        let method = self.table.get(&criteria.method).ok_or_else(|| {
            DagexecError::SelectionError(format!(
                "no implementation registered for method {:?}",
                criteria.method
            ))
        })?;
        method(context, criteria)
    }
}

impl Default for MethodTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Equality matcher with `*` wildcard support.
struct Matcher {
    pattern: Option<Regex>,
    literal: String,
}

impl Matcher {
    fn new(value: &str) -> Self {
        if value.contains('*') {
            let escaped = regex::escape(value).replace(r"\*", ".*");
            // The escaped pattern cannot fail to compile.
            let pattern = Regex::new(&format!("^{escaped}$")).ok();
            Self {
                pattern,
                literal: value.to_string(),
            }
        } else {
            Self {
                pattern: None,
                literal: value.to_string(),
            }
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        match &self.pattern {
            Some(re) => re.is_match(candidate),
            None => self.literal == candidate,
        }
    }
}

fn collect(
    manifest: &Manifest,
    predicate: impl Fn(&ManifestNode) -> bool,
) -> HashSet<UniqueId> {
    manifest
        .nodes()
        .filter(|n| predicate(n))
        .map(|n| n.unique_id.clone())
        .collect()
}

/// Match the node fqn as a glob-segment prefix; a lone segment also matches
/// the bare node name.
fn select_fqn(ctx: &MethodContext<'_>, criteria: &SelectionCriteria) -> Result<HashSet<UniqueId>> {
    let segments: Vec<Matcher> = criteria.value.split('.').map(Matcher::new).collect();
    let single = (segments.len() == 1).then(|| Matcher::new(&criteria.value));
    Ok(collect(ctx.manifest, |node| {
        fqn_prefix_matches(&node.fqn, &segments)
            || single.as_ref().is_some_and(|m| m.matches(&node.name))
    }))
}

fn fqn_prefix_matches(fqn: &[String], segments: &[Matcher]) -> bool {
    if segments.len() > fqn.len() {
        return false;
    }
    segments
        .iter()
        .zip(fqn)
        .all(|(matcher, part)| matcher.matches(part))
}

fn select_tag(ctx: &MethodContext<'_>, criteria: &SelectionCriteria) -> Result<HashSet<UniqueId>> {
    let matcher = Matcher::new(&criteria.value);
    Ok(collect(ctx.manifest, |node| {
        node.tags.iter().any(|t| matcher.matches(t))
    }))
}

fn select_group(
    ctx: &MethodContext<'_>,
    criteria: &SelectionCriteria,
) -> Result<HashSet<UniqueId>> {
    let matcher = Matcher::new(&criteria.value);
    Ok(collect(ctx.manifest, |node| {
        node.group.as_deref().is_some_and(|g| matcher.matches(g))
    }))
}

/// `source:<source_name>`, `source:<source_name>.<table>` or
/// `source:<package>.<source_name>.<table>`.
fn select_source(
    ctx: &MethodContext<'_>,
    criteria: &SelectionCriteria,
) -> Result<HashSet<UniqueId>> {
    let parts: Vec<&str> = criteria.value.split('.').collect();
    let (package, source_name, table) = match parts.as_slice() {
        [source_name] => (None, *source_name, "*"),
        [source_name, table] => (None, *source_name, *table),
        [package, source_name, table] => (Some(*package), *source_name, *table),
        _ => {
            return Err(DagexecError::InvalidSelector {
                spec: criteria.raw.clone(),
                message: format!(
                    "source selector must be `source_name`, `source_name.table` or \
                     `package.source_name.table`, got '{}'",
                    criteria.value
                ),
            });
        }
    };
    let package = package.map(Matcher::new);
    let source_name = Matcher::new(source_name);
    let table = Matcher::new(table);
    Ok(collect(ctx.manifest, |node| {
        node.resource_type == ResourceType::Source
            && node
                .source_name
                .as_deref()
                .is_some_and(|s| source_name.matches(s))
            && table.matches(&node.name)
            && package.as_ref().is_none_or(|m| m.matches(&node.package_name))
    }))
}

/// Match nodes whose file path is under the given directory or matches the
/// given glob.
fn select_path(ctx: &MethodContext<'_>, criteria: &SelectionCriteria) -> Result<HashSet<UniqueId>> {
    let matcher = Matcher::new(&criteria.value);
    let prefix = format!("{}/", criteria.value.trim_end_matches('/'));
    Ok(collect(ctx.manifest, |node| {
        matcher.matches(&node.path) || node.path.starts_with(&prefix)
    }))
}

/// Match the defining file name, with or without extension.
fn select_file(ctx: &MethodContext<'_>, criteria: &SelectionCriteria) -> Result<HashSet<UniqueId>> {
    let matcher = Matcher::new(&criteria.value);
    Ok(collect(ctx.manifest, |node| {
        node.file_name().is_some_and(|f| {
            matcher.matches(f) || f.rsplit_once('.').is_some_and(|(stem, _)| matcher.matches(stem))
        })
    }))
}

fn select_package(
    ctx: &MethodContext<'_>,
    criteria: &SelectionCriteria,
) -> Result<HashSet<UniqueId>> {
    let matcher = Matcher::new(&criteria.value);
    Ok(collect(ctx.manifest, |node| matcher.matches(&node.package_name)))
}

/// Walk the dotted argument path into the node config (including `meta`)
/// and compare against the wanted value. List leaves match on membership.
fn select_config(
    ctx: &MethodContext<'_>,
    criteria: &SelectionCriteria,
) -> Result<HashSet<UniqueId>> {
    if criteria.method_arguments.is_empty() {
        return Err(DagexecError::InvalidSelector {
            spec: criteria.raw.clone(),
            message: "config selector requires an argument path, e.g. config.materialized:view"
                .to_string(),
        });
    }
    let wanted = criteria.value.clone();
    let path = criteria.method_arguments.clone();
    Ok(collect(ctx.manifest, move |node| {
        let Ok(config) = serde_json::to_value(&node.config) else {
            return false;
        };
        let mut current = &config;
        for key in &path {
            match current.get(key) {
                Some(next) => current = next,
                None => return false,
            }
        }
        json_value_matches(current, &wanted)
    }))
}

fn json_value_matches(value: &serde_json::Value, wanted: &str) -> bool {
    match value {
        serde_json::Value::String(s) => s == wanted,
        serde_json::Value::Bool(b) => b.to_string() == wanted,
        serde_json::Value::Number(n) => n.to_string() == wanted,
        serde_json::Value::Array(items) => items.iter().any(|v| json_value_matches(v, wanted)),
        _ => false,
    }
}

fn select_test_name(
    ctx: &MethodContext<'_>,
    criteria: &SelectionCriteria,
) -> Result<HashSet<UniqueId>> {
    let matcher = Matcher::new(&criteria.value);
    Ok(collect(ctx.manifest, |node| {
        node.resource_type == ResourceType::Test && matcher.matches(&node.name)
    }))
}

fn select_test_type(
    ctx: &MethodContext<'_>,
    criteria: &SelectionCriteria,
) -> Result<HashSet<UniqueId>> {
    let wanted = match criteria.value.to_lowercase().as_str() {
        "generic" | "schema" => TestKind::Generic,
        "singular" | "data" => TestKind::Singular,
        other => {
            return Err(DagexecError::InvalidSelector {
                spec: criteria.raw.clone(),
                message: format!("invalid test type: {other} (expected generic or singular)"),
            });
        }
    };
    Ok(collect(ctx.manifest, |node| node.test_kind == Some(wanted)))
}

fn select_resource_type(
    ctx: &MethodContext<'_>,
    criteria: &SelectionCriteria,
) -> Result<HashSet<UniqueId>> {
    let wanted =
        criteria
            .value
            .parse::<ResourceType>()
            .map_err(|message| DagexecError::InvalidSelector {
                spec: criteria.raw.clone(),
                message,
            })?;
    Ok(collect(ctx.manifest, |node| node.resource_type == wanted))
}

fn select_exposure(
    ctx: &MethodContext<'_>,
    criteria: &SelectionCriteria,
) -> Result<HashSet<UniqueId>> {
    let matcher = Matcher::new(&criteria.value);
    Ok(collect(ctx.manifest, |node| {
        node.resource_type == ResourceType::Exposure && matcher.matches(&node.name)
    }))
}

fn select_metric(
    ctx: &MethodContext<'_>,
    criteria: &SelectionCriteria,
) -> Result<HashSet<UniqueId>> {
    let matcher = Matcher::new(&criteria.value);
    Ok(collect(ctx.manifest, |node| {
        node.resource_type == ResourceType::Metric && matcher.matches(&node.name)
    }))
}

/// `state:new` and `state:modified` against a previous manifest.
fn select_state(
    ctx: &MethodContext<'_>,
    criteria: &SelectionCriteria,
) -> Result<HashSet<UniqueId>> {
    let previous = ctx.previous_state.ok_or_else(|| {
        DagexecError::SelectionError(
            "the state method requires a previous manifest to compare against".to_string(),
        )
    })?;
    match criteria.value.as_str() {
        "new" => Ok(collect(ctx.manifest, |node| !previous.contains(&node.unique_id))),
        "modified" => Ok(collect(ctx.manifest, |node| {
            match previous.get(&node.unique_id) {
                None => true,
                Some(old) => old.checksum != node.checksum || old.fqn != node.fqn,
            }
        })),
        other => Err(DagexecError::InvalidSelector {
            spec: criteria.raw.clone(),
            message: format!("invalid state selector: {other} (expected new or modified)"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestNode;
    use crate::selector::spec::IndirectSelection;

    fn criteria(raw: &str) -> SelectionCriteria {
        SelectionCriteria::from_single_spec(raw, IndirectSelection::default()).unwrap()
    }

    fn sample_manifest() -> Manifest {
        let mut orders = ManifestNode::new(ResourceType::Model, "jaffle", "orders");
        orders.tags = vec!["nightly".to_string()];
        orders.path = "models/marts/orders.sql".to_string();
        orders.config.materialized = Some("table".to_string());

        let mut stg = ManifestNode::new(ResourceType::Model, "jaffle", "stg_orders");
        stg.path = "models/staging/stg_orders.sql".to_string();
        stg.config.materialized = Some("view".to_string());
        stg.config.meta.insert(
            "owner".to_string(),
            serde_json::Value::String("analytics".to_string()),
        );

        let mut raw = ManifestNode::new(ResourceType::Source, "jaffle", "raw_orders");
        raw.source_name = Some("raw".to_string());

        let mut test = ManifestNode::new(ResourceType::Test, "jaffle", "not_null_orders_id");
        test.test_kind = Some(TestKind::Generic);

        Manifest::from_nodes([orders, stg, raw, test])
    }

    fn eval(manifest: &Manifest, raw: &str) -> HashSet<UniqueId> {
        let table = MethodTable::new();
        let ctx = MethodContext {
            manifest,
            previous_state: None,
        };
        table.evaluate(&ctx, &criteria(raw)).unwrap()
    }

    #[test]
    fn fqn_matches_name_and_prefix() {
        let manifest = sample_manifest();
        assert_eq!(eval(&manifest, "fqn:orders").len(), 1);
        assert_eq!(eval(&manifest, "fqn:jaffle.orders").len(), 1);
        assert_eq!(eval(&manifest, "fqn:jaffle.*").len(), 4);
        assert_eq!(eval(&manifest, "fqn:stg_*").len(), 1);
        assert!(eval(&manifest, "fqn:other.orders").is_empty());
    }

    #[test]
    fn tag_and_package() {
        let manifest = sample_manifest();
        assert_eq!(
            eval(&manifest, "tag:nightly"),
            HashSet::from(["model.jaffle.orders".to_string()])
        );
        assert_eq!(eval(&manifest, "package:jaffle").len(), 4);
        assert!(eval(&manifest, "tag:hourly").is_empty());
    }

    #[test]
    fn source_selectors() {
        let manifest = sample_manifest();
        let expected = HashSet::from(["source.jaffle.raw_orders".to_string()]);
        assert_eq!(eval(&manifest, "source:raw"), expected);
        assert_eq!(eval(&manifest, "source:raw.raw_orders"), expected);
        assert_eq!(eval(&manifest, "source:jaffle.raw.raw_orders"), expected);
        assert!(eval(&manifest, "source:other").is_empty());
    }

    #[test]
    fn path_and_file() {
        let manifest = sample_manifest();
        assert_eq!(eval(&manifest, "path:models/marts/orders.sql").len(), 1);
        assert_eq!(eval(&manifest, "models/staging/*").len(), 1);
        assert_eq!(eval(&manifest, "path:models").len(), 2);
        assert_eq!(eval(&manifest, "file:orders.sql").len(), 1);
        assert_eq!(eval(&manifest, "file:stg_orders").len(), 1);
    }

    #[test]
    fn config_walks_argument_path() {
        let manifest = sample_manifest();
        assert_eq!(
            eval(&manifest, "config.materialized:view"),
            HashSet::from(["model.jaffle.stg_orders".to_string()])
        );
        assert_eq!(
            eval(&manifest, "config.meta.owner:analytics"),
            HashSet::from(["model.jaffle.stg_orders".to_string()])
        );
        assert!(eval(&manifest, "config.materialized:incremental").is_empty());
    }

    #[test]
    fn test_type_and_resource_type() {
        let manifest = sample_manifest();
        assert_eq!(eval(&manifest, "test_type:generic").len(), 1);
        assert!(eval(&manifest, "test_type:singular").is_empty());
        assert_eq!(eval(&manifest, "resource_type:model").len(), 2);
        assert_eq!(eval(&manifest, "test_name:not_null_*").len(), 1);
    }

    #[test]
    fn state_requires_previous_manifest() {
        let manifest = sample_manifest();
        let table = MethodTable::new();
        let ctx = MethodContext {
            manifest: &manifest,
            previous_state: None,
        };
        let result = table.evaluate(&ctx, &criteria("state:modified"));
        assert!(matches!(result, Err(DagexecError::SelectionError(_))));
    }

    #[test]
    fn state_new_and_modified() {
        let manifest = sample_manifest();
        let mut previous = sample_manifest();
        // Remove one node and change another's checksum in the prior state.
        let mut nodes: Vec<ManifestNode> = previous
            .nodes()
            .filter(|n| n.unique_id != "model.jaffle.orders")
            .cloned()
            .collect();
        for node in &mut nodes {
            if node.unique_id == "model.jaffle.stg_orders" {
                node.checksum = Some("old".to_string());
            }
        }
        previous = Manifest::from_nodes(nodes);

        let table = MethodTable::new();
        let ctx = MethodContext {
            manifest: &manifest,
            previous_state: Some(&previous),
        };
        let new = table.evaluate(&ctx, &criteria("state:new")).unwrap();
        assert_eq!(new, HashSet::from(["model.jaffle.orders".to_string()]));
        let modified = table.evaluate(&ctx, &criteria("state:modified")).unwrap();
        assert!(modified.contains("model.jaffle.orders"));
        assert!(modified.contains("model.jaffle.stg_orders"));
        assert!(!modified.contains("source.jaffle.raw_orders"));
    }
}
