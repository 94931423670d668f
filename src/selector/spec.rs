// src/selector/spec.rs

//! Selection criteria: the parsed form of one selection expression, plus the
//! boolean spec tree they compose into.
//!
//! Grammar of a single expression:
//!
//! ```text
//! [@][<parents_depth>+][<method>[.<arg>...]:]<value>[+[<children_depth>]]
//! ```
//!
//! `@` (children's parents) cannot be combined with a `+` suffix. A missing
//! method is inferred: values containing a path separator select by `path`,
//! anything else by `fqn`. A `,` inside one expression intersects its parts.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::errors::{DagexecError, Result};
use crate::selector::methods::MethodName;

/// Policy for including tests that depend on both selected and unselected
/// nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndirectSelection {
    /// Include the test if any of its dependencies is selected.
    Eager,
    /// Include the test only if all of its dependencies are selected.
    Cautious,
    /// Include the test if every dependency is selected or an ancestor of a
    /// selected node (so it will exist by the time the test runs).
    Buildable,
    /// Never include indirectly-reachable tests (list/introspection).
    Empty,
}

impl Default for IndirectSelection {
    fn default() -> Self {
        IndirectSelection::Eager
    }
}

impl FromStr for IndirectSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eager" => Ok(IndirectSelection::Eager),
            "cautious" => Ok(IndirectSelection::Cautious),
            "buildable" => Ok(IndirectSelection::Buildable),
            "empty" => Ok(IndirectSelection::Empty),
            other => Err(format!(
                "invalid indirect selection: {other} (expected eager, cautious, buildable or empty)"
            )),
        }
    }
}

static RAW_SELECTOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^
        (?P<childrens_parents>@)?
        (?P<parents>(?P<parents_depth>\d*)\+)?
        ((?P<method>[\w.]+):)?
        (?P<value>.*?)
        (?P<children>\+(?P<children_depth>\d*))?
        $",
    )
    .expect("selector pattern is valid")
});

/// One parsed selection expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionCriteria {
    /// The expression as written, for diagnostics.
    pub raw: String,
    pub method: MethodName,
    /// Dotted arguments after the method name, e.g. `config.meta.owner`.
    pub method_arguments: Vec<String>,
    pub value: String,
    pub childrens_parents: bool,
    pub parents: bool,
    pub parents_depth: Option<usize>,
    pub children: bool,
    pub children_depth: Option<usize>,
    pub indirect_selection: IndirectSelection,
}

impl SelectionCriteria {
    /// Parse a single expression. `default_indirect` is the process-wide
    /// indirect-selection default; single expressions cannot override it.
    pub fn from_single_spec(raw: &str, default_indirect: IndirectSelection) -> Result<Self> {
        let caps = RAW_SELECTOR_PATTERN.captures(raw).ok_or_else(|| {
            DagexecError::InvalidSelector {
                spec: raw.to_string(),
                message: "does not match the selector grammar".to_string(),
            }
        })?;

        let childrens_parents = caps.name("childrens_parents").is_some();
        let parents = caps.name("parents").is_some();
        let children = caps.name("children").is_some();
        if childrens_parents && (parents || children) {
            return Err(DagexecError::InvalidSelector {
                spec: raw.to_string(),
                message: "@ cannot be combined with + operators".to_string(),
            });
        }

        let parents_depth = parse_depth(caps.name("parents_depth").map(|m| m.as_str()))?;
        let children_depth = parse_depth(caps.name("children_depth").map(|m| m.as_str()))?;
        let value = caps.name("value").map(|m| m.as_str()).unwrap_or("").to_string();

        let (method, method_arguments) = match caps.name("method") {
            Some(m) => parse_method(raw, m.as_str())?,
            None => (infer_method(&value), Vec::new()),
        };

        Ok(Self {
            raw: raw.to_string(),
            method,
            method_arguments,
            value,
            childrens_parents,
            parents,
            parents_depth,
            children,
            children_depth,
            indirect_selection: default_indirect,
        })
    }

    /// Build criteria from a structured definition (e.g. a named selector
    /// loaded by the configuration collaborator).
    pub fn from_definition(
        def: &SelectionDefinition,
        default_indirect: IndirectSelection,
    ) -> Result<Self> {
        let (method, method_arguments) = match &def.method {
            Some(m) => parse_method(&def.value, m)?,
            None => (infer_method(&def.value), Vec::new()),
        };
        Ok(Self {
            raw: def.value.clone(),
            method,
            method_arguments,
            value: def.value.clone(),
            childrens_parents: def.childrens_parents,
            parents: def.parents,
            parents_depth: def.parents_depth,
            children: def.children,
            children_depth: def.children_depth,
            indirect_selection: def.indirect_selection.unwrap_or(default_indirect),
        })
    }
}

fn parse_depth(raw: Option<&str>) -> Result<Option<usize>> {
    match raw {
        None | Some("") => Ok(None),
        Some(digits) => digits
            .parse::<usize>()
            .map(Some)
            .map_err(|e| DagexecError::InvalidSelector {
                spec: digits.to_string(),
                message: format!("invalid traversal depth: {e}"),
            }),
    }
}

fn parse_method(raw: &str, dotted: &str) -> Result<(MethodName, Vec<String>)> {
    let mut parts = dotted.split('.');
    let head = parts.next().unwrap_or_default();
    let method = head.parse::<MethodName>().map_err(|message| {
        DagexecError::InvalidSelector {
            spec: raw.to_string(),
            message,
        }
    })?;
    Ok((method, parts.map(str::to_string).collect()))
}

fn infer_method(value: &str) -> MethodName {
    if value.contains(std::path::MAIN_SEPARATOR) || value.contains('/') {
        MethodName::Path
    } else {
        MethodName::Fqn
    }
}

/// Structured (serde) form of a selection criteria, as found in named
/// selector definitions.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionDefinition {
    pub method: Option<String>,
    pub value: String,
    #[serde(default)]
    pub children: bool,
    #[serde(default)]
    pub parents: bool,
    #[serde(default)]
    pub children_depth: Option<usize>,
    #[serde(default)]
    pub parents_depth: Option<usize>,
    #[serde(default)]
    pub childrens_parents: bool,
    #[serde(default)]
    pub indirect_selection: Option<IndirectSelection>,
}

/// Boolean composition tree of selection criteria.
///
/// Composition is strictly left-to-right: a difference is the first
/// component minus the union of the rest; an intersection folds pairwise.
#[derive(Debug, Clone)]
pub enum SelectionSpec {
    Criteria(SelectionCriteria),
    Union(Vec<SelectionSpec>),
    Intersection(Vec<SelectionSpec>),
    Difference(Vec<SelectionSpec>),
}

impl SelectionSpec {
    /// Parse one CLI-style expression, honouring `,` intersections.
    pub fn from_expression(raw: &str, default_indirect: IndirectSelection) -> Result<Self> {
        if raw.contains(',') {
            let components = raw
                .split(',')
                .map(|part| {
                    SelectionCriteria::from_single_spec(part, default_indirect)
                        .map(SelectionSpec::Criteria)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(SelectionSpec::Intersection(components))
        } else {
            Ok(SelectionSpec::Criteria(SelectionCriteria::from_single_spec(
                raw,
                default_indirect,
            )?))
        }
    }

    /// Union of several include expressions. With no expressions, defaults
    /// to selecting everything (`fqn:*`).
    pub fn parse_union(
        include: &[String],
        default_indirect: IndirectSelection,
    ) -> Result<Self> {
        if include.is_empty() {
            return Ok(SelectionSpec::Criteria(SelectionCriteria::from_single_spec(
                "fqn:*",
                default_indirect,
            )?));
        }
        let components = include
            .iter()
            .map(|raw| Self::from_expression(raw, default_indirect))
            .collect::<Result<Vec<_>>>()?;
        Ok(SelectionSpec::Union(components))
    }

    /// The include set minus the union of the exclude expressions.
    pub fn parse_difference(
        include: &[String],
        exclude: &[String],
        default_indirect: IndirectSelection,
    ) -> Result<Self> {
        let included = Self::parse_union(include, default_indirect)?;
        if exclude.is_empty() {
            return Ok(included);
        }
        let excluded = exclude
            .iter()
            .map(|raw| Self::from_expression(raw, default_indirect))
            .collect::<Result<Vec<_>>>()?;
        Ok(SelectionSpec::Difference(vec![
            included,
            SelectionSpec::Union(excluded),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> SelectionCriteria {
        SelectionCriteria::from_single_spec(raw, IndirectSelection::default()).unwrap()
    }

    #[test]
    fn parse_simple_fqn() {
        let c = parse("asdf");
        assert_eq!(c.method, MethodName::Fqn);
        assert_eq!(c.value, "asdf");
        assert!(!c.childrens_parents && !c.children && !c.parents);
        assert_eq!(c.parents_depth, None);
        assert_eq!(c.children_depth, None);
    }

    #[test]
    fn parse_infers_path_method() {
        let c = parse("models/marts/*");
        assert_eq!(c.method, MethodName::Path);
        assert_eq!(c.value, "models/marts/*");
    }

    #[test]
    fn parse_parents_and_children() {
        let c = parse("+asdf");
        assert!(c.parents && !c.children);
        assert_eq!(c.value, "asdf");

        let c = parse("asdf+");
        assert!(c.children && !c.parents);
        assert_eq!(c.value, "asdf");

        let c = parse("16+tag:a+32");
        assert_eq!(c.method, MethodName::Tag);
        assert_eq!(c.value, "a");
        assert_eq!(c.parents_depth, Some(16));
        assert_eq!(c.children_depth, Some(32));
    }

    #[test]
    fn parse_complex_config_method() {
        let c = parse("2+config.arg.secondarg:argument_value+4");
        assert_eq!(c.method, MethodName::Config);
        assert_eq!(c.method_arguments, vec!["arg", "secondarg"]);
        assert_eq!(c.value, "argument_value");
        assert!(c.parents && c.children);
        assert_eq!(c.parents_depth, Some(2));
        assert_eq!(c.children_depth, Some(4));
    }

    #[test]
    fn parse_childrens_parents() {
        let c = parse("@source:a");
        assert!(c.childrens_parents);
        assert_eq!(c.method, MethodName::Source);
        assert_eq!(c.value, "a");
    }

    #[test]
    fn parse_empty_value() {
        let c = parse("");
        assert_eq!(c.method, MethodName::Fqn);
        assert_eq!(c.value, "");
    }

    #[test]
    fn invalid_specs_rejected() {
        for raw in ["@a+", "@tag:a+", "@a.b*+", "invalid_method:something"] {
            let result = SelectionCriteria::from_single_spec(raw, IndirectSelection::default());
            assert!(result.is_err(), "expected {raw:?} to be rejected");
        }
    }

    #[test]
    fn intersection_expression() {
        let spec =
            SelectionSpec::from_expression("a,b", IndirectSelection::default()).unwrap();
        match spec {
            SelectionSpec::Intersection(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected intersection, got {other:?}"),
        }
    }

    #[test]
    fn definition_overrides_indirect() {
        let def: SelectionDefinition = serde_json::from_value(serde_json::json!({
            "method": "path",
            "value": "models/marts/orders.sql",
            "indirect_selection": "buildable",
        }))
        .unwrap();
        let c = SelectionCriteria::from_definition(&def, IndirectSelection::Eager).unwrap();
        assert_eq!(c.indirect_selection, IndirectSelection::Buildable);
        assert_eq!(c.method, MethodName::Path);

        let def: SelectionDefinition = serde_json::from_value(serde_json::json!({
            "method": "path",
            "value": "models/marts/orders.sql",
        }))
        .unwrap();
        let c = SelectionCriteria::from_definition(&def, IndirectSelection::Cautious).unwrap();
        assert_eq!(c.indirect_selection, IndirectSelection::Cautious);
    }
}
