// src/selector/resolver.rs

//! Turns a selection-spec tree into a concrete node-id set.
//!
//! Leaf criteria evaluate through the method table, expand along graph
//! edges (parents/children/`@`), then apply the indirect-selection policy
//! to tests hanging off the selection. Composite specs combine their
//! children's (direct, indirect) sets with the recorded set operation;
//! indirectly-captured tests are folded in at the end once their
//! dependencies are all covered by the combined direct set.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::errors::{DagexecError, Result};
use crate::graph::Graph;
use crate::manifest::{Manifest, ResourceType, UniqueId};
use crate::selector::methods::{MethodContext, MethodTable};
use crate::selector::spec::{IndirectSelection, SelectionCriteria, SelectionSpec};

/// Options threaded into the resolver by its constructor; never global.
#[derive(Debug, Clone, Default)]
pub struct SelectorConfig {
    /// Escalate the zero-match warning into a hard error.
    pub warn_error: bool,
    /// Restrict the final selection to these resource types (on top of the
    /// buildable/enabled filter). `None` means all buildable types.
    pub resource_types: Option<Vec<ResourceType>>,
}

/// Resolves selection specs against a graph and manifest.
pub struct NodeSelector<'a> {
    graph: &'a Graph,
    manifest: &'a Manifest,
    previous_state: Option<&'a Manifest>,
    config: SelectorConfig,
    methods: MethodTable,
}

impl<'a> NodeSelector<'a> {
    pub fn new(
        graph: &'a Graph,
        manifest: &'a Manifest,
        previous_state: Option<&'a Manifest>,
        config: SelectorConfig,
    ) -> Self {
        Self {
            graph,
            manifest,
            previous_state,
            config,
            methods: MethodTable::new(),
        }
    }

    /// Resolve a spec tree into the raw selected set (all resource types,
    /// indirect tests incorporated).
    pub fn select_nodes(&self, spec: &SelectionSpec) -> Result<HashSet<UniqueId>> {
        let (direct, indirect) = self.select_nodes_recursively(spec)?;
        Ok(self.incorporate_indirect_nodes(direct, indirect))
    }

    /// Resolve a spec tree and filter down to what the runner can execute:
    /// enabled, buildable, non-ephemeral nodes of the permitted types.
    pub fn get_selected(&self, spec: &SelectionSpec) -> Result<HashSet<UniqueId>> {
        let selected = self.select_nodes(spec)?;
        let filtered: HashSet<UniqueId> = selected
            .into_iter()
            .filter(|id| {
                self.manifest.get(id).is_some_and(|node| {
                    node.is_executable()
                        && self
                            .config
                            .resource_types
                            .as_ref()
                            .is_none_or(|types| types.contains(&node.resource_type))
                })
            })
            .collect();
        debug!(selected = filtered.len(), "resolved selection");
        Ok(filtered)
    }

    fn select_nodes_recursively(
        &self,
        spec: &SelectionSpec,
    ) -> Result<(HashSet<UniqueId>, HashSet<UniqueId>)> {
        match spec {
            SelectionSpec::Criteria(criteria) => self.select_criteria(criteria),
            SelectionSpec::Union(parts) => self.combine(parts, combine_union),
            SelectionSpec::Intersection(parts) => self.combine(parts, combine_intersection),
            SelectionSpec::Difference(parts) => self.combine(parts, combine_difference),
        }
    }

    fn combine(
        &self,
        parts: &[SelectionSpec],
        op: fn(Vec<HashSet<UniqueId>>) -> HashSet<UniqueId>,
    ) -> Result<(HashSet<UniqueId>, HashSet<UniqueId>)> {
        let mut directs = Vec::with_capacity(parts.len());
        let mut indirects = Vec::with_capacity(parts.len());
        for part in parts {
            let (direct, indirect) = self.select_nodes_recursively(part)?;
            directs.push(direct);
            indirects.push(indirect);
        }
        Ok((op(directs), op(indirects)))
    }

    fn select_criteria(
        &self,
        criteria: &SelectionCriteria,
    ) -> Result<(HashSet<UniqueId>, HashSet<UniqueId>)> {
        let context = MethodContext {
            manifest: self.manifest,
            previous_state: self.previous_state,
        };
        let base = self.methods.evaluate(&context, criteria)?;
        if base.is_empty() {
            if self.config.warn_error {
                return Err(DagexecError::NoMatchingNodes(criteria.raw.clone()));
            }
            warn!(spec = %criteria.raw, "nothing matched the selection criteria");
        }

        let collected = self.collect_specified_neighbors(criteria, base);
        Ok(self.expand_indirect_selection(collected, criteria.indirect_selection))
    }

    /// Apply the `@`/`+` graph expansions recorded on the criteria.
    fn collect_specified_neighbors(
        &self,
        criteria: &SelectionCriteria,
        base: HashSet<UniqueId>,
    ) -> HashSet<UniqueId> {
        let mut collected = base.clone();
        if criteria.childrens_parents {
            collected.extend(self.graph.select_childrens_parents(&base));
        } else {
            if criteria.parents {
                collected.extend(self.graph.select_parents(&base, criteria.parents_depth));
            }
            if criteria.children {
                collected.extend(self.graph.select_children(&base, criteria.children_depth));
            }
        }
        collected
    }

    /// Split the selection's downstream tests into directly-included and
    /// indirect-only, per the policy.
    fn expand_indirect_selection(
        &self,
        selected: HashSet<UniqueId>,
        policy: IndirectSelection,
    ) -> (HashSet<UniqueId>, HashSet<UniqueId>) {
        if policy == IndirectSelection::Empty {
            return (selected, HashSet::new());
        }

        // Buildable: a dependency counts if it is selected or will already
        // exist as an ancestor of the selection (ancestor sources included,
        // via the parent traversal).
        let selected_and_parents: HashSet<UniqueId> = match policy {
            IndirectSelection::Buildable => {
                let mut set = self.graph.select_parents(&selected, None);
                set.extend(selected.iter().cloned());
                set
            }
            _ => HashSet::new(),
        };

        let mut direct = selected.clone();
        let mut indirect = HashSet::new();
        for unique_id in self.graph.select_children(&selected, None) {
            let Some(node) = self.manifest.get(&unique_id) else {
                continue;
            };
            if !node.resource_type.is_indirectly_selectable() || selected.contains(&unique_id) {
                continue;
            }
            let deps: HashSet<&UniqueId> = node.depends_on.iter().collect();
            let all_deps_selected = deps.iter().all(|d| selected.contains(*d));
            match policy {
                IndirectSelection::Eager => {
                    direct.insert(unique_id);
                }
                IndirectSelection::Cautious => {
                    if all_deps_selected {
                        direct.insert(unique_id);
                    } else {
                        indirect.insert(unique_id);
                    }
                }
                IndirectSelection::Buildable => {
                    if all_deps_selected
                        || deps.iter().all(|d| selected_and_parents.contains(*d))
                    {
                        direct.insert(unique_id);
                    } else {
                        indirect.insert(unique_id);
                    }
                }
                IndirectSelection::Empty => unreachable!("handled above"),
            }
        }
        (direct, indirect)
    }

    /// After composition, pull in any indirectly-captured test whose
    /// dependencies all landed inside the combined direct set.
    fn incorporate_indirect_nodes(
        &self,
        direct: HashSet<UniqueId>,
        indirect: HashSet<UniqueId>,
    ) -> HashSet<UniqueId> {
        let mut selected = direct;
        for unique_id in indirect {
            let Some(node) = self.manifest.get(&unique_id) else {
                continue;
            };
            if node.depends_on.iter().all(|d| selected.contains(d)) {
                selected.insert(unique_id);
            }
        }
        selected
    }
}

fn combine_union(sets: Vec<HashSet<UniqueId>>) -> HashSet<UniqueId> {
    sets.into_iter().flatten().collect()
}

fn combine_intersection(sets: Vec<HashSet<UniqueId>>) -> HashSet<UniqueId> {
    let mut iter = sets.into_iter();
    let Some(first) = iter.next() else {
        return HashSet::new();
    };
    iter.fold(first, |acc, set| acc.intersection(&set).cloned().collect())
}

fn combine_difference(sets: Vec<HashSet<UniqueId>>) -> HashSet<UniqueId> {
    let mut iter = sets.into_iter();
    let Some(first) = iter.next() else {
        return HashSet::new();
    };
    iter.fold(first, |acc, set| acc.difference(&set).cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_combinators() {
        let a: HashSet<UniqueId> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let b: HashSet<UniqueId> = ["c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            combine_intersection(vec![a.clone(), b.clone()]),
            HashSet::from(["c".to_string()])
        );
        assert_eq!(
            combine_difference(vec![a.clone(), b.clone()]),
            ["a", "b"].iter().map(|s| s.to_string()).collect()
        );
        assert_eq!(combine_union(vec![a, b]).len(), 4);
    }

    #[test]
    fn difference_folds_left_to_right() {
        let a: HashSet<UniqueId> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let b: HashSet<UniqueId> = ["c", "d"].iter().map(|s| s.to_string()).collect();
        let c: HashSet<UniqueId> = ["a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            combine_difference(vec![a, b, c]),
            HashSet::from(["b".to_string()])
        );
    }
}
