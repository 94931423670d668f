// src/selector/mod.rs

//! Node selection: expression parsing, selection methods and the resolver.
//!
//! - [`spec`] parses selection expressions into [`SelectionCriteria`] and
//!   composes them into [`SelectionSpec`] trees.
//! - [`methods`] holds the per-method predicates and their dispatch table.
//! - [`resolver`] evaluates a spec tree against the graph + manifest.

pub mod methods;
pub mod resolver;
pub mod spec;

pub use methods::{MethodContext, MethodName, MethodTable};
pub use resolver::{NodeSelector, SelectorConfig};
pub use spec::{IndirectSelection, SelectionCriteria, SelectionDefinition, SelectionSpec};
