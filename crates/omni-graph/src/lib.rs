//! Agent dependency graph: add/validate/detect-cycles/topological sort,
//! transitive closure, and textual visualization (mermaid + dot).

mod error;
mod graph;

pub use error::{DependencyInfo, DependencyStatus, GraphError};
pub use graph::DependencyGraph;
