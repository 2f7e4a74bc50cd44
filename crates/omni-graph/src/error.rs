use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a dependency is satisfied, missing (never registered), or
/// unavailable (registered but disabled) at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    Satisfied,
    Missing,
    Unavailable,
}

/// One edge's detail, used by `DependencyGraph::dependency_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub agent_id: String,
    pub required_by: String,
    pub status: DependencyStatus,
    pub provided_resources: Vec<String>,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("agent '{agent_id}' is missing required dependencies: {}", missing.join(", "))]
    MissingDependency {
        agent_id: String,
        missing: Vec<String>,
    },
    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
    #[error("dependency validation failed:\n{}", errors.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    Validation { errors: Vec<String> },
}
