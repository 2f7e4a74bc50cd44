use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived classification of a workspace, recomputed from the registered
/// file set; see the project-type derivation rule in the shared-context
/// component design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Fullstack,
    Backend,
    Frontend,
    Library,
    Cli,
    #[default]
    Unknown,
}

/// One per registered file. Never partially populated: a registration
/// replaces the whole struct atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: String,
    pub rel_path: String,
    pub language: String,
    pub loc: usize,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub imports: ImportSet,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub security_flags: Vec<String>,
    #[serde(default)]
    pub compliance_flags: Vec<String>,
    pub last_analyzed: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSet {
    #[serde(default)]
    pub internal: Vec<String>,
    #[serde(default)]
    pub external: Vec<String>,
}

/// One entry in `changeHistory`, bounded to the 50 most recent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub version: u64,
    pub modifier: String,
    pub description: String,
    pub at: DateTime<Utc>,
}

const MAX_CHANGE_HISTORY: usize = 50;

/// The per-field-locked project model shared across agents. This struct is
/// the plain-data shape the field locks in `omni-context` wrap; it carries
/// no synchronization itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStructure {
    pub project_type: ProjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub files: BTreeMap<String, FileSummary>,
    #[serde(default)]
    pub api_patterns: Vec<String>,
    #[serde(default)]
    pub conventions: serde_json::Value,
    #[serde(default)]
    pub completed_features: Vec<String>,
    pub version: u64,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub last_modifier: Option<String>,
    #[serde(default)]
    pub change_history: VecDeque<ChangeEntry>,
}

impl Default for ProjectStructure {
    fn default() -> Self {
        Self {
            project_type: ProjectType::Unknown,
            backend_framework: None,
            frontend_framework: None,
            database: None,
            files: BTreeMap::new(),
            api_patterns: Vec::new(),
            conventions: serde_json::Value::Null,
            completed_features: Vec::new(),
            version: 0,
            last_updated: Utc::now(),
            last_modifier: None,
            change_history: VecDeque::new(),
        }
    }
}

impl ProjectStructure {
    /// Appends a change entry and bumps the version by exactly 1, trimming
    /// the oldest entry once `change_history` would exceed 50 — see
    /// invariant 1 and the change-history-bound testable property.
    pub fn record_change(&mut self, modifier: impl Into<String>, description: impl Into<String>) {
        self.version += 1;
        self.last_updated = Utc::now();
        let modifier = modifier.into();
        self.last_modifier = Some(modifier.clone());
        self.change_history.push_back(ChangeEntry {
            version: self.version,
            modifier,
            description: description.into(),
            at: self.last_updated,
        });
        while self.change_history.len() > MAX_CHANGE_HISTORY {
            self.change_history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_history_is_capped_at_fifty() {
        let mut ps = ProjectStructure::default();
        for i in 0..120 {
            ps.record_change("tester", format!("change {i}"));
        }
        assert_eq!(ps.version, 120);
        assert!(ps.change_history.len() <= MAX_CHANGE_HISTORY);
        assert_eq!(ps.change_history.back().unwrap().description, "change 119");
    }
}
