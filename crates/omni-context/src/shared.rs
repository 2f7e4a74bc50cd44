use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use omni_types::{ComplianceFinding, ProjectStructure, SecurityFinding};

use crate::persistence::{load_project_structure, save_project_structure};
use crate::versioned::VersionedState;

/// Serializable point-in-time view of a [`SharedContext`], mirroring the
/// `to_dict()` shape agents and the wire layer consume.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    pub project_structure: Option<ProjectStructure>,
    pub security_findings: Vec<SecurityFinding>,
    pub compliance_findings: Vec<ComplianceFinding>,
    pub relevant_summaries: Vec<String>,
    pub workspace_path: Option<String>,
    pub session_started: DateTime<Utc>,
    pub version: u64,
}

/// Thread-safe shared context for inter-agent communication: one field
/// lock per logical table so unrelated agents never contend. `version` is
/// a single counter bumped by every mutation, for cheap staleness checks.
pub struct SharedContext {
    project_structure: VersionedState<Option<ProjectStructure>>,
    security_findings: RwLock<Vec<SecurityFinding>>,
    compliance_findings: RwLock<Vec<ComplianceFinding>>,
    relevant_summaries: RwLock<Vec<String>>,
    workspace_path: RwLock<Option<String>>,
    persistence_enabled: bool,
    session_started: DateTime<Utc>,
    version: AtomicU64,
}

impl SharedContext {
    pub fn new(workspace_path: Option<String>) -> Self {
        Self::with_persistence(workspace_path, true)
    }

    /// Same as [`Self::new`], but lets a caller disable the on-disk
    /// persistence half entirely (e.g. for a read-only demo run).
    pub fn with_persistence(workspace_path: Option<String>, persistence_enabled: bool) -> Self {
        Self {
            project_structure: VersionedState::new(None, "project_structure"),
            security_findings: RwLock::new(Vec::new()),
            compliance_findings: RwLock::new(Vec::new()),
            relevant_summaries: RwLock::new(Vec::new()),
            workspace_path: RwLock::new(workspace_path),
            persistence_enabled,
            session_started: Utc::now(),
            version: AtomicU64::new(0),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn workspace_path(&self) -> Option<String> {
        self.workspace_path.read().clone()
    }

    fn bump_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Sets the workspace root and, if persistence is enabled and
    /// `auto_load` is requested, loads any previously persisted project
    /// structure for it. A load failure (missing file, invalid JSON) is
    /// logged by `load_project_structure` and otherwise ignored.
    pub async fn set_workspace(&self, workspace_path: impl Into<String>, auto_load: bool) {
        let workspace_path = workspace_path.into();
        *self.workspace_path.write() = Some(workspace_path.clone());

        if !(auto_load && self.persistence_enabled) {
            return;
        }
        match load_project_structure(Path::new(&workspace_path)).await {
            Ok(Some(structure)) => {
                let file_count = structure.files.len();
                self.project_structure.set(Some(structure), Some("persistence"));
                self.bump_version();
                tracing::info!(workspace_path, file_count, "loaded persisted project structure");
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(workspace_path, error = %err, "failed to load persisted project structure");
            }
        }
    }

    async fn persist_if_enabled(&self) {
        if !self.persistence_enabled {
            return;
        }
        let Some(workspace_path) = self.workspace_path() else {
            return;
        };
        let Some(structure) = self.project_structure.get() else {
            return;
        };
        if let Err(err) = save_project_structure(Path::new(&workspace_path), &structure).await {
            tracing::warn!(workspace_path, error = %err, "failed to persist project structure");
        }
    }

    pub async fn get_project_structure(&self) -> Option<ProjectStructure> {
        self.project_structure.get()
    }

    pub async fn set_project_structure(&self, structure: ProjectStructure, modifier: Option<&str>) {
        self.project_structure.set(Some(structure), modifier);
        let version = self.bump_version();
        tracing::debug!(?modifier, version, "project structure updated");
        self.persist_if_enabled().await;
    }

    /// Optimistic update used by the Context agent when applying an
    /// incremental file registration against a version the caller already
    /// observed.
    pub async fn update_project_structure_if_version(
        &self,
        expected_version: u64,
        f: impl FnOnce(&mut Option<ProjectStructure>),
        modifier: Option<&str>,
    ) -> bool {
        let applied = self
            .project_structure
            .update_if_version(expected_version, f, modifier);
        if applied {
            self.bump_version();
            self.persist_if_enabled().await;
        }
        applied
    }

    pub async fn add_security_finding(&self, finding: SecurityFinding) {
        self.security_findings.write().push(finding);
        self.bump_version();
    }

    pub async fn get_security_findings(&self) -> Vec<SecurityFinding> {
        self.security_findings.read().clone()
    }

    pub async fn clear_security_findings(&self) {
        self.security_findings.write().clear();
        self.bump_version();
    }

    pub async fn add_compliance_finding(&self, finding: ComplianceFinding) {
        self.compliance_findings.write().push(finding);
        self.bump_version();
    }

    pub async fn get_compliance_findings(&self) -> Vec<ComplianceFinding> {
        self.compliance_findings.read().clone()
    }

    pub async fn clear_compliance_findings(&self) {
        self.compliance_findings.write().clear();
        self.bump_version();
    }

    pub async fn set_relevant_summaries(&self, summaries: Vec<String>) {
        *self.relevant_summaries.write() = summaries;
        self.bump_version();
    }

    pub async fn get_relevant_summaries(&self) -> Vec<String> {
        self.relevant_summaries.read().clone()
    }

    pub async fn to_snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            project_structure: self.project_structure.get(),
            security_findings: self.security_findings.read().clone(),
            compliance_findings: self.compliance_findings.read().clone(),
            relevant_summaries: self.relevant_summaries.read().clone(),
            workspace_path: self.workspace_path(),
            session_started: self.session_started,
            version: self.version(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omni_types::Severity;

    #[tokio::test]
    async fn field_mutations_bump_the_shared_version_independently() {
        let ctx = SharedContext::new(Some("/workspace".to_string()));
        assert_eq!(ctx.version(), 0);

        ctx.add_security_finding(SecurityFinding {
            category: "secrets".to_string(),
            severity: Severity::High,
            message: "hardcoded secret".to_string(),
            path: "src/lib.rs".to_string(),
            line_start: 1,
            line_end: None,
            evidence: None,
        })
        .await;
        assert_eq!(ctx.version(), 1);

        ctx.set_relevant_summaries(vec!["a".to_string()]).await;
        assert_eq!(ctx.version(), 2);

        let snapshot = ctx.to_snapshot().await;
        assert_eq!(snapshot.security_findings.len(), 1);
        assert_eq!(snapshot.relevant_summaries, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn set_project_structure_persists_and_a_fresh_context_loads_it() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().to_string_lossy().to_string();

        let ctx = SharedContext::new(Some(workspace.clone()));
        let mut structure = ProjectStructure::default();
        structure.project_type = omni_types::ProjectType::Backend;
        ctx.set_project_structure(structure, Some("test")).await;

        let restored = SharedContext::new(None);
        restored.set_workspace(workspace, true).await;
        let loaded = restored.get_project_structure().await.unwrap();
        assert_eq!(loaded.project_type, omni_types::ProjectType::Backend);
    }

    #[tokio::test]
    async fn persistence_disabled_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().to_string_lossy().to_string();

        let ctx = SharedContext::with_persistence(Some(workspace.clone()), false);
        ctx.set_project_structure(ProjectStructure::default(), None).await;

        assert!(!dir.path().join(".omni/context/project-structure.json").exists());
    }
}
