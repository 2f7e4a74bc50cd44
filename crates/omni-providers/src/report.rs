use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use omni_types::{ComplianceFinding, ProjectStructure, SecurityFinding};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// The aggregated shape a workflow run hands to the report renderer: enough
/// of the workspace's derived state to regenerate every markdown file under
/// `.omni/`, without this crate depending on `omni-workflow`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub project_structure: ProjectStructure,
    pub security_findings: Vec<SecurityFinding>,
    pub compliance_findings: Vec<ComplianceFinding>,
    pub rag_indexed_count: usize,
    pub generated_at: DateTime<Utc>,
}

/// Writes the markdown files listed in the filesystem-layout section under
/// `<workspace>/.omni/` and `<workspace>/.github/copilot-instructions.md`.
/// `project-structure.json` remains the authoritative machine-readable
/// state (persisted separately by `omni-context`); these are derived views.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, workspace_root: &Path, report: &WorkflowReport) -> Result<(), String>;
}

pub struct MarkdownReportRenderer;

impl MarkdownReportRenderer {
    fn project_overview(report: &WorkflowReport) -> String {
        let ps = &report.project_structure;
        format!(
            "# Project Overview\n\n- Type: {:?}\n- Files indexed: {}\n- Version: {}\n- Generated: {}\n",
            ps.project_type,
            ps.files.len(),
            ps.version,
            report.generated_at.to_rfc3339(),
        )
    }

    fn file_summaries(report: &WorkflowReport) -> String {
        let mut out = String::from("# File Summaries\n\n");
        for summary in report.project_structure.files.values() {
            out.push_str(&format!(
                "## {}\n- language: {}\n- loc: {}\n- purpose: {}\n\n",
                summary.rel_path, summary.language, summary.loc, summary.purpose
            ));
        }
        out
    }

    fn component_map(report: &WorkflowReport) -> String {
        let mut out = String::from("# Component Map\n\n");
        for summary in report.project_structure.files.values() {
            for class in &summary.classes {
                out.push_str(&format!("- `{class}` in {}\n", summary.rel_path));
            }
        }
        out
    }

    fn interfaces_and_apis(report: &WorkflowReport) -> String {
        let mut out = String::from("# Interfaces & APIs\n\n");
        for pattern in &report.project_structure.api_patterns {
            out.push_str(&format!("- {pattern}\n"));
        }
        out
    }

    fn data_model(report: &WorkflowReport) -> String {
        format!(
            "# Data Model\n\nDatabase: {}\n",
            report.project_structure.database.clone().unwrap_or_else(|| "none detected".to_string())
        )
    }

    fn domain_patterns(report: &WorkflowReport) -> String {
        let mut out = String::from("# Domain Patterns\n\n");
        for feature in &report.project_structure.completed_features {
            out.push_str(&format!("- {feature}\n"));
        }
        out
    }

    fn hotspots(report: &WorkflowReport) -> String {
        let mut flagged: Vec<_> = report
            .project_structure
            .files
            .values()
            .filter(|f| !f.security_flags.is_empty() || !f.compliance_flags.is_empty())
            .collect();
        flagged.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        let mut out = String::from("# Hotspots\n\n");
        for file in flagged {
            out.push_str(&format!(
                "- {}: security={:?} compliance={:?}\n",
                file.rel_path, file.security_flags, file.compliance_flags
            ));
        }
        out
    }

    fn quick_reference(report: &WorkflowReport) -> String {
        format!(
            "# Quick Reference\n\n- {} files, {} security findings, {} compliance findings\n",
            report.project_structure.files.len(),
            report.security_findings.len(),
            report.compliance_findings.len(),
        )
    }

    fn security_insights(report: &WorkflowReport) -> String {
        let mut out = String::from("# Security Insights\n\n");
        for finding in &report.security_findings {
            out.push_str(&format!(
                "- [{:?}] {} ({}:{})\n",
                finding.severity, finding.message, finding.path, finding.line_start
            ));
        }
        out
    }

    fn compliance_insights(report: &WorkflowReport) -> String {
        let mut out = String::from("# Compliance Insights\n\n");
        for finding in &report.compliance_findings {
            out.push_str(&format!(
                "- [{}] {} ({}:{})\n",
                finding.regulation, finding.message, finding.path, finding.line_start
            ));
        }
        out
    }

    fn copilot_instructions(report: &WorkflowReport) -> String {
        format!(
            "# Copilot Instructions\n\nGenerated from workspace analysis (version {}). \
            See `.omni/context/project-overview.md` for the full summary.\n",
            report.project_structure.version
        )
    }
}

#[async_trait]
impl ReportRenderer for MarkdownReportRenderer {
    async fn render(&self, workspace_root: &Path, report: &WorkflowReport) -> Result<(), String> {
        let context_dir = workspace_root.join(".omni/context");
        let insights_dir = workspace_root.join(".omni/insights");
        let github_dir = workspace_root.join(".github");
        for dir in [&context_dir, &insights_dir, &github_dir] {
            fs::create_dir_all(dir).await.map_err(|e| e.to_string())?;
        }

        let writes: Vec<(std::path::PathBuf, String)> = vec![
            (context_dir.join("project-overview.md"), Self::project_overview(report)),
            (context_dir.join("file-summaries.md"), Self::file_summaries(report)),
            (context_dir.join("component-map.md"), Self::component_map(report)),
            (context_dir.join("interfaces-and-apis.md"), Self::interfaces_and_apis(report)),
            (context_dir.join("data-model.md"), Self::data_model(report)),
            (context_dir.join("domain-patterns.md"), Self::domain_patterns(report)),
            (context_dir.join("hotspots.md"), Self::hotspots(report)),
            (context_dir.join("quick-reference.md"), Self::quick_reference(report)),
            (insights_dir.join("security.md"), Self::security_insights(report)),
            (insights_dir.join("compliance.md"), Self::compliance_insights(report)),
            (github_dir.join("copilot-instructions.md"), Self::copilot_instructions(report)),
        ];

        for (path, content) in writes {
            fs::write(path, content).await.map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omni_types::ProjectStructure;
    use uuid::Uuid;

    #[tokio::test]
    async fn renders_every_file_under_dot_omni() {
        let root = std::env::temp_dir().join(format!("omni-report-test-{}", Uuid::new_v4()));
        let report = WorkflowReport {
            project_structure: ProjectStructure::default(),
            security_findings: Vec::new(),
            compliance_findings: Vec::new(),
            rag_indexed_count: 0,
            generated_at: Utc::now(),
        };
        MarkdownReportRenderer.render(&root, &report).await.unwrap();
        assert!(root.join(".omni/context/project-overview.md").exists());
        assert!(root.join(".omni/insights/security.md").exists());
        assert!(root.join(".github/copilot-instructions.md").exists());
    }
}
