use serde::Serialize;

use omni_types::{ComplianceFinding, SecurityFinding};

/// Outcome of one `analyze_workspace`/`analyze_file` run.
#[derive(Debug, Clone, Serialize, Default)]
pub struct WorkflowResult {
    pub success: bool,
    pub context_summary: String,
    pub rag_indexed_count: usize,
    pub security_findings: Vec<SecurityFinding>,
    pub compliance_findings: Vec<ComplianceFinding>,
    pub total_issues: usize,
    pub elapsed_ms: u128,
    pub errors: Vec<String>,
}

impl WorkflowResult {
    pub fn recompute_total_issues(&mut self) {
        self.total_issues = self.security_findings.len() + self.compliance_findings.len();
    }
}
