use serde::Serialize;
use serde_json::Value;

use omni_errors::{ErrorKind, OmniError};
use omni_types::AgentMessage;

/// One validator's contribution to a [`ValidationResult`]. Built
/// independently from its own `send_to_agent` outcome so a timeout or
/// error on one branch never masks the other branch's findings.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationBranch {
    pub valid: bool,
    pub issues: Vec<Value>,
    pub issue_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_count: Option<usize>,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Combined Security + Compliance verdict for one `validate_code` call.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub approved: bool,
    pub security: ValidationBranch,
    pub compliance: ValidationBranch,
    pub project_context: String,
    pub summary: String,
}

fn count_severity(issues: &[Value], severity: &str) -> usize {
    issues
        .iter()
        .filter(|issue| issue.get("severity").and_then(|s| s.as_str()) == Some(severity))
        .count()
}

/// Builds a branch from a validator agent's `send_to_agent` outcome.
/// `findings_key` is the metadata key the agent stores its findings array
/// under (`security_findings` or `compliance_findings`).
pub fn branch_from_result(result: Result<AgentMessage, OmniError>, findings_key: &str) -> ValidationBranch {
    match result {
        Ok(message) => {
            let approved = message
                .metadata
                .get("approved")
                .and_then(|v| v.as_bool())
                .unwrap_or(true);
            let issues = message
                .metadata
                .get(findings_key)
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            ValidationBranch {
                valid: approved,
                critical_count: Some(count_severity(&issues, "critical")),
                high_count: Some(count_severity(&issues, "high")),
                issue_count: issues.len(),
                issues,
                timed_out: false,
                error: None,
            }
        }
        Err(err) => ValidationBranch {
            valid: false,
            issues: Vec::new(),
            issue_count: 0,
            critical_count: None,
            high_count: None,
            timed_out: err.kind == ErrorKind::AgentTimeout,
            error: Some(err.message),
        },
    }
}
