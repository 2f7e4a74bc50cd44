use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A security finding produced by the Security agent's pattern checks or the
/// external static-analysis scanner (normalized to a shared severity scale).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub category: String,
    pub severity: Severity,
    pub message: String,
    pub path: String,
    pub line_start: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// A compliance finding tied to a regulation and a rule id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceFinding {
    pub regulation: String,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub path: String,
    pub line_start: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// Either finding kind, used where the two are aggregated uniformly (e.g.
/// the workflow result's flattened issue list).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Security(SecurityFinding),
    Compliance(ComplianceFinding),
}

impl Finding {
    pub fn severity(&self) -> Severity {
        match self {
            Finding::Security(f) => f.severity,
            Finding::Compliance(f) => f.severity,
        }
    }
}
