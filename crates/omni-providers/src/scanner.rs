use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::rules::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSeverity {
    Error,
    Warning,
    Info,
}

/// One machine-readable finding from the external static-analysis scanner,
/// before the Security agent normalizes it (scanner-error -> high,
/// warning -> medium, info -> low).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFinding {
    pub rule_id: String,
    pub message: String,
    pub severity: ScanSeverity,
    pub path: String,
    pub line_start: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<usize>,
}

/// The static-analysis scanner collaborator: invoked as an external process
/// against a path plus a rule list, out of scope for this specification.
#[async_trait]
pub trait StaticAnalysisScanner: Send + Sync {
    async fn scan(&self, path: &str, rules: &[Rule]) -> Result<Vec<ScanFinding>, String>;
}

/// A scanner that is always configured but never finds anything, used when
/// `security.scanner.enabled` is false or no real scanner is wired up.
pub struct NoopScanner;

#[async_trait]
impl StaticAnalysisScanner for NoopScanner {
    async fn scan(&self, _path: &str, _rules: &[Rule]) -> Result<Vec<ScanFinding>, String> {
        Ok(Vec::new())
    }
}
