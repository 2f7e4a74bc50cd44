use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use omni_context::SharedContext;
use omni_errors::Result;
use omni_providers::{NoopScanner, ScanSeverity, StaticAnalysisScanner};
use omni_types::{
    AgentCapability, AgentMessage, AgentMessageKind, AgentMetadata, AgentStatus, SecurityFinding, Severity,
};
use regex::Regex;

use crate::contract::{Agent, StatusCell};

/// One fast regex check. `category` and `severity` feed the finding
/// directly; `evidence_group` selects which capture group (if any) is
/// reported as evidence, bounded to a short snippet.
struct PatternCheck {
    category: &'static str,
    severity: Severity,
    message: &'static str,
    pattern: &'static str,
}

fn pattern_checks() -> &'static [PatternCheck] {
    &[
        PatternCheck {
            category: "secrets",
            severity: Severity::Critical,
            message: "hardcoded credential or API key",
            pattern: r#"(?i)(api[_-]?key|secret|password|token)\s*[:=]\s*['"][^'"]+['"]"#,
        },
        PatternCheck {
            category: "code_execution",
            severity: Severity::Critical,
            message: "use of eval()",
            pattern: r"\beval\s*\(",
        },
        PatternCheck {
            category: "code_execution",
            severity: Severity::Critical,
            message: "use of exec()",
            pattern: r"\bexec\s*\(",
        },
        PatternCheck {
            category: "shell_injection",
            severity: Severity::High,
            message: "subprocess invoked with shell=True",
            pattern: r"shell\s*=\s*True",
        },
        PatternCheck {
            category: "sql_injection",
            severity: Severity::High,
            message: "SQL query built via string formatting",
            pattern: r#"(?i)(execute|query)\s*\(\s*f?['"].*\{.*\}.*['"]"#,
        },
        PatternCheck {
            category: "xss",
            severity: Severity::Medium,
            message: "assignment to innerHTML",
            pattern: r"\.innerHTML\s*=",
        },
        PatternCheck {
            category: "xss",
            severity: Severity::Medium,
            message: "use of dangerouslySetInnerHTML",
            pattern: r"dangerouslySetInnerHTML",
        },
    ]
}

fn normalize_severity(severity: ScanSeverity) -> Severity {
    match severity {
        ScanSeverity::Error => Severity::High,
        ScanSeverity::Warning => Severity::Medium,
        ScanSeverity::Info => Severity::Low,
    }
}

/// Runs the closed set of fast regex checks over `content`, line by line.
pub fn validate_code(content: &str, path: &str) -> Vec<SecurityFinding> {
    let mut findings = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        for check in pattern_checks() {
            let re = Regex::new(check.pattern).expect("static pattern is valid");
            if re.is_match(line) {
                findings.push(SecurityFinding {
                    category: check.category.to_string(),
                    severity: check.severity,
                    message: check.message.to_string(),
                    path: path.to_string(),
                    line_start: line_no + 1,
                    line_end: None,
                    evidence: Some(line.trim().chars().take(160).collect()),
                });
            }
        }
    }
    findings
}

/// Scans static-analysis findings that can be applied against `path` under
/// `rules`, normalizing the scanner's severity into the shared `Severity`
/// scale.
pub struct SecurityAgent {
    metadata: AgentMetadata,
    status: StatusCell,
    scanner: Arc<dyn StaticAnalysisScanner>,
    scanner_enabled: bool,
}

impl SecurityAgent {
    pub fn new() -> Self {
        Self::with_scanner(Arc::new(NoopScanner), false)
    }

    pub fn with_scanner(scanner: Arc<dyn StaticAnalysisScanner>, scanner_enabled: bool) -> Self {
        Self {
            metadata: AgentMetadata {
                id: "security".to_string(),
                name: "Security Agent".to_string(),
                description: "Flags hardcoded secrets, unsafe execution, and injection patterns".to_string(),
                version: "1.0.0".to_string(),
                capabilities: vec![AgentCapability::Security, AgentCapability::AcceptsContext],
                dependencies: vec!["context".to_string()],
                provides: vec!["security_findings".to_string()],
                tags: vec!["security".to_string()],
            },
            status: StatusCell::new(),
            scanner,
            scanner_enabled,
        }
    }

    /// Walks the filesystem tree rooted at `root`, applying `validate_code`
    /// (and, if enabled, the external scanner) to every regular file.
    pub async fn analyze(&self, root: &Path) -> Vec<SecurityFinding> {
        let mut findings = Vec::new();
        let mut walker = ignore::WalkBuilder::new(root).build();
        while let Some(Ok(entry)) = walker.next() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            let Ok(content) = tokio::fs::read_to_string(path).await else {
                continue;
            };
            let path_str = path.to_string_lossy().to_string();
            findings.extend(validate_code(&content, &path_str));

            if self.scanner_enabled {
                if let Ok(scan_findings) = self.scanner.scan(&path_str, &[]).await {
                    for f in scan_findings {
                        findings.push(SecurityFinding {
                            category: format!("scanner:{}", f.rule_id),
                            severity: normalize_severity(f.severity),
                            message: f.message,
                            path: f.path,
                            line_start: f.line_start,
                            line_end: f.line_end,
                            evidence: None,
                        });
                    }
                }
            }
        }
        findings
    }
}

impl Default for SecurityAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for SecurityAgent {
    fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }

    fn status(&self) -> AgentStatus {
        self.status.get()
    }

    async fn process(&self, message: AgentMessage, context: &SharedContext) -> Result<AgentMessage> {
        self.status.set(AgentStatus::Executing);

        let path = message
            .metadata
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or("<inline>")
            .to_string();
        let findings = validate_code(&message.content, &path);

        for finding in &findings {
            context.add_security_finding(finding.clone()).await;
        }

        self.status.set(AgentStatus::Idle);
        let approved = findings.iter().all(|f| f.severity < Severity::High);
        Ok(AgentMessage::new(
            AgentMessageKind::ToolResult,
            &self.metadata.id,
            format!("{} security finding(s)", findings.len()),
        )
        .with_metadata(serde_json::json!({
            "approved": approved,
            "security_findings": findings,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_hardcoded_secret() {
        let findings = validate_code("api_key = \"sk-abcdefgh12345678\"", "config.py");
        assert!(findings.iter().any(|f| f.category == "secrets"));
    }

    #[test]
    fn hardcoded_secret_matches_the_single_critical_finding_contract() {
        let findings = validate_code("api_key = \"sk-xxx\"\n", "auth.py");
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.category, "secrets");
        assert_eq!(finding.line_start, 1);
    }

    #[test]
    fn detects_eval_and_inner_html() {
        let findings = validate_code("eval(userInput)\nel.innerHTML = data;", "app.js");
        assert!(findings.iter().any(|f| f.category == "code_execution"));
        assert!(findings.iter().any(|f| f.category == "xss"));
    }

    #[tokio::test]
    async fn process_records_findings_into_shared_context() {
        let agent = SecurityAgent::new();
        let ctx = SharedContext::new(None);
        let msg = AgentMessage::new(AgentMessageKind::Text, "user", "eval(x)")
            .with_metadata(serde_json::json!({ "path": "a.js" }));
        agent.process(msg, &ctx).await.unwrap();
        assert_eq!(ctx.get_security_findings().await.len(), 1);
    }
}
