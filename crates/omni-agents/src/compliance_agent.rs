use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use glob::Pattern;
use omni_context::SharedContext;
use omni_errors::{ErrorKind, OmniError, Result};
use omni_providers::{JsonYamlRuleParser, Rule, RuleFileParser};
use omni_types::{AgentCapability, AgentMessage, AgentMessageKind, AgentMetadata, AgentStatus, ComplianceFinding, Severity};
use parking_lot::RwLock;
use regex::Regex;

use crate::contract::{Agent, StatusCell};

/// Sensitive-data categories the built-in detector recognizes, keyed by the
/// keyword regexes that flag each category present in a piece of content.
const DATA_TYPE_KEYWORDS: &[(&str, &[&str])] = &[
    ("personal_data", &["email", "name", "address", "phone", "birth"]),
    ("financial_data", &["credit_card", "payment", "bank", "account_number"]),
    ("health_data", &["patient", "medical", "health", "diagnosis", "prescription"]),
    ("authentication", &["password", "token", "auth", "session", "login"]),
];

/// Detects which sensitive-data categories a piece of content touches, by
/// case-insensitive keyword search across personal, financial, health, and
/// authentication data.
fn detect_data_types(content: &str) -> Vec<&'static str> {
    let lower = content.to_lowercase();
    DATA_TYPE_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(data_type, _)| *data_type)
        .collect()
}

fn line_of_first_match(content: &str, re: &Regex) -> usize {
    content.lines().position(|l| re.is_match(l)).map(|i| i + 1).unwrap_or(1)
}

/// GDPR checks: consent required when personal data is handled, and a
/// critical finding when personal data may be written to logs.
fn gdpr_findings(content: &str, path: &str) -> Vec<ComplianceFinding> {
    let mut findings = Vec::new();
    let personal = Regex::new(r"(?i)(email|personal|user_data)").unwrap();
    let consent = Regex::new(r"(?i)consent").unwrap();
    if personal.is_match(content) && !consent.is_match(content) {
        findings.push(ComplianceFinding {
            regulation: "GDPR".to_string(),
            rule_id: "GDPR-CONSENT".to_string(),
            severity: Severity::High,
            message: "personal data handling without explicit consent check".to_string(),
            path: path.to_string(),
            line_start: line_of_first_match(content, &personal),
            line_end: None,
            evidence: None,
        });
    }

    let logging = Regex::new(r"(?i)(log|print|console)\s*\([^)]*\b(email|password|name)\b").unwrap();
    if logging.is_match(content) {
        findings.push(ComplianceFinding {
            regulation: "GDPR".to_string(),
            rule_id: "GDPR-LOGGING".to_string(),
            severity: Severity::Critical,
            message: "personal data may be exposed in logs".to_string(),
            path: path.to_string(),
            line_start: line_of_first_match(content, &logging),
            line_end: None,
            evidence: None,
        });
    }
    findings
}

/// HIPAA check: health data referenced without visible encryption/hashing.
fn hipaa_findings(content: &str, path: &str) -> Vec<ComplianceFinding> {
    let health = Regex::new(r"(?i)(patient|medical|health)").unwrap();
    let encrypted = Regex::new(r"(?i)(encrypt|hash|bcrypt)").unwrap();
    if health.is_match(content) && !encrypted.is_match(content) {
        vec![ComplianceFinding {
            regulation: "HIPAA".to_string(),
            rule_id: "HIPAA-ENCRYPT".to_string(),
            severity: Severity::High,
            message: "health data should be encrypted".to_string(),
            path: path.to_string(),
            line_start: line_of_first_match(content, &health),
            line_end: None,
            evidence: None,
        }]
    } else {
        Vec::new()
    }
}

/// PCI-DSS check: any card-data reference is flagged for manual review.
fn pci_findings(content: &str, path: &str) -> Vec<ComplianceFinding> {
    let card = Regex::new(r"(?i)(credit_card|card_number|cvv)").unwrap();
    if card.is_match(content) {
        vec![ComplianceFinding {
            regulation: "PCI-DSS".to_string(),
            rule_id: "PCI-STORAGE".to_string(),
            severity: Severity::Critical,
            message: "credit card data handling detected - requires PCI compliance review".to_string(),
            path: path.to_string(),
            line_start: line_of_first_match(content, &card),
            line_end: None,
            evidence: None,
        }]
    } else {
        Vec::new()
    }
}

/// Authentication best-practice check: password handling without a visible
/// hashing call.
fn auth_findings(content: &str, path: &str) -> Vec<ComplianceFinding> {
    let password = Regex::new(r"(?i)password").unwrap();
    let hashed = Regex::new(r"(?i)(bcrypt|argon|pbkdf|hash)").unwrap();
    if password.is_match(content) && !hashed.is_match(content) {
        vec![ComplianceFinding {
            regulation: "Security Best Practice".to_string(),
            rule_id: "AUTH-HASH".to_string(),
            severity: Severity::High,
            message: "password handling without visible hashing".to_string(),
            path: path.to_string(),
            line_start: line_of_first_match(content, &password),
            line_end: None,
            evidence: None,
        }]
    } else {
        Vec::new()
    }
}

fn severity_from_str(raw: &str) -> Severity {
    match raw.to_lowercase().as_str() {
        "critical" => Severity::Critical,
        "high" => Severity::High,
        "medium" => Severity::Medium,
        _ => Severity::Low,
    }
}

/// Detects sensitive-data categories via keyword proximity and applies the
/// built-in regulation-keyed rules plus any custom rules loaded from the
/// configured rule directories.
pub struct ComplianceAgent {
    metadata: AgentMetadata,
    status: StatusCell,
    rule_parser: Arc<dyn RuleFileParser>,
    custom_rules: RwLock<Vec<Rule>>,
}

impl ComplianceAgent {
    pub fn new() -> Self {
        Self::with_parser(Arc::new(JsonYamlRuleParser))
    }

    pub fn with_parser(rule_parser: Arc<dyn RuleFileParser>) -> Self {
        Self {
            metadata: AgentMetadata {
                id: "compliance".to_string(),
                name: "Compliance Agent".to_string(),
                description: "Flags sensitive data handling against regulation-keyed rules".to_string(),
                version: "1.0.0".to_string(),
                capabilities: vec![AgentCapability::Compliance, AgentCapability::AcceptsContext],
                dependencies: vec!["context".to_string()],
                provides: vec!["compliance_findings".to_string()],
                tags: vec!["compliance".to_string()],
            },
            status: StatusCell::new(),
            rule_parser,
            custom_rules: RwLock::new(Vec::new()),
        }
    }

    /// Loads custom rules from `dir`, replacing any previously loaded set.
    /// An empty or missing directory legally yields zero rules.
    pub async fn load_rules(&self, dir: &Path) -> Result<usize> {
        let rules = self
            .rule_parser
            .load_dir(dir)
            .await
            .map_err(|e| OmniError::new(ErrorKind::AgentConfiguration, e))?;
        let count = rules.len();
        *self.custom_rules.write() = rules;
        Ok(count)
    }

    /// Runs the regulation-specific check gated on each data type detected
    /// in `content` (mirroring the original's dispatch: GDPR checks only
    /// fire when personal data is present, HIPAA only for health data, etc).
    fn sensitive_data_findings(content: &str, path: &str) -> Vec<ComplianceFinding> {
        let mut findings = Vec::new();
        for data_type in detect_data_types(content) {
            match data_type {
                "personal_data" => findings.extend(gdpr_findings(content, path)),
                "health_data" => findings.extend(hipaa_findings(content, path)),
                "financial_data" => findings.extend(pci_findings(content, path)),
                "authentication" => findings.extend(auth_findings(content, path)),
                _ => {}
            }
        }
        findings
    }

    fn custom_rule_findings(&self, content: &str, path: &str) -> Vec<ComplianceFinding> {
        let mut findings = Vec::new();
        let rules = self.custom_rules.read();
        for rule in rules.iter() {
            if !rule.file_patterns.is_empty() {
                let matches_glob = rule
                    .file_patterns
                    .iter()
                    .filter_map(|p| Pattern::new(p).ok())
                    .any(|p| p.matches(path));
                if !matches_glob {
                    continue;
                }
            }
            for (line_no, line) in content.lines().enumerate() {
                let keyword_hit = !rule.keywords.is_empty()
                    && rule.keywords.iter().any(|kw| line.to_lowercase().contains(&kw.to_lowercase()));
                let pattern_hit = rule.patterns.iter().any(|pattern| {
                    Regex::new(pattern).map(|re| re.is_match(line)).unwrap_or(false)
                });
                if keyword_hit || pattern_hit {
                    findings.push(ComplianceFinding {
                        regulation: rule.regulation.clone().unwrap_or_else(|| "custom".to_string()),
                        rule_id: rule.id.clone(),
                        severity: severity_from_str(&rule.severity),
                        message: rule.name.clone(),
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

    /// `validateCode` equivalent: applies built-in sensitive-data detection
    /// plus any loaded custom rules to one piece of content.
    pub fn validate_code(&self, content: &str, path: &str) -> Vec<ComplianceFinding> {
        let mut findings = Self::sensitive_data_findings(content, path);
        findings.extend(self.custom_rule_findings(content, path));
        findings
    }

    pub async fn analyze(&self, root: &Path) -> Vec<ComplianceFinding> {
        let mut findings = Vec::new();
        let mut walker = ignore::WalkBuilder::new(root).build();
        while let Some(Ok(entry)) = walker.next() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path: PathBuf = entry.path().to_path_buf();
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            findings.extend(self.validate_code(&content, &path.to_string_lossy()));
        }
        findings
    }
}

impl Default for ComplianceAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ComplianceAgent {
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
        let findings = self.validate_code(&message.content, &path);

        for finding in &findings {
            context.add_compliance_finding(finding.clone()).await;
        }

        self.status.set(AgentStatus::Idle);
        let approved = findings.iter().all(|f| f.severity < Severity::High);
        Ok(AgentMessage::new(
            AgentMessageKind::ToolResult,
            &self.metadata.id,
            format!("{} compliance finding(s)", findings.len()),
        )
        .with_metadata(serde_json::json!({
            "approved": approved,
            "compliance_findings": findings,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_personal_data_without_consent() {
        let agent = ComplianceAgent::new();
        let findings = agent.validate_code("def store(email):\n    save(email)\n", "user.py");
        assert!(findings.iter().any(|f| f.regulation == "GDPR" && f.rule_id == "GDPR-CONSENT"));
    }

    #[test]
    fn personal_data_logged_is_critical_gdpr_finding() {
        let agent = ComplianceAgent::new();
        let findings = agent.validate_code("def f(email):\n    print('user', email, password)\n", "u.py");
        let finding = findings
            .iter()
            .find(|f| f.rule_id == "GDPR-LOGGING")
            .expect("expected a GDPR-LOGGING finding");
        assert_eq!(finding.regulation, "GDPR");
        assert_eq!(finding.severity, Severity::Critical);
    }

    #[test]
    fn health_data_without_encryption_is_flagged() {
        let agent = ComplianceAgent::new();
        let findings = agent.validate_code("patient = load_medical_record()\n", "records.py");
        assert!(findings.iter().any(|f| f.regulation == "HIPAA" && f.rule_id == "HIPAA-ENCRYPT"));
    }

    #[test]
    fn card_number_handling_is_critical_pci_finding() {
        let agent = ComplianceAgent::new();
        let findings = agent.validate_code("credit_card = input()\n", "checkout.py");
        let finding = findings
            .iter()
            .find(|f| f.rule_id == "PCI-STORAGE")
            .expect("expected a PCI-STORAGE finding");
        assert_eq!(finding.regulation, "PCI-DSS");
        assert_eq!(finding.severity, Severity::Critical);
    }

    #[test]
    fn unhashed_password_is_flagged() {
        let agent = ComplianceAgent::new();
        let findings = agent.validate_code("def login(password):\n    db.save(password)\n", "auth.py");
        assert!(findings.iter().any(|f| f.rule_id == "AUTH-HASH"));
    }

    #[tokio::test]
    async fn missing_rules_directory_yields_zero_custom_rules() {
        let agent = ComplianceAgent::new();
        let count = agent
            .load_rules(Path::new("/nonexistent/compliance/rules"))
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(agent.custom_rule_findings("irrelevant content", "x.py").is_empty());
    }
}
