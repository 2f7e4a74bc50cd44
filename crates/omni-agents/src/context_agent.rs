use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use omni_context::SharedContext;
use omni_errors::{ErrorKind, OmniError, Result};
use omni_providers::{FileAnalyzer, HeuristicFileAnalyzer};
use omni_types::{
    AgentCapability, AgentMessage, AgentMessageKind, AgentMetadata, AgentStatus, ComplianceFinding,
    FileSummary, ImportSet, ProjectStructure, ProjectType, SecurityFinding,
};
use parking_lot::RwLock;
use regex::Regex;

use crate::contract::{Agent, StatusCell};

/// Closed set of task-intent verbs the Context agent recognizes in user
/// messages; anything else leaves `task_intent` unset.
const INTENT_PATTERNS: &[(&str, &str)] = &[
    ("implement", r"\b(implement|build|create|add)\b"),
    ("fix", r"\b(fix|resolve|repair|debug)\b"),
    ("refactor", r"\b(refactor|clean up|restructure)\b"),
    ("test", r"\b(test|verify|validate)\b"),
    ("explain", r"\b(explain|describe|what does|how does)\b"),
    ("review", r"\b(review|check|audit)\b"),
    ("remove", r"\b(remove|delete|drop)\b"),
    ("optimize", r"\b(optimize|speed up|improve performance)\b"),
];

const SECURITY_KEYWORDS: &[&str] = &["password", "secret", "token", "api key", "vulnerability", "exploit", "injection"];
const COMPLIANCE_KEYWORDS: &[&str] = &["gdpr", "hipaa", "pci", "compliance", "regulation", "personal data"];

const BACKEND_EXTENSIONS: &[&str] = &["py", "go", "rs", "java", "rb", "php"];
const FRONTEND_EXTENSIONS: &[&str] = &["tsx", "jsx", "vue", "svelte"];
const BACKEND_MARKERS: &[&str] = &["backend/", "server/", "api/", "services/", "models/"];
const FRONTEND_MARKERS: &[&str] = &["frontend/", "client/", "src/", "components/", "views/", "pages/"];

const BACKEND_FRAMEWORK_TOKENS: &[(&str, &str)] = &[
    ("flask", "Flask"),
    ("django", "Django"),
    ("fastapi", "FastAPI"),
    ("express", "Express"),
    ("spring", "Spring"),
    ("actix", "Actix"),
    ("axum", "Axum"),
];
const FRONTEND_FRAMEWORK_TOKENS: &[(&str, &str)] = &[
    ("react", "React"),
    ("vue", "Vue"),
    ("svelte", "Svelte"),
    ("angular", "Angular"),
];
const DATABASE_TOKENS: &[(&str, &str)] = &[
    ("postgres", "PostgreSQL"),
    ("mysql", "MySQL"),
    ("mongodb", "MongoDB"),
    ("sqlite", "SQLite"),
    ("redis", "Redis"),
];

/// Facts extracted from one message: filename mentions, error mentions, and
/// keyword proximity to the security/compliance domains, plus the detected
/// task intent (user messages only).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExtractedFacts {
    pub filenames: Vec<String>,
    pub error_mentions: Vec<String>,
    pub security_keywords: Vec<String>,
    pub compliance_keywords: Vec<String>,
    pub task_intent: Option<String>,
}

fn filename_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w./-]+\.[A-Za-z]{1,5}\b").unwrap())
}

fn error_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(error|exception|traceback|failed|failure)\b").unwrap())
}

pub fn extract_facts(content: &str, is_user_message: bool) -> ExtractedFacts {
    let lower = content.to_lowercase();
    let filenames = filename_pattern()
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect();
    let error_mentions = error_pattern()
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect();
    let security_keywords = SECURITY_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .map(|s| s.to_string())
        .collect();
    let compliance_keywords = COMPLIANCE_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .map(|s| s.to_string())
        .collect();

    let task_intent = if is_user_message {
        INTENT_PATTERNS.iter().find_map(|(label, pattern)| {
            Regex::new(pattern)
                .ok()
                .filter(|re| re.is_match(&lower))
                .map(|_| label.to_string())
        })
    } else {
        None
    };

    ExtractedFacts {
        filenames,
        error_mentions,
        security_keywords,
        compliance_keywords,
        task_intent,
    }
}

/// Derives `ProjectType` from the registered file set per the component
/// design's project-type derivation rule.
pub fn derive_project_type(files: &std::collections::BTreeMap<String, FileSummary>) -> ProjectType {
    let backend = files
        .keys()
        .filter(|path| {
            BACKEND_MARKERS.iter().any(|m| path.contains(m))
                || path
                    .rsplit('.')
                    .next()
                    .map(|ext| BACKEND_EXTENSIONS.contains(&ext))
                    .unwrap_or(false)
        })
        .count();
    let frontend = files
        .keys()
        .filter(|path| {
            FRONTEND_MARKERS.iter().any(|m| path.contains(m))
                || path
                    .rsplit('.')
                    .next()
                    .map(|ext| FRONTEND_EXTENSIONS.contains(&ext))
                    .unwrap_or(false)
        })
        .count();

    match (backend > 0, frontend > 0) {
        (true, true) => ProjectType::Fullstack,
        (true, false) => ProjectType::Backend,
        (false, true) => ProjectType::Frontend,
        (false, false) => ProjectType::Unknown,
    }
}

fn latch_token<'a>(current: &Option<String>, content: &str, tokens: &[(&'a str, &'a str)]) -> Option<String> {
    if current.is_some() {
        return current.clone();
    }
    let lower = content.to_lowercase();
    tokens
        .iter()
        .find(|(token, _)| lower.contains(token))
        .map(|(_, label)| label.to_string())
}

/// Thin policy agent that maintains `projectStructure`: extracts facts from
/// every message, derives project type/framework/database from registered
/// files, and persists per-file summaries via the (external) file
/// analyzer. Read-only toward source files; write-only toward the
/// persistence file (handled by `omni-context`/`omni-workflow`, not here).
pub struct ContextAgent {
    metadata: AgentMetadata,
    status: StatusCell,
    file_analyzer: Arc<dyn FileAnalyzer>,
    history: RwLock<Vec<AgentMessage>>,
    max_history_chars: usize,
}

impl ContextAgent {
    pub fn new() -> Self {
        Self::with_analyzer(Arc::new(HeuristicFileAnalyzer))
    }

    pub fn with_analyzer(file_analyzer: Arc<dyn FileAnalyzer>) -> Self {
        Self {
            metadata: AgentMetadata {
                id: "context".to_string(),
                name: "Context Agent".to_string(),
                description: "Maintains the versioned project structure and extracted facts".to_string(),
                version: "1.0.0".to_string(),
                capabilities: vec![AgentCapability::Context],
                dependencies: vec![],
                provides: vec!["project_structure".to_string()],
                tags: vec!["context".to_string()],
            },
            status: StatusCell::new(),
            file_analyzer,
            history: RwLock::new(Vec::new()),
            max_history_chars: 8_000,
        }
    }

    /// Registers (or re-analyzes) a file: analyzes `content`, replaces the
    /// file's `FileSummary` atomically, recomputes project type, and bumps
    /// the shared version. Idempotent for identical `(path, content)` —
    /// see DESIGN.md's open-question decision — by short-circuiting when
    /// the newly computed summary is structurally identical to the stored
    /// one.
    pub async fn register_file(
        &self,
        context: &SharedContext,
        path: &str,
        rel_path: &str,
        content: &str,
        modifier: &str,
    ) -> Result<FileSummary> {
        let analysis = self
            .file_analyzer
            .analyze(path, content)
            .await
            .map_err(|e| OmniError::new(ErrorKind::AgentValidation, e))?;

        let mut summary = FileSummary {
            path: path.to_string(),
            rel_path: rel_path.to_string(),
            language: analysis.language,
            loc: analysis.loc,
            classes: analysis.classes,
            functions: analysis.functions,
            imports: ImportSet {
                internal: analysis.imports_internal,
                external: analysis.imports_external,
            },
            purpose: analysis.purpose,
            responsibilities: analysis.responsibilities,
            security_flags: Vec::new(),
            compliance_flags: Vec::new(),
            last_analyzed: Utc::now(),
        };

        let mut structure = context.get_project_structure().await.unwrap_or_default();
        // `last_analyzed` always differs between calls, so compare against a
        // probe with the existing timestamp substituted in rather than the
        // freshly stamped one.
        let unchanged = structure.files.get(rel_path).is_some_and(|existing| {
            let mut probe = summary.clone();
            probe.last_analyzed = existing.last_analyzed;
            existing == &probe
        });
        if unchanged {
            summary.last_analyzed = structure.files[rel_path].last_analyzed;
        } else {
            structure.files.insert(rel_path.to_string(), summary.clone());
            structure.project_type = derive_project_type(&structure.files);
            structure.backend_framework = latch_token(&structure.backend_framework, content, BACKEND_FRAMEWORK_TOKENS);
            structure.frontend_framework = latch_token(&structure.frontend_framework, content, FRONTEND_FRAMEWORK_TOKENS);
            structure.database = latch_token(&structure.database, content, DATABASE_TOKENS);
            structure.record_change(modifier, format!("registered {rel_path}"));
            context.set_project_structure(structure, Some(modifier)).await;
        }

        Ok(summary)
    }

    /// `registerGeneratedFile`: the Coding agent's published diff content
    /// flows back through here for indexing, same as any other file
    /// registration but tagged with the generating agent as modifier.
    pub async fn register_generated_file(
        &self,
        context: &SharedContext,
        path: &str,
        content: &str,
        modifier: &str,
    ) -> Result<FileSummary> {
        self.register_file(context, path, path, content, modifier).await
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    fn summarize_if_needed(&self) -> Option<String> {
        let mut history = self.history.write();
        let total: usize = history.iter().map(|m| m.content.len()).sum();
        if total <= self.max_history_chars || history.len() < 2 {
            return None;
        }
        let keep_from = history.len().saturating_sub(3);
        let summarized: Vec<String> = history[..keep_from]
            .iter()
            .map(|m| format!("{}: {}", m.sender, truncate(&m.content, 80)))
            .collect();
        let summary = format!("Summary of {} earlier turns: {}", keep_from, summarized.join(" | "));
        let mut compacted = vec![AgentMessage::new(AgentMessageKind::System, "context", summary.clone())];
        compacted.extend(history.split_off(keep_from));
        *history = compacted;
        Some(summary)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max])
    }
}

impl Default for ContextAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ContextAgent {
    fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }

    fn status(&self) -> AgentStatus {
        self.status.get()
    }

    async fn process(&self, message: AgentMessage, context: &SharedContext) -> Result<AgentMessage> {
        self.status.set(AgentStatus::Thinking);

        let is_user_message = message.sender == "user";
        let facts = extract_facts(&message.content, is_user_message);

        if let Some(intent) = &facts.task_intent {
            let mut structure = context.get_project_structure().await.unwrap_or_default();
            let mut conventions = structure.conventions.as_object().cloned().unwrap_or_default();
            conventions.insert("current_task".to_string(), serde_json::json!(intent));
            structure.conventions = serde_json::Value::Object(conventions);
            structure.record_change("context", format!("detected task intent: {intent}"));
            context.set_project_structure(structure, Some("context")).await;
        }

        if let Some(path) = message.metadata.get("generated_file_path").and_then(|v| v.as_str()) {
            let summary = self
                .register_generated_file(context, path, &message.content, &message.sender)
                .await?;
            self.status.set(AgentStatus::Idle);
            return Ok(AgentMessage::new(
                AgentMessageKind::Status,
                &self.metadata.id,
                format!("indexed generated file {path}"),
            )
            .with_metadata(serde_json::json!({ "file_summary": summary })));
        }

        if message.kind == AgentMessageKind::ToolResult || message.kind == AgentMessageKind::System {
            if let Some(findings) = message.metadata.get("security_findings").and_then(|v| v.as_array()) {
                for raw in findings {
                    if let Ok(finding) = serde_json::from_value::<SecurityFinding>(raw.clone()) {
                        context.add_security_finding(finding).await;
                    }
                }
            }
            if let Some(findings) = message.metadata.get("compliance_findings").and_then(|v| v.as_array()) {
                for raw in findings {
                    if let Ok(finding) = serde_json::from_value::<ComplianceFinding>(raw.clone()) {
                        context.add_compliance_finding(finding).await;
                    }
                }
            }
        }

        self.history.write().push(message.clone());
        let summary = self.summarize_if_needed();

        self.status.set(AgentStatus::Idle);
        let mut response = AgentMessage::new(
            AgentMessageKind::Status,
            &self.metadata.id,
            "context updated".to_string(),
        )
        .with_metadata(serde_json::json!({ "facts": facts, "summary": summary }));
        response.recipient = message.recipient;
        Ok(response)
    }

    async fn initialize(&self, _context: &SharedContext) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omni_context::SharedContext;

    #[tokio::test]
    async fn detects_task_intent_from_user_messages_only() {
        let agent = ContextAgent::new();
        let ctx = SharedContext::new(None);
        let user_msg = AgentMessage::new(AgentMessageKind::Text, "user", "please fix the login bug");
        agent.process(user_msg, &ctx).await.unwrap();

        let structure = ctx.get_project_structure().await.unwrap();
        assert_eq!(
            structure.conventions.get("current_task").and_then(|v| v.as_str()),
            Some("fix")
        );
    }

    #[tokio::test]
    async fn register_file_is_idempotent_on_identical_content() {
        let agent = ContextAgent::new();
        let ctx = SharedContext::new(None);
        agent
            .register_file(&ctx, "/ws/a.py", "a.py", "def f():\n    pass\n", "tester")
            .await
            .unwrap();
        let version_after_first = ctx.get_project_structure().await.unwrap().version;

        agent
            .register_file(&ctx, "/ws/a.py", "a.py", "def f():\n    pass\n", "tester")
            .await
            .unwrap();
        let version_after_second = ctx.get_project_structure().await.unwrap().version;

        assert_eq!(version_after_first, version_after_second);
    }

    #[test]
    fn project_type_derivation_detects_fullstack() {
        use std::collections::BTreeMap;
        let mut files = BTreeMap::new();
        files.insert(
            "backend/api/main.py".to_string(),
            FileSummary {
                path: "backend/api/main.py".to_string(),
                rel_path: "backend/api/main.py".to_string(),
                language: "python".to_string(),
                loc: 1,
                classes: vec![],
                functions: vec![],
                imports: ImportSet::default(),
                purpose: String::new(),
                responsibilities: vec![],
                security_flags: vec![],
                compliance_flags: vec![],
                last_analyzed: Utc::now(),
            },
        );
        files.insert(
            "frontend/src/App.tsx".to_string(),
            FileSummary {
                path: "frontend/src/App.tsx".to_string(),
                rel_path: "frontend/src/App.tsx".to_string(),
                language: "tsx".to_string(),
                loc: 1,
                classes: vec![],
                functions: vec![],
                imports: ImportSet::default(),
                purpose: String::new(),
                responsibilities: vec![],
                security_flags: vec![],
                compliance_flags: vec![],
                last_analyzed: Utc::now(),
            },
        );
        assert_eq!(derive_project_type(&files), ProjectType::Fullstack);
    }
}
