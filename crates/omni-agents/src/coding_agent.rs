use std::sync::Arc;

use async_trait::async_trait;
use glob::Pattern;
use omni_context::SharedContext;
use omni_errors::{ErrorKind, OmniError, Result};
use omni_providers::{ChatMessage, LlmConfig, LlmProvider};
use omni_types::{AgentCapability, AgentMessage, AgentMessageKind, AgentMetadata, AgentStatus};
use parking_lot::RwLock;
use regex::Regex;
use serde::Deserialize;
use similar::TextDiff;

use crate::contract::Agent;
use crate::contract::StatusCell;

/// File paths the Coding agent refuses to produce a diff against,
/// regardless of intent — secrets, credential stores, and VCS internals.
const RESTRICTED_GLOBS: &[&str] = &[
    "**/.env",
    "**/.env.*",
    "**/secrets/**",
    "**/*.pem",
    "**/*.key",
    "**/id_rsa*",
    "**/.git/**",
    "**/.ssh/**",
];

/// Content patterns that make a diff unsafe to hand back regardless of the
/// target file.
const RESTRICTED_DIFF_PATTERNS: &[&str] = &[
    r"rm\s+-rf\s+/",
    r"DROP\s+TABLE",
    r"eval\s*\(",
];

#[derive(Debug, Deserialize)]
struct JsonChangeRequest {
    path: String,
    intent: String,
    #[serde(default)]
    content: Option<String>,
}

struct ChangeRequest {
    path: String,
    intent: String,
    content: Option<String>,
}

fn parse_patch_line(content: &str) -> Option<ChangeRequest> {
    let re = Regex::new(r"(?s)^patch\s+([^:]+):\s*(.+)$").ok()?;
    let caps = re.captures(content.trim())?;
    Some(ChangeRequest {
        path: caps.get(1)?.as_str().trim().to_string(),
        intent: caps.get(2)?.as_str().trim().to_string(),
        content: None,
    })
}

fn parse_request(content: &str) -> Result<ChangeRequest> {
    if let Ok(json) = serde_json::from_str::<JsonChangeRequest>(content) {
        return Ok(ChangeRequest {
            path: json.path,
            intent: json.intent,
            content: json.content,
        });
    }
    parse_patch_line(content)
        .ok_or_else(|| OmniError::validation("expected 'patch <path>: <intent>' or a JSON change request"))
}

fn is_restricted_path(path: &str) -> bool {
    RESTRICTED_GLOBS
        .iter()
        .filter_map(|g| Pattern::new(g).ok())
        .any(|p| p.matches(path))
}

fn contains_restricted_pattern(diff: &str) -> bool {
    RESTRICTED_DIFF_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .any(|re| re.is_match(diff))
}

/// Extremely light `.py` sanity check: balanced brackets only. Not a
/// parser — catches the obvious "the generated content is truncated"
/// failure mode, nothing more.
fn python_syntax_is_plausible(content: &str) -> bool {
    let mut depth = 0i32;
    for ch in content.chars() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

/// Generates unified diffs from an intent, never writing to disk. Rejects
/// restricted targets, restricted diff content, and oversized diffs before
/// returning; successful diffs are republished to the Context and
/// Retrieval agents for indexing.
pub struct CodingAgent {
    metadata: AgentMetadata,
    status: StatusCell,
    llm: RwLock<Option<Arc<dyn LlmProvider>>>,
    context_agent: RwLock<Option<Arc<dyn Agent>>>,
    retrieval_agent: RwLock<Option<Arc<dyn Agent>>>,
    max_diff_lines: usize,
}

impl CodingAgent {
    pub fn new() -> Self {
        Self {
            metadata: AgentMetadata {
                id: "coding".to_string(),
                name: "Coding Agent".to_string(),
                description: "Generates unified-diff patches without writing to disk".to_string(),
                version: "1.0.0".to_string(),
                capabilities: vec![
                    AgentCapability::Coding,
                    AgentCapability::AcceptsLlm,
                    AgentCapability::AcceptsContext,
                    AgentCapability::AcceptsRetrieval,
                ],
                dependencies: vec!["context".to_string(), "retrieval".to_string()],
                provides: vec!["diffs".to_string()],
                tags: vec!["coding".to_string()],
            },
            status: StatusCell::new(),
            llm: RwLock::new(None),
            context_agent: RwLock::new(None),
            retrieval_agent: RwLock::new(None),
            max_diff_lines: 400,
        }
    }

    pub fn with_max_diff_lines(mut self, max_diff_lines: usize) -> Self {
        self.max_diff_lines = max_diff_lines;
        self
    }

    async fn generate_content(&self, path: &str, intent: &str, old_content: &str) -> String {
        if let Some(llm) = self.llm.read().clone() {
            let prompt = format!(
                "Rewrite the full contents of {path} to satisfy this intent: {intent}\n\nCurrent contents:\n{old_content}"
            );
            if let Ok(response) = llm
                .complete(&[ChatMessage { role: "user".to_string(), content: prompt }], &LlmConfig::default())
                .await
            {
                if let Some(content) = response.content {
                    return content;
                }
            }
        }
        format!("{old_content}\n# TODO: {intent}\n")
    }

    async fn read_existing(&self, path: &str) -> String {
        tokio::fs::read_to_string(path).await.unwrap_or_default()
    }

    /// Builds a unified diff for one change request, enforcing every guard
    /// rail before returning it.
    pub async fn generate_patch(&self, request_content: &str, context: &SharedContext) -> Result<String> {
        let request = parse_request(request_content)?;

        if is_restricted_path(&request.path) {
            return Err(OmniError::validation(format!(
                "refusing to patch restricted path '{}'",
                request.path
            )));
        }

        let old_content = self.read_existing(&request.path).await;
        let new_content = match request.content {
            Some(content) => content,
            None => self.generate_content(&request.path, &request.intent, &old_content).await,
        };

        if request.path.ends_with(".py") && !python_syntax_is_plausible(&new_content) {
            return Err(OmniError::validation(format!(
                "generated content for '{}' fails the light syntax check",
                request.path
            )));
        }

        let diff = TextDiff::from_lines(&old_content, &new_content)
            .unified_diff()
            .context_radius(3)
            .header(&request.path, &request.path)
            .to_string();

        let diff_lines = diff.lines().count();
        if diff_lines > self.max_diff_lines {
            return Err(OmniError::new(
                ErrorKind::AgentValidation,
                format!("diff for '{}' has {diff_lines} lines, exceeding the {} line cap", request.path, self.max_diff_lines),
            ));
        }

        if contains_restricted_pattern(&diff) {
            return Err(OmniError::validation(format!(
                "diff for '{}' contains a restricted pattern",
                request.path
            )));
        }

        self.publish_generated_file(&request.path, &new_content, context).await;
        Ok(diff)
    }

    async fn publish_generated_file(&self, path: &str, content: &str, context: &SharedContext) {
        let message = AgentMessage::new(AgentMessageKind::ToolResult, &self.metadata.id, content.to_string())
            .with_metadata(serde_json::json!({ "generated_file_path": path }));

        let context_agent = self.context_agent.read().clone();
        let retrieval_agent = self.retrieval_agent.read().clone();
        if let Some(agent) = context_agent {
            if let Err(err) = agent.process(message.clone(), context).await {
                tracing::warn!(error = %err, path, "failed to publish generated file to context agent");
            }
        }
        if let Some(agent) = retrieval_agent {
            if let Err(err) = agent.process(message, context).await {
                tracing::warn!(error = %err, path, "failed to publish generated file to retrieval agent");
            }
        }
    }
}

impl Default for CodingAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for CodingAgent {
    fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }

    fn status(&self) -> AgentStatus {
        self.status.get()
    }

    async fn process(&self, message: AgentMessage, context: &SharedContext) -> Result<AgentMessage> {
        self.status.set(AgentStatus::Executing);
        let result = self.generate_patch(&message.content, context).await;
        self.status.set(AgentStatus::Idle);

        match result {
            Ok(diff) => Ok(AgentMessage::new(AgentMessageKind::ToolResult, &self.metadata.id, diff)),
            Err(err) => Ok(AgentMessage::error(&self.metadata.id, err.message.clone())
                .with_metadata(serde_json::json!({ "kind": format!("{:?}", err.kind) }))),
        }
    }

    fn accepts_llm(&self) -> bool {
        true
    }

    fn set_llm(&self, llm: Arc<dyn LlmProvider>) {
        *self.llm.write() = Some(llm);
    }

    fn accepts_context_agent(&self) -> bool {
        true
    }

    fn set_context_agent(&self, agent: Arc<dyn Agent>) {
        *self.context_agent.write() = Some(agent);
    }

    fn accepts_retrieval_agent(&self) -> bool {
        true
    }

    fn set_retrieval_agent(&self, agent: Arc<dyn Agent>) {
        *self.retrieval_agent.write() = Some(agent);
    }
}
