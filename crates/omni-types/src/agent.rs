use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inter-agent message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMessageKind {
    Text,
    ToolCall,
    ToolResult,
    System,
    Error,
    Status,
}

/// One inter-agent unit: `{id, kind, content, sender, recipient?, metadata, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub kind: AgentMessageKind,
    pub content: String,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(kind: AgentMessageKind, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            sender: sender.into(),
            recipient: None,
            metadata: Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn error(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(AgentMessageKind::Error, sender, content)
    }
}

/// Capability tags the orchestrator matches agents on instead of probing
/// attributes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCapability {
    AcceptsLlm,
    AcceptsContext,
    AcceptsRetrieval,
    Context,
    Retrieval,
    Security,
    Compliance,
    Coding,
}

/// Immutable-after-registration agent metadata. `dependencies` and
/// `provides` feed the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<AgentCapability>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AgentMetadata {
    pub fn has_capability(&self, cap: AgentCapability) -> bool {
        self.capabilities.contains(&cap)
    }
}

/// Mutable per-instance runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Thinking,
    Executing,
    Waiting,
    Error,
    Stopped,
}
