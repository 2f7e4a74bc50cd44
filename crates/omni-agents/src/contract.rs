use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use omni_context::SharedContext;
use omni_errors::Result;
use omni_providers::{LlmProvider, VectorStore};
use omni_types::{AgentMessage, AgentMetadata, AgentStatus};

/// The agent contract every implementation satisfies: immutable metadata,
/// an async `process`, optional lifecycle hooks, and optional capability
/// setters the orchestrator uses to wire cross-agent references via typed
/// interfaces rather than runtime attribute probing.
#[async_trait]
pub trait Agent: Send + Sync {
    fn metadata(&self) -> &AgentMetadata;

    fn status(&self) -> AgentStatus;

    /// Processes one inbound message against the shared context, returning
    /// one outbound message. Implementations must update their own status
    /// as they go and never raise outside the `omni_errors` taxonomy.
    async fn process(&self, message: AgentMessage, context: &SharedContext) -> Result<AgentMessage>;

    async fn initialize(&self, _context: &SharedContext) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// Whether this agent accepts an injected LLM handle (capability
    /// `AcceptsLlm`); the orchestrator only calls `set_llm` when this is
    /// true rather than probing.
    fn accepts_llm(&self) -> bool {
        false
    }

    fn set_llm(&self, _llm: Arc<dyn LlmProvider>) {}

    fn accepts_rag(&self) -> bool {
        false
    }

    fn set_rag(&self, _rag: Arc<dyn VectorStore>) {}

    /// Whether this agent wants a reference to the Context agent
    /// (capability `AcceptsContext`).
    fn accepts_context_agent(&self) -> bool {
        false
    }

    fn set_context_agent(&self, _agent: Arc<dyn Agent>) {}

    /// Whether this agent wants a reference to the Retrieval agent
    /// (capability `AcceptsRetrieval`).
    fn accepts_retrieval_agent(&self) -> bool {
        false
    }

    fn set_retrieval_agent(&self, _agent: Arc<dyn Agent>) {}
}

/// Shared, lock-free status cell every agent implementation embeds. Stored
/// as a `u8` so reads never block a concurrent `process` call.
#[derive(Debug, Default)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(AgentStatus::Idle as u8))
    }

    pub fn get(&self) -> AgentStatus {
        match self.0.load(Ordering::SeqCst) {
            0 => AgentStatus::Idle,
            1 => AgentStatus::Thinking,
            2 => AgentStatus::Executing,
            3 => AgentStatus::Waiting,
            4 => AgentStatus::Error,
            _ => AgentStatus::Stopped,
        }
    }

    pub fn set(&self, status: AgentStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }
}

impl Clone for StatusCell {
    fn clone(&self) -> Self {
        Self(AtomicU8::new(self.0.load(Ordering::SeqCst)))
    }
}
