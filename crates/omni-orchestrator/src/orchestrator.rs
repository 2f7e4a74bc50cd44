use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use omni_agents::{Agent, AgentRegistry};
use omni_context::SharedContext;
use omni_errors::{run_with_timeout, retry_async, ErrorContext, ErrorKind, OmniError, Result, RetryConfig};
use omni_providers::LlmProvider;
use omni_types::{AgentMessage, AgentMessageKind};
use parking_lot::RwLock;
use serde_json::json;

use crate::history::HistoryRing;
use crate::validate::{branch_from_result, ValidationResult};

const DEFAULT_HISTORY_CAP: usize = 500;
const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns a fixed map of live agent instances plus the cross-references that
/// wire them together, and drives every run pattern (`send_to_agent`,
/// sequential/round-robin/broadcast, `validate_code`, `register_file`) on
/// top of it.
pub struct Orchestrator {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
    registry: AgentRegistry,
    context: Arc<SharedContext>,
    history: RwLock<HistoryRing>,
    agent_timeout: Duration,
}

impl Orchestrator {
    pub fn new(registry: AgentRegistry, context: Arc<SharedContext>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            registry,
            context,
            history: RwLock::new(HistoryRing::new(DEFAULT_HISTORY_CAP)),
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    pub fn context(&self) -> &Arc<SharedContext> {
        &self.context
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.read().keys().cloned().collect()
    }

    pub fn history(&self) -> Vec<AgentMessage> {
        self.history.read().to_vec()
    }

    /// Pulls a fresh instance of `id` from the registry into the live
    /// agent map and re-runs the cross-reference wiring pass so
    /// registration order never matters.
    pub async fn add_agent(&self, id: &str) -> Result<()> {
        let agent = self
            .registry
            .get(id)
            .ok_or_else(|| OmniError::not_found(format!("agent '{id}' is not registered")))?;
        agent.initialize(&self.context).await?;
        self.agents.write().insert(id.to_string(), agent);
        self.rewire();
        Ok(())
    }

    pub fn remove_agent(&self, id: &str) -> bool {
        let removed = self.agents.write().remove(id).is_some();
        if removed {
            self.rewire();
        }
        removed
    }

    /// Re-runs every agent's capability hooks against the current agent
    /// map. Cheap and idempotent, so it is safe to call after every
    /// `add_agent`/`remove_agent` rather than tracking wiring state.
    fn rewire(&self) {
        let agents = self.agents.read().clone();
        let context_agent = agents.get("context").cloned();
        let retrieval_agent = agents.get("retrieval").cloned();
        for agent in agents.values() {
            if agent.accepts_context_agent() {
                if let Some(context_agent) = &context_agent {
                    agent.set_context_agent(context_agent.clone());
                }
            }
            if agent.accepts_retrieval_agent() {
                if let Some(retrieval_agent) = &retrieval_agent {
                    agent.set_retrieval_agent(retrieval_agent.clone());
                }
            }
        }
    }

    /// Sets the LLM handle on every currently-wired agent that accepts one.
    /// Agents added afterwards still need their own `set_llm` call since
    /// the orchestrator keeps no memory of which LLM was last broadcast.
    pub fn set_llm_for_all(&self, llm: Arc<dyn LlmProvider>) {
        for agent in self.agents.read().values() {
            if agent.accepts_llm() {
                agent.set_llm(llm.clone());
            }
        }
    }

    /// Routes one message to agent `id`, bounded by `agent_timeout`.
    /// Failures and timeouts are recorded into history as error messages
    /// and returned as a structured [`OmniError`] rather than panicking.
    pub async fn send_to_agent(&self, id: &str, message: AgentMessage) -> Result<AgentMessage> {
        let agent = self
            .agents
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| OmniError::not_found(format!("agent '{id}' is not wired")))?;

        self.history.write().push(message.clone());

        let outcome = run_with_timeout(
            self.agent_timeout,
            ErrorKind::AgentTimeout,
            agent.process(message, &self.context),
        )
        .await;

        match outcome {
            Ok(Ok(response)) => {
                self.history.write().push(response.clone());
                Ok(response)
            }
            Ok(Err(err)) => {
                let err = err.with_context(ErrorContext::new().agent(id).operation("process"));
                self.history
                    .write()
                    .push(AgentMessage::error(id, err.message.clone()));
                Err(err)
            }
            Err(timeout_err) => {
                let timeout_err = timeout_err.with_context(ErrorContext::new().agent(id).operation("process"));
                self.history
                    .write()
                    .push(AgentMessage::error(id, timeout_err.message.clone()));
                Err(timeout_err)
            }
        }
    }

    /// `send_to_agent` wrapped in exponential-backoff retry, logging every
    /// retry attempt via `tracing`.
    pub async fn send_to_agent_with_retry(
        &self,
        id: &str,
        message: AgentMessage,
        config: &RetryConfig,
    ) -> Result<AgentMessage> {
        retry_async(
            config,
            || self.send_to_agent(id, message.clone()),
            |err, attempt| {
                tracing::info!(agent = id, attempt, error = %err, "retrying send-to-agent");
            },
        )
        .await
    }

    /// Feeds each agent's response as the next agent's input, in `order`,
    /// for up to `max_turns` full passes over `order`. Stops early on the
    /// first error or when `stop` matches the latest response.
    pub async fn run_sequential(
        &self,
        order: &[String],
        max_turns: usize,
        stop: Option<&(dyn Fn(&AgentMessage) -> bool + Sync)>,
    ) -> Result<Vec<AgentMessage>> {
        let mut responses = Vec::new();
        let mut turn_content = String::new();

        'turns: for _turn in 0..max_turns {
            for id in order {
                let request = AgentMessage::new(AgentMessageKind::Text, "orchestrator", turn_content.clone());
                let response = self.send_to_agent(id, request).await?;
                turn_content = response.content.clone();
                let should_stop = stop.map(|f| f(&response)).unwrap_or(false);
                responses.push(response);
                if should_stop {
                    break 'turns;
                }
            }
        }
        Ok(responses)
    }

    /// Specialization of `run_sequential` with no stop predicate: every
    /// agent in `order` gets a turn, `rounds` times over.
    pub async fn run_round_robin(&self, order: &[String], rounds: usize) -> Result<Vec<AgentMessage>> {
        self.run_sequential(order, rounds, None).await
    }

    /// Fans `message` out to every wired agent in parallel. Per-agent
    /// failures become error messages in the result vector rather than
    /// failing the whole broadcast.
    pub async fn run_broadcast(&self, message: AgentMessage) -> Vec<AgentMessage> {
        let ids = self.agent_ids();
        let futures = ids.iter().map(|id| self.send_to_agent(id, message.clone()));
        let results = futures::future::join_all(futures).await;
        ids.into_iter()
            .zip(results)
            .map(|(id, result)| result.unwrap_or_else(|err| AgentMessage::error(id, err.message)))
            .collect()
    }

    /// Runs Security and Compliance validation in parallel over the same
    /// content. Each branch is built independently from its own outcome,
    /// so a timeout or error in one never suppresses the other's result.
    pub async fn validate_code(&self, code: &str, file_path: &str) -> ValidationResult {
        let payload = json!({ "path": file_path });
        let security_message =
            AgentMessage::new(AgentMessageKind::Text, "orchestrator", code.to_string()).with_metadata(payload.clone());
        let compliance_message =
            AgentMessage::new(AgentMessageKind::Text, "orchestrator", code.to_string()).with_metadata(payload);

        let (security_result, compliance_result) = tokio::join!(
            self.send_to_agent("security", security_message),
            self.send_to_agent("compliance", compliance_message),
        );

        let security = branch_from_result(security_result, "security_findings");
        let compliance = branch_from_result(compliance_result, "compliance_findings");
        let approved = security.valid && compliance.valid;

        let project_context = self
            .context
            .get_project_structure()
            .await
            .map(|structure| format!("{:?}", structure.project_type))
            .unwrap_or_else(|| "unknown".to_string());

        let summary = format!(
            "{} security issue(s), {} compliance issue(s) for {file_path}",
            security.issue_count, compliance.issue_count
        );

        ValidationResult {
            approved,
            security,
            compliance,
            project_context,
            summary,
        }
    }

    /// Republishes a generated or edited file to the Context and Retrieval
    /// agents if they are wired. Failures are logged, never propagated —
    /// indexing is best-effort and must not block the caller.
    pub async fn register_file(&self, path: &str, content: &str) {
        let message = AgentMessage::new(AgentMessageKind::Text, "orchestrator", content.to_string())
            .with_metadata(json!({ "generated_file_path": path }));

        if self.agents.read().contains_key("context") {
            if let Err(err) = self.send_to_agent("context", message.clone()).await {
                tracing::warn!(error = %err, path, "register_file: context agent failed");
            }
        }
        if self.agents.read().contains_key("retrieval") {
            if let Err(err) = self.send_to_agent("retrieval", message).await {
                tracing::warn!(error = %err, path, "register_file: retrieval agent failed");
            }
        }
    }
}
