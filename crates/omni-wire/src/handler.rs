use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use omni_observability::{new_correlation_id, with_root_correlation, Metrics, RequestTrace};
use omni_orchestrator::Orchestrator;
use omni_types::{AgentMessage, AgentMessageKind, Envelope, EnvelopeType};
use omni_workflow::{ProgressSink, WorkflowEngine};
use serde_json::json;

use crate::session::SessionRegistry;
use crate::stream::{EventSink, StreamGuard};

/// Whether chat responses are streamed, per `features.enableStreaming`.
#[derive(Debug, Clone, Copy)]
pub struct WireFeatures {
    pub enable_streaming: bool,
}

impl Default for WireFeatures {
    fn default() -> Self {
        Self { enable_streaming: true }
    }
}

/// Forwards `analyze_workspace` stage transitions to the client as
/// `agent_status` envelopes, correlated by the inbound request's `id`.
struct ScanProgressSink<'a> {
    sink: &'a dyn EventSink,
    id: Option<String>,
}

#[async_trait]
impl ProgressSink for ScanProgressSink<'_> {
    async fn on_stage(&self, stage: &str, message: &str) {
        let mut env = Envelope::new(
            EnvelopeType::AgentStatus,
            json!({ "agentId": "workflow", "stage": stage, "status": message }),
        );
        env.id = self.id.clone();
        self.sink.send(env).await;
    }
}

/// Translates client envelopes into orchestrator/workflow calls and emits
/// progress, status, result, and error events back through an
/// [`EventSink`]. One instance is shared across connections; per-connection
/// state lives in a [`crate::session::Session`].
pub struct WireHandler {
    orchestrator: Arc<Orchestrator>,
    workflow: Arc<WorkflowEngine>,
    sessions: SessionRegistry,
    features: WireFeatures,
    metrics: Arc<Metrics>,
}

impl WireHandler {
    pub fn new(orchestrator: Arc<Orchestrator>, workflow: Arc<WorkflowEngine>) -> Self {
        Self::with_metrics(orchestrator, workflow, Arc::new(Metrics::new()))
    }

    pub fn with_metrics(orchestrator: Arc<Orchestrator>, workflow: Arc<WorkflowEngine>, metrics: Arc<Metrics>) -> Self {
        Self {
            orchestrator,
            workflow,
            sessions: SessionRegistry::new(),
            features: WireFeatures::default(),
            metrics,
        }
    }

    pub fn with_features(mut self, features: WireFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Drops all per-connection state for `session_id`, cancelling any
    /// operation still in flight for it. Call on transport close.
    pub fn disconnect(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Dispatches one inbound envelope for `session_id`, emitting zero or
    /// more outbound envelopes through `sink`. The session remains open
    /// even when an error envelope is emitted — errors propagate at the
    /// wire, never by closing the connection. Allocates a fresh `req-`
    /// correlation id for the envelope and opens a [`RequestTrace`] scope
    /// around the dispatch, so every log record and span this request
    /// produces — in this crate and in the agents/orchestrator it calls
    /// into — inherits the same id.
    pub async fn handle(&self, session_id: &str, envelope: Envelope, sink: &dyn EventSink) {
        let correlation_id = new_correlation_id();
        self.metrics.incr_counter("wire.requests_total", 1);
        let trace = RequestTrace::new(correlation_id.clone());
        let trace_for_dispatch = trace.clone();

        with_root_correlation(correlation_id.clone(), async move {
            RequestTrace::scope(self.dispatch(session_id, envelope, sink, &trace_for_dispatch)).await
        })
        .await;

        tracing::debug!(correlation_id, spans = trace.roots().len(), "request trace recorded");
    }

    async fn dispatch(&self, session_id: &str, envelope: Envelope, sink: &dyn EventSink, trace: &Arc<RequestTrace>) {
        let session = self.sessions.get_or_create(session_id);
        let id = envelope.id.clone();

        match envelope.kind {
            EnvelopeType::Ping => {
                sink.send(Envelope {
                    kind: EnvelopeType::Pong,
                    id,
                    data: serde_json::Value::Null,
                    timestamp: chrono::Utc::now(),
                })
                .await;
            }

            EnvelopeType::GetAgents => {
                let agents: Vec<_> = self.orchestrator.agent_ids();
                let mut metadata = Vec::new();
                for agent_id in &agents {
                    if let Some(m) = self.orchestrator.registry().metadata(agent_id) {
                        metadata.push(m);
                    }
                }
                let mut env = Envelope::new(EnvelopeType::AgentList, json!({ "agents": metadata }));
                env.id = id;
                sink.send(env).await;
            }

            EnvelopeType::SelectAgent => {
                let Some(agent_id) = envelope.data.get("agentId").and_then(|v| v.as_str()) else {
                    sink.send(Envelope::error(id, "select-agent requires data.agentId", None)).await;
                    return;
                };
                if !self.orchestrator.agent_ids().iter().any(|existing| existing == agent_id) {
                    sink.send(Envelope::error(id, format!("agent '{agent_id}' is not wired"), Some("agent_not_found")))
                        .await;
                    return;
                }
                session.select_agent(agent_id);
                let mut env = Envelope::new(
                    EnvelopeType::AgentStatus,
                    json!({ "agentId": agent_id, "status": "selected" }),
                );
                env.id = id;
                sink.send(env).await;
            }

            EnvelopeType::Cancel => {
                session.cancel();
                let mut env = Envelope::new(EnvelopeType::AgentStatus, json!({ "status": "cancelled" }));
                env.id = id;
                sink.send(env).await;
            }

            EnvelopeType::Chat => {
                self.handle_chat(&session, envelope, sink, trace).await;
            }

            EnvelopeType::AnalyzeCode => {
                self.handle_analyze_code(id, envelope, sink, trace).await;
            }

            EnvelopeType::ScanWorkspace => {
                self.handle_scan_workspace(id, envelope, &session, sink, trace).await;
            }

            EnvelopeType::QueryContext => {
                let snapshot = self.orchestrator.context().to_snapshot().await;
                let mut env = Envelope::new(EnvelopeType::QueryResult, serde_json::to_value(&snapshot).unwrap_or_default());
                env.id = id;
                sink.send(env).await;
            }

            // Response-only kinds reaching a server handler are a client
            // protocol error, not a crash — report and move on.
            other => {
                sink.send(Envelope::error(id, format!("unexpected envelope type on inbound: {other:?}"), None)).await;
            }
        }
    }

    async fn handle_chat(
        &self,
        session: &crate::session::Session,
        envelope: Envelope,
        sink: &dyn EventSink,
        trace: &Arc<RequestTrace>,
    ) {
        let id = envelope.id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let message = envelope
            .data
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let agent_id = session.current_agent_id().unwrap_or_else(|| "context".to_string());

        let span = trace.enter(Some(&agent_id), "chat");
        let timer = self.metrics.timed_operation("orchestrator.send_to_agent");

        if !self.features.enable_streaming {
            match self
                .orchestrator
                .send_to_agent(&agent_id, AgentMessage::new(AgentMessageKind::Text, "wire", message))
                .await
            {
                Ok(response) => {
                    timer.finish(true);
                    span.success();
                    let mut env = Envelope::new(EnvelopeType::ChatResponse, json!({ "content": response.content }));
                    env.id = Some(id);
                    sink.send(env).await;
                }
                Err(err) => {
                    timer.finish(false);
                    span.fail(err.message.clone());
                    sink.send(Envelope::error(Some(id), err.message, None)).await;
                }
            }
            return;
        }

        let guard = StreamGuard::start(sink, id.clone()).await;
        if session.is_cancelled() {
            timer.finish(false);
            span.fail("cancelled before dispatch");
            guard.error("cancelled before dispatch").await;
            return;
        }

        let outcome = tokio::select! {
            biased;
            _ = session.cancel_token().cancelled() => None,
            result = self.orchestrator.send_to_agent(&agent_id, AgentMessage::new(AgentMessageKind::Text, "wire", message)) => Some(result),
        };

        match outcome {
            None => {
                timer.finish(false);
                span.fail("cancelled");
                guard.error("cancelled").await;
            }
            Some(Ok(response)) => {
                timer.finish(true);
                span.success();
                guard.chunk(response.content).await;
                guard.end().await;
            }
            Some(Err(err)) => {
                timer.finish(false);
                span.fail(err.message.clone());
                guard.error(err.message).await;
            }
        }
    }

    async fn handle_analyze_code(
        &self,
        id: Option<String>,
        envelope: Envelope,
        sink: &dyn EventSink,
        trace: &Arc<RequestTrace>,
    ) {
        let code = envelope.data.get("code").and_then(|v| v.as_str()).unwrap_or_default();
        let path = envelope.data.get("path").and_then(|v| v.as_str()).unwrap_or("untitled");

        let span = trace.enter(Some("security"), "analyze_code");
        let timer = self.metrics.timed_operation("orchestrator.validate_code");
        let result = self.orchestrator.validate_code(code, path).await;
        timer.finish(true);
        span.success();

        let mut findings_env = Envelope::new(
            EnvelopeType::SecurityFindings,
            json!({ "security": result.security.issues, "compliance": result.compliance.issues }),
        );
        findings_env.id = id.clone();
        sink.send(findings_env).await;

        let mut result_env = Envelope::new(EnvelopeType::AnalysisResult, serde_json::to_value(&result).unwrap_or_default());
        result_env.id = id.clone();
        sink.send(result_env).await;

        let mut chat_env = Envelope::new(EnvelopeType::ChatResponse, json!({ "content": result.summary }));
        chat_env.id = id;
        sink.send(chat_env).await;
    }

    async fn handle_scan_workspace(
        &self,
        id: Option<String>,
        envelope: Envelope,
        session: &crate::session::Session,
        sink: &dyn EventSink,
        trace: &Arc<RequestTrace>,
    ) {
        let Some(workspace_path) = envelope.data.get("workspacePath").and_then(|v| v.as_str()) else {
            sink.send(Envelope::error(id, "scan-workspace requires data.workspacePath", None)).await;
            return;
        };
        let path = PathBuf::from(workspace_path);

        let stage_id = id.clone();
        let cancel = session.cancel_token();
        if cancel.is_cancelled() {
            sink.send(Envelope::error(stage_id, "cancelled before scan started", None)).await;
            return;
        }

        let progress = ScanProgressSink { sink, id: stage_id.clone() };
        let span = trace.enter(Some("workflow"), "scan_workspace");
        let timer = self.metrics.timed_operation("workflow.analyze_workspace");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.workflow.analyze_workspace(&path, None, Some(&progress)) => Some(result),
        };

        let Some(result) = result else {
            timer.finish(false);
            span.fail("cancelled");
            sink.send(Envelope::error(id, "scan cancelled", None)).await;
            return;
        };
        timer.finish(result.success);
        if result.success {
            span.success();
        } else {
            span.fail(result.errors.join("; "));
        }

        let mut result_env = Envelope::new(EnvelopeType::AnalysisResult, serde_json::to_value(&result).unwrap_or_default());
        result_env.id = id.clone();
        sink.send(result_env).await;

        let mut chat_env = Envelope::new(
            EnvelopeType::ChatResponse,
            json!({ "content": format!("scan complete: {} issue(s) found", result.total_issues) }),
        );
        chat_env.id = id;
        sink.send(chat_env).await;
    }
}
