//! Message-envelope wire handler: per-connection session state, envelope
//! dispatch onto the orchestrator/workflow engine, and the streaming
//! contract (`stream_start` ... `stream_chunk`* ... terminator).

mod handler;
mod session;
mod stream;

pub use handler::{WireFeatures, WireHandler};
pub use session::{Session, SessionRegistry};
pub use stream::{EventSink, StreamGuard};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use omni_agents::{Agent as _, AgentRegistry, ComplianceAgent, ContextAgent, RetrievalAgent, SecurityAgent};
    use omni_context::SharedContext;
    use omni_orchestrator::Orchestrator;
    use omni_providers::{InMemoryVectorStore, MarkdownReportRenderer};
    use omni_types::{Envelope, EnvelopeType};
    use omni_workflow::WorkflowEngine;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Envelope>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn send(&self, envelope: Envelope) {
            self.sent.lock().await.push(envelope);
        }
    }

    async fn wired_handler() -> WireHandler {
        let registry = AgentRegistry::new();
        registry
            .register(ContextAgent::new().metadata().clone(), || {
                Arc::new(ContextAgent::new()) as Arc<dyn omni_agents::Agent>
            })
            .unwrap();
        registry
            .register(SecurityAgent::new().metadata().clone(), || {
                Arc::new(SecurityAgent::new()) as Arc<dyn omni_agents::Agent>
            })
            .unwrap();
        registry
            .register(ComplianceAgent::new().metadata().clone(), || {
                Arc::new(ComplianceAgent::new()) as Arc<dyn omni_agents::Agent>
            })
            .unwrap();
        registry
            .register(
                RetrievalAgent::new(Arc::new(InMemoryVectorStore::new())).metadata().clone(),
                || Arc::new(RetrievalAgent::new(Arc::new(InMemoryVectorStore::new()))) as Arc<dyn omni_agents::Agent>,
            )
            .unwrap();

        let orchestrator = Arc::new(Orchestrator::new(registry, Arc::new(SharedContext::new(None))));
        for id in ["context", "security", "compliance", "retrieval"] {
            orchestrator.add_agent(id).await.unwrap();
        }
        let workflow = Arc::new(WorkflowEngine::new(orchestrator.clone(), Arc::new(MarkdownReportRenderer)));
        WireHandler::new(orchestrator, workflow)
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let handler = wired_handler().await;
        let sink = RecordingSink::default();
        handler
            .handle(
                "session-1",
                Envelope::new(EnvelopeType::Ping, serde_json::Value::Null).with_id("req-1"),
                &sink,
            )
            .await;
        let sent = sink.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0].kind, EnvelopeType::Pong));
        assert_eq!(sent[0].id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn get_agents_lists_every_wired_agent() {
        let handler = wired_handler().await;
        let sink = RecordingSink::default();
        handler
            .handle("session-1", Envelope::new(EnvelopeType::GetAgents, serde_json::Value::Null), &sink)
            .await;
        let sent = sink.sent.lock().await;
        assert!(matches!(sent[0].kind, EnvelopeType::AgentList));
        assert_eq!(sent[0].data["agents"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn select_agent_against_unwired_id_is_an_error_envelope() {
        let handler = wired_handler().await;
        let sink = RecordingSink::default();
        handler
            .handle(
                "session-1",
                Envelope::new(EnvelopeType::SelectAgent, serde_json::json!({ "agentId": "ghost" })),
                &sink,
            )
            .await;
        let sent = sink.sent.lock().await;
        assert!(matches!(sent[0].kind, EnvelopeType::Error));
    }

    #[tokio::test]
    async fn chat_streams_start_chunk_end_in_order() {
        let handler = wired_handler().await;
        let sink = RecordingSink::default();
        let id = Uuid::new_v4().to_string();
        handler
            .handle(
                "session-1",
                Envelope::new(EnvelopeType::Chat, serde_json::json!({ "message": "hello" })).with_id(id),
                &sink,
            )
            .await;
        let sent = sink.sent.lock().await;
        assert!(matches!(sent[0].kind, EnvelopeType::StreamStart));
        assert!(matches!(sent[1].kind, EnvelopeType::StreamChunk));
        assert!(matches!(sent[2].kind, EnvelopeType::StreamEnd));
    }

    #[tokio::test]
    async fn disconnect_cancels_in_flight_work_for_that_session_only() {
        let handler = wired_handler().await;
        let session = handler.sessions().get_or_create("session-1");
        let other = handler.sessions().get_or_create("session-2");
        handler.disconnect("session-1");
        assert!(session.is_cancelled());
        assert!(!other.is_cancelled());
    }

    #[tokio::test]
    async fn analyze_code_emits_findings_then_result_then_summary() {
        let handler = wired_handler().await;
        let sink = RecordingSink::default();
        handler
            .handle(
                "session-1",
                Envelope::new(
                    EnvelopeType::AnalyzeCode,
                    serde_json::json!({ "code": "api_key = \"sk-abcdefgh12345678\"\n", "path": "auth.py" }),
                ),
                &sink,
            )
            .await;
        let sent = sink.sent.lock().await;
        assert!(matches!(sent[0].kind, EnvelopeType::SecurityFindings));
        assert!(matches!(sent[1].kind, EnvelopeType::AnalysisResult));
        assert!(matches!(sent[2].kind, EnvelopeType::ChatResponse));
    }
}
