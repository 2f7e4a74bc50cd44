//! Agent map, wiring, message routing, run patterns, and the
//! validate/register fan-outs that sit on top of the agent contract.

mod history;
mod orchestrator;
mod validate;

pub use history::HistoryRing;
pub use orchestrator::Orchestrator;
pub use validate::{branch_from_result, ValidationBranch, ValidationResult};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use omni_agents::{Agent, AgentRegistry};
    use omni_context::SharedContext;
    use omni_errors::{ErrorKind, OmniError, Result};
    use omni_types::{AgentMessage, AgentMessageKind, AgentMetadata, AgentStatus};
    use serde_json::json;

    use super::*;

    struct EchoAgent {
        metadata: AgentMetadata,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        fn metadata(&self) -> &AgentMetadata {
            &self.metadata
        }

        fn status(&self) -> AgentStatus {
            AgentStatus::Idle
        }

        async fn process(&self, message: AgentMessage, _context: &SharedContext) -> Result<AgentMessage> {
            Ok(AgentMessage::new(
                AgentMessageKind::Text,
                &self.metadata.id,
                format!("echo:{}", message.content),
            ))
        }
    }

    struct FailingAgent {
        metadata: AgentMetadata,
    }

    #[async_trait]
    impl Agent for FailingAgent {
        fn metadata(&self) -> &AgentMetadata {
            &self.metadata
        }

        fn status(&self) -> AgentStatus {
            AgentStatus::Idle
        }

        async fn process(&self, _message: AgentMessage, _context: &SharedContext) -> Result<AgentMessage> {
            Err(OmniError::validation("always fails"))
        }
    }

    struct SlowAgent {
        metadata: AgentMetadata,
        delay: Duration,
    }

    #[async_trait]
    impl Agent for SlowAgent {
        fn metadata(&self) -> &AgentMetadata {
            &self.metadata
        }

        fn status(&self) -> AgentStatus {
            AgentStatus::Idle
        }

        async fn process(&self, _message: AgentMessage, _context: &SharedContext) -> Result<AgentMessage> {
            tokio::time::sleep(self.delay).await;
            Ok(AgentMessage::new(AgentMessageKind::Text, &self.metadata.id, "done"))
        }
    }

    fn meta(id: &str) -> AgentMetadata {
        AgentMetadata {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            version: "0.1.0".to_string(),
            capabilities: vec![],
            dependencies: vec![],
            provides: vec![],
            tags: vec![],
        }
    }

    fn findings_message(id: &str, approved: bool, findings_key: &str) -> Result<AgentMessage> {
        Ok(AgentMessage::new(AgentMessageKind::ToolResult, id, "ok")
            .with_metadata(json!({ "approved": approved, findings_key: [] })))
    }

    fn orchestrator_with(registry: AgentRegistry) -> Orchestrator {
        Orchestrator::new(registry, Arc::new(SharedContext::new(None)))
    }

    #[tokio::test]
    async fn send_to_agent_routes_and_records_history() {
        let registry = AgentRegistry::new();
        registry
            .register(meta("echo"), || Arc::new(EchoAgent { metadata: meta("echo") }) as Arc<dyn Agent>)
            .unwrap();
        let orchestrator = orchestrator_with(registry);
        orchestrator.add_agent("echo").await.unwrap();

        let response = orchestrator
            .send_to_agent("echo", AgentMessage::new(AgentMessageKind::Text, "test", "hi"))
            .await
            .unwrap();
        assert_eq!(response.content, "echo:hi");
        assert_eq!(orchestrator.history().len(), 2);
    }

    #[tokio::test]
    async fn send_to_agent_against_unwired_id_is_not_found() {
        let orchestrator = orchestrator_with(AgentRegistry::new());
        let err = orchestrator
            .send_to_agent("missing", AgentMessage::new(AgentMessageKind::Text, "test", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AgentNotFound);
    }

    #[tokio::test]
    async fn timed_out_agent_is_reported_as_agent_timeout() {
        let registry = AgentRegistry::new();
        registry
            .register(meta("slow"), || {
                Arc::new(SlowAgent {
                    metadata: meta("slow"),
                    delay: Duration::from_millis(50),
                }) as Arc<dyn Agent>
            })
            .unwrap();
        let orchestrator = orchestrator_with(registry).with_agent_timeout(Duration::from_millis(5));
        orchestrator.add_agent("slow").await.unwrap();

        let err = orchestrator
            .send_to_agent("slow", AgentMessage::new(AgentMessageKind::Text, "test", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AgentTimeout);
    }

    #[tokio::test]
    async fn run_broadcast_turns_agent_errors_into_error_messages_without_failing() {
        let registry = AgentRegistry::new();
        registry
            .register(meta("echo"), || Arc::new(EchoAgent { metadata: meta("echo") }) as Arc<dyn Agent>)
            .unwrap();
        registry
            .register(meta("broken"), || Arc::new(FailingAgent { metadata: meta("broken") }) as Arc<dyn Agent>)
            .unwrap();
        let orchestrator = orchestrator_with(registry);
        orchestrator.add_agent("echo").await.unwrap();
        orchestrator.add_agent("broken").await.unwrap();

        let responses = orchestrator
            .run_broadcast(AgentMessage::new(AgentMessageKind::Text, "test", "hi"))
            .await;
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().any(|m| m.kind == AgentMessageKind::Error));
    }

    #[test]
    fn validation_branch_survives_the_other_branchs_failure() {
        let security = branch_from_result(findings_message("security", true, "security_findings"), "security_findings");
        let compliance = branch_from_result(
            Err(OmniError::timeout("compliance agent timed out")),
            "compliance_findings",
        );
        assert!(security.valid);
        assert!(!compliance.valid);
        assert!(compliance.timed_out);
        assert!(!security.timed_out);
    }

    #[tokio::test]
    async fn rewire_reaches_agents_added_before_or_after_context() {
        struct WantsContext {
            metadata: AgentMetadata,
            context_agent: parking_lot::RwLock<Option<Arc<dyn Agent>>>,
        }

        #[async_trait]
        impl Agent for WantsContext {
            fn metadata(&self) -> &AgentMetadata {
                &self.metadata
            }
            fn status(&self) -> AgentStatus {
                AgentStatus::Idle
            }
            async fn process(&self, message: AgentMessage, _context: &SharedContext) -> Result<AgentMessage> {
                Ok(message)
            }
            fn accepts_context_agent(&self) -> bool {
                true
            }
            fn set_context_agent(&self, agent: Arc<dyn Agent>) {
                *self.context_agent.write() = Some(agent);
            }
        }

        let registry = AgentRegistry::new();
        registry
            .register(meta("coding"), || {
                Arc::new(WantsContext {
                    metadata: meta("coding"),
                    context_agent: parking_lot::RwLock::new(None),
                }) as Arc<dyn Agent>
            })
            .unwrap();
        registry
            .register(meta("context"), || Arc::new(EchoAgent { metadata: meta("context") }) as Arc<dyn Agent>)
            .unwrap();

        let orchestrator = orchestrator_with(registry);
        orchestrator.add_agent("coding").await.unwrap();
        orchestrator.add_agent("context").await.unwrap();

        assert_eq!(orchestrator.agent_ids().len(), 2);
        assert!(
            orchestrator
                .send_to_agent("context", AgentMessage::new(AgentMessageKind::Text, "t", "ping"))
                .await
                .is_ok()
        );
    }
}
