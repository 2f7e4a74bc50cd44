//! Budget-scoped Context → Retrieval → Security → Compliance → Report
//! pipelines, for both whole-workspace and single-file entry points.

mod pipeline;
mod result;
mod scan;

pub use pipeline::{ProgressSink, WorkflowConfig, WorkflowEngine};
pub use result::WorkflowResult;
pub use scan::scan_workspace;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use omni_agents::{AgentRegistry, CodingAgent, ComplianceAgent, ContextAgent, RetrievalAgent, SecurityAgent};
    use omni_context::SharedContext;
    use omni_orchestrator::Orchestrator;
    use omni_providers::{InMemoryVectorStore, MarkdownReportRenderer};
    use tempfile::TempDir;

    use super::*;

    async fn wired_engine() -> (WorkflowEngine, TempDir) {
        use omni_agents::Agent as _;

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
        let _ = CodingAgent::new();

        let orchestrator = Arc::new(Orchestrator::new(registry, Arc::new(SharedContext::new(None))));
        for id in ["context", "security", "compliance", "retrieval"] {
            orchestrator.add_agent(id).await.unwrap();
        }

        let engine = WorkflowEngine::new(orchestrator, Arc::new(MarkdownReportRenderer));
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("app.py"), "api_key = \"sk-abcdefgh12345678\"\n").unwrap();
        (engine, tmp)
    }

    #[tokio::test]
    async fn analyze_workspace_runs_every_stage_and_renders_reports() {
        let (engine, tmp) = wired_engine().await;
        let root = tmp.path();
        let result = engine.analyze_workspace(root, None, None).await;
        assert!(result.success);
        assert!(!result.security_findings.is_empty());
        assert!(root.join(".omni/context/project-overview.md").exists());
    }

    #[tokio::test]
    async fn exhausted_budget_reports_failure_with_named_stages() {
        let (engine, tmp) = wired_engine().await;
        let root = tmp.path();
        let engine = engine.with_config(WorkflowConfig {
            total_budget: Duration::from_nanos(1),
            stage_timeout: Duration::from_secs(5),
            max_files_per_stage: 50,
            validation_sample_size: 10,
        });
        let result = engine.analyze_workspace(root, None, None).await;
        assert!(!result.success);
        assert!(result.errors.iter().any(|e| e.contains("time budget exhausted")));
    }

    #[tokio::test]
    async fn analyze_file_is_idempotent_on_repeated_identical_content() {
        let (engine, tmp) = wired_engine().await;
        let root = tmp.path();
        let path = root.join("single.py").to_string_lossy().to_string();
        let content = "def f():\n    return 1\n";

        engine.analyze_file(&path, content, Some("python")).await;
        let version_after_first = engine.orchestrator().context().version();
        engine.analyze_file(&path, content, Some("python")).await;
        let version_after_second = engine.orchestrator().context().version();
        assert_eq!(version_after_first, version_after_second);
    }
}
