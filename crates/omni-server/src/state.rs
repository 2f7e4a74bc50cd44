use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use omni_agents::{Agent, AgentRegistry, CodingAgent, ComplianceAgent, ContextAgent, RetrievalAgent, SecurityAgent};
use omni_context::SharedContext;
use omni_graph::DependencyGraph;
use omni_observability::Metrics;
use omni_orchestrator::Orchestrator;
use omni_providers::{InMemoryVectorStore, MarkdownReportRenderer};
use omni_wire::WireHandler;
use omni_workflow::WorkflowEngine;
use serde::Serialize;

/// Redacted view of the running configuration, served at `/config`. Only
/// the fields a client needs to understand server behavior are included;
/// secrets (`security.apiKey`, provider credentials) never appear here.
#[derive(Debug, Clone, Serialize)]
pub struct RedactedConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub enable_streaming: bool,
    pub enable_rag: bool,
    pub default_agents: Vec<String>,
}

/// Composition root: wires the registry, dependency graph validation,
/// orchestrator, workflow engine, and wire handler into one shared handle
/// cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub workflow: Arc<WorkflowEngine>,
    pub wire: Arc<WireHandler>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<RedactedConfig>,
    pub started_at: DateTime<Utc>,
    start_instant: Instant,
}

impl AppState {
    pub fn uptime_seconds(&self) -> u64 {
        self.start_instant.elapsed().as_secs()
    }
}

/// Builds the five built-in agents, validates their declared dependencies
/// against the dependency graph (fatal at startup if any are
/// missing or cyclic), registers them, and wires the orchestrator and
/// workflow engine on top.
pub async fn build_state(config: RedactedConfig) -> anyhow::Result<AppState> {
    let registry = AgentRegistry::new();
    let metadatas = [
        ContextAgent::new().metadata().clone(),
        SecurityAgent::new().metadata().clone(),
        ComplianceAgent::new().metadata().clone(),
        RetrievalAgent::new(Arc::new(InMemoryVectorStore::new())).metadata().clone(),
        CodingAgent::new().metadata().clone(),
    ];

    let mut graph = DependencyGraph::new();
    for metadata in &metadatas {
        graph.add_agent(metadata);
    }
    let validation_errors = graph.validate();
    if !validation_errors.is_empty() {
        anyhow::bail!("agent dependency graph is invalid: {validation_errors:?}");
    }
    if let Some(cycle) = graph.detect_cycles() {
        anyhow::bail!("agent dependency graph has a cycle: {cycle:?}");
    }
    let init_order = graph.topological_sort()?;

    registry.register(metadatas[0].clone(), || Arc::new(ContextAgent::new()) as Arc<dyn Agent>)?;
    registry.register(metadatas[1].clone(), || Arc::new(SecurityAgent::new()) as Arc<dyn Agent>)?;
    registry.register(metadatas[2].clone(), || Arc::new(ComplianceAgent::new()) as Arc<dyn Agent>)?;
    registry.register(metadatas[3].clone(), || {
        Arc::new(RetrievalAgent::new(Arc::new(InMemoryVectorStore::new()))) as Arc<dyn Agent>
    })?;
    registry.register(metadatas[4].clone(), || Arc::new(CodingAgent::new()) as Arc<dyn Agent>)?;

    let orchestrator = Arc::new(Orchestrator::new(registry, Arc::new(SharedContext::new(None))));
    for id in &init_order {
        orchestrator.add_agent(id).await?;
    }

    let workflow = Arc::new(WorkflowEngine::new(orchestrator.clone(), Arc::new(MarkdownReportRenderer)));
    let metrics = Arc::new(Metrics::new());
    let wire = Arc::new(WireHandler::with_metrics(orchestrator.clone(), workflow.clone(), metrics.clone()));

    Ok(AppState {
        orchestrator,
        workflow,
        wire,
        metrics,
        config: Arc::new(config),
        started_at: Utc::now(),
        start_instant: Instant::now(),
    })
}
