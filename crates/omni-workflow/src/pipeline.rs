use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use omni_errors::{StepRun, TimeBudget};
use omni_orchestrator::Orchestrator;
use omni_providers::{ReportRenderer, WorkflowReport};
use omni_types::{AgentMessage, AgentMessageKind, ComplianceFinding, SecurityFinding};
use parking_lot::RwLock;
use serde_json::json;

use crate::result::WorkflowResult;
use crate::scan::scan_workspace;

/// Receives a stage-transition notification from [`WorkflowEngine::analyze_workspace`].
/// Async so a caller (the wire handler, in particular) can forward the
/// notification on to a client as an event, not just log it locally.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_stage(&self, stage: &str, message: &str);
}

async fn emit(sink: Option<&dyn ProgressSink>, stage: &str, message: &str) {
    if let Some(sink) = sink {
        sink.on_stage(stage, message).await;
    }
}

/// Tunables for a workflow run: the overall time budget, the per-stage
/// timeout, the cap on files registered with Context, and the sample size
/// validated by Security/Compliance. Defaults mirror a 50-file scan capped
/// to a 10-file validation sample.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub total_budget: Duration,
    pub stage_timeout: Duration,
    pub max_files_per_stage: usize,
    pub validation_sample_size: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            total_budget: Duration::from_secs(30),
            stage_timeout: Duration::from_secs(10),
            max_files_per_stage: 50,
            validation_sample_size: 10,
        }
    }
}

/// Runs the workspace and single-file analysis pipelines on top of a fully
/// wired [`Orchestrator`], handing the accumulated state to a report
/// renderer at the end of each workspace run.
pub struct WorkflowEngine {
    orchestrator: Arc<Orchestrator>,
    report_renderer: Arc<dyn ReportRenderer>,
    config: WorkflowConfig,
    workspace_root: RwLock<Option<PathBuf>>,
}

impl WorkflowEngine {
    pub fn new(orchestrator: Arc<Orchestrator>, report_renderer: Arc<dyn ReportRenderer>) -> Self {
        Self {
            orchestrator,
            report_renderer,
            config: WorkflowConfig::default(),
            workspace_root: RwLock::new(None),
        }
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    async fn render_report(&self, workspace_root: &Path, result: &WorkflowResult) -> std::result::Result<(), String> {
        let Some(structure) = self.orchestrator.context().get_project_structure().await else {
            return Ok(());
        };
        let report = WorkflowReport {
            project_structure: structure,
            security_findings: result.security_findings.clone(),
            compliance_findings: result.compliance_findings.clone(),
            rag_indexed_count: result.rag_indexed_count,
            generated_at: chrono::Utc::now(),
        };
        self.report_renderer.render(workspace_root, &report).await
    }

    /// Stages, each scoped inside the shared time budget: Context scan and
    /// registration, Retrieval indexing, Security sample, Compliance
    /// sample, then a report render. A timeout in one stage never aborts
    /// later stages; only a fully exhausted budget flips `success=false`.
    pub async fn analyze_workspace(
        &self,
        workspace_path: &Path,
        files: Option<Vec<PathBuf>>,
        on_progress: Option<&dyn ProgressSink>,
    ) -> WorkflowResult {
        let start = Instant::now();
        let mut result = WorkflowResult { success: true, ..Default::default() };
        let mut budget = TimeBudget::new(self.config.total_budget);

        self.orchestrator
            .context()
            .set_workspace(workspace_path.to_string_lossy().to_string(), true)
            .await;

        let candidate_files =
            files.unwrap_or_else(|| scan_workspace(workspace_path, self.config.max_files_per_stage));

        emit(on_progress, "context", "analyzing project structure").await;
        let context_run = budget
            .step("context", self.config.stage_timeout, || async {
                let mut registered = 0usize;
                for path in candidate_files.iter().take(self.config.max_files_per_stage) {
                    let Ok(content) = tokio::fs::read_to_string(path).await else {
                        continue;
                    };
                    let message = AgentMessage::new(AgentMessageKind::Text, "workflow", content)
                        .with_metadata(json!({ "generated_file_path": path.to_string_lossy() }));
                    if self.orchestrator.send_to_agent("context", message).await.is_ok() {
                        registered += 1;
                    }
                }
                registered
            })
            .await;
        if let StepRun::Completed(registered) = context_run {
            result.context_summary = format!("registered {registered} file(s) from {}", workspace_path.display());
            emit(on_progress, "context", &result.context_summary).await;
        }

        emit(on_progress, "retrieval", "indexing workspace for search").await;
        let retrieval_run = budget
            .step("retrieval", self.config.stage_timeout, || async {
                let mut indexed = 0usize;
                for path in candidate_files.iter().take(self.config.max_files_per_stage) {
                    let Ok(content) = tokio::fs::read_to_string(path).await else {
                        continue;
                    };
                    let message = AgentMessage::new(AgentMessageKind::Text, "workflow", content)
                        .with_metadata(json!({ "generated_file_path": path.to_string_lossy() }));
                    if self.orchestrator.send_to_agent("retrieval", message).await.is_ok() {
                        indexed += 1;
                    }
                }
                indexed
            })
            .await;
        if let StepRun::Completed(indexed) = retrieval_run {
            result.rag_indexed_count = indexed;
            emit(on_progress, "retrieval", &format!("indexed {indexed} file(s)")).await;
        }

        let sample: Vec<PathBuf> = candidate_files
            .iter()
            .take(self.config.validation_sample_size)
            .cloned()
            .collect();

        emit(on_progress, "security", "analyzing security").await;
        let security_run = budget
            .step("security", self.config.stage_timeout, || async {
                let mut findings: Vec<SecurityFinding> = Vec::new();
                for path in &sample {
                    let Ok(content) = tokio::fs::read_to_string(path).await else {
                        continue;
                    };
                    let validation = self
                        .orchestrator
                        .validate_code(&content, &path.to_string_lossy())
                        .await;
                    for issue in validation.security.issues {
                        if let Ok(finding) = serde_json::from_value::<SecurityFinding>(issue) {
                            findings.push(finding);
                        }
                    }
                }
                findings
            })
            .await;
        if let StepRun::Completed(findings) = security_run {
            emit(on_progress, "security", &format!("found {} issue(s)", findings.len())).await;
            result.security_findings = findings;
        }

        emit(on_progress, "compliance", "checking compliance").await;
        let compliance_run = budget
            .step("compliance", self.config.stage_timeout, || async {
                let mut findings: Vec<ComplianceFinding> = Vec::new();
                for path in &sample {
                    let Ok(content) = tokio::fs::read_to_string(path).await else {
                        continue;
                    };
                    let validation = self
                        .orchestrator
                        .validate_code(&content, &path.to_string_lossy())
                        .await;
                    for issue in validation.compliance.issues {
                        if let Ok(finding) = serde_json::from_value::<ComplianceFinding>(issue) {
                            findings.push(finding);
                        }
                    }
                }
                findings
            })
            .await;
        if let StepRun::Completed(findings) = compliance_run {
            emit(on_progress, "compliance", &format!("found {} issue(s)", findings.len())).await;
            result.compliance_findings = findings;
        }

        result.recompute_total_issues();

        emit(on_progress, "report", "generating reports").await;
        match self.render_report(workspace_path, &result).await {
            Ok(()) => emit(on_progress, "report", "reports generated").await,
            Err(err) => result.errors.push(format!("report rendering failed: {err}")),
        }

        if budget.is_exhausted() {
            result.errors.push(budget.exhausted_error().message);
            result.success = false;
        }

        *self.workspace_root.write() = Some(workspace_path.to_path_buf());
        result.elapsed_ms = start.elapsed().as_millis();
        result
    }

    /// Incremental update for one file: registers it with Context and
    /// Retrieval, validates it, then re-renders the report if a workspace
    /// root has already been established by a prior `analyze_workspace`
    /// call. Calling twice with the same `(path, content)` produces a
    /// single version increment — `ContextAgent::register_file`'s
    /// byte-identical comparison already makes the underlying
    /// registration idempotent.
    pub async fn analyze_file(&self, path: &str, content: &str, _language: Option<&str>) -> WorkflowResult {
        let start = Instant::now();
        let mut result = WorkflowResult { success: true, ..Default::default() };

        self.orchestrator.register_file(path, content).await;
        result.rag_indexed_count = 1;
        if let Some(structure) = self.orchestrator.context().get_project_structure().await {
            result.context_summary = format!("{path} registered at version {}", structure.version);
        }

        let validation = self.orchestrator.validate_code(content, path).await;
        result.security_findings = validation
            .security
            .issues
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        result.compliance_findings = validation
            .compliance
            .issues
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        result.recompute_total_issues();

        if let Some(workspace_root) = self.workspace_root.read().clone() {
            if let Err(err) = self.render_report(&workspace_root, &result).await {
                result.errors.push(format!("report rendering failed: {err}"));
            }
        }

        result.elapsed_ms = start.elapsed().as_millis();
        result
    }
}
