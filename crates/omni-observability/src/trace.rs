use std::cell::RefCell;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    InProgress,
    Success,
    Error,
}

/// One nested operation inside a [`RequestTrace`]: `{agentId, operation,
/// correlationId, start, end?, status, error?, children[]}`.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSpan {
    pub agent_id: Option<String>,
    pub operation: String,
    pub correlation_id: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub status: SpanStatus,
    pub error: Option<String>,
    pub children: Vec<AgentSpan>,
}

impl AgentSpan {
    fn new(agent_id: Option<String>, operation: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            agent_id,
            operation: operation.into(),
            correlation_id: correlation_id.into(),
            start: Utc::now(),
            end: None,
            status: SpanStatus::InProgress,
            error: None,
            children: Vec::new(),
        }
    }
}

tokio::task_local! {
    static CURRENT_PATH: RefCell<Vec<usize>>;
}

/// One request's nested span tree, rooted at arrival and closed at final
/// emit. Spans entered while another span is active on the same task
/// (established via [`RequestTrace::scope`]) attach as children of it;
/// spans entered concurrently on the *same* task (e.g. inside a `join!`)
/// share one path stack and may interleave — give each truly concurrent
/// branch its own spawned task if that matters.
pub struct RequestTrace {
    correlation_id: String,
    roots: Mutex<Vec<AgentSpan>>,
}

impl RequestTrace {
    pub fn new(correlation_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { correlation_id: correlation_id.into(), roots: Mutex::new(Vec::new()) })
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn roots(&self) -> Vec<AgentSpan> {
        self.roots.lock().clone()
    }

    /// Runs `fut` with a fresh current-span path, so the first `enter`
    /// inside it becomes a root span. Call once per inbound request,
    /// around the whole handler.
    pub async fn scope<F: std::future::Future>(fut: F) -> F::Output {
        CURRENT_PATH.scope(RefCell::new(Vec::new()), fut).await
    }

    /// Opens a span as a child of whichever span is currently active on
    /// this task, or as a new root span if none is.
    pub fn enter(self: &Arc<Self>, agent_id: Option<&str>, operation: &str) -> SpanGuard {
        let path = CURRENT_PATH.try_with(|p| p.borrow().clone()).unwrap_or_default();
        let index = {
            let mut roots = self.roots.lock();
            if path.is_empty() {
                roots.push(AgentSpan::new(agent_id.map(String::from), operation, self.correlation_id.clone()));
                roots.len() - 1
            } else {
                let mut node = &mut roots[path[0]];
                for &i in &path[1..] {
                    node = &mut node.children[i];
                }
                node.children.push(AgentSpan::new(agent_id.map(String::from), operation, self.correlation_id.clone()));
                node.children.len() - 1
            }
        };
        let mut child_path = path;
        child_path.push(index);
        let _ = CURRENT_PATH.try_with(|p| p.borrow_mut().push(index));
        SpanGuard { trace: self.clone(), path: child_path, finished: false }
    }

    fn finish(&self, path: &[usize], status: SpanStatus, error: Option<String>) {
        if path.is_empty() {
            return;
        }
        let mut roots = self.roots.lock();
        let mut node = &mut roots[path[0]];
        for &i in &path[1..] {
            node = &mut node.children[i];
        }
        node.end = Some(Utc::now());
        node.status = status;
        node.error = error;
    }
}

/// Active span handle. Dropping without calling `success`/`fail` records
/// the span as an error, the same way an unhandled panic would leave it —
/// a trace should never show a span stuck `in_progress` after its request
/// finished.
pub struct SpanGuard {
    trace: Arc<RequestTrace>,
    path: Vec<usize>,
    finished: bool,
}

impl SpanGuard {
    pub fn success(mut self) {
        self.trace.finish(&self.path, SpanStatus::Success, None);
        self.finished = true;
    }

    pub fn fail(mut self, error: impl Into<String>) {
        self.trace.finish(&self.path, SpanStatus::Error, Some(error.into()));
        self.finished = true;
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.trace.finish(&self.path, SpanStatus::Error, Some("span dropped without a verdict".to_string()));
        }
        let _ = CURRENT_PATH.try_with(|p| {
            p.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nested_enter_attaches_as_a_child() {
        let trace = RequestTrace::new("req-1");
        RequestTrace::scope(async {
            let outer = trace.enter(Some("context"), "registerFile");
            {
                let inner = trace.enter(Some("retrieval"), "index");
                inner.success();
            }
            outer.success();
        })
        .await;

        let roots = trace.roots();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].operation, "registerFile");
        assert_eq!(roots[0].children.len(), 1);
        assert_eq!(roots[0].children[0].operation, "index");
        assert_eq!(roots[0].status, SpanStatus::Success);
    }

    #[tokio::test]
    async fn dropped_span_without_a_verdict_is_recorded_as_error() {
        let trace = RequestTrace::new("req-2");
        RequestTrace::scope(async {
            let _span = trace.enter(None, "orphaned");
        })
        .await;

        let roots = trace.roots();
        assert_eq!(roots[0].status, SpanStatus::Error);
        assert!(roots[0].end.is_some());
    }

    #[tokio::test]
    async fn sibling_spans_do_not_nest_under_each_other() {
        let trace = RequestTrace::new("req-3");
        RequestTrace::scope(async {
            trace.enter(None, "first").success();
            trace.enter(None, "second").success();
        })
        .await;

        let roots = trace.roots();
        assert_eq!(roots.len(), 2);
        assert!(roots[0].children.is_empty());
        assert!(roots[1].children.is_empty());
    }
}
