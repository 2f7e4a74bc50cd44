use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorContext, OmniError};
use crate::kind::ErrorKind;

/// Runs `fut` under a deadline, raising a timeout error of the
/// caller-chosen kind on expiry. Callers that want a non-panicking,
/// always-`Ok` variant should use [`run_with_timeout_structured`] instead.
pub async fn run_with_timeout<T>(
    duration: Duration,
    kind: ErrorKind,
    fut: impl Future<Output = T>,
) -> Result<T, OmniError> {
    match tokio::time::timeout(duration, fut).await {
        Ok(value) => Ok(value),
        Err(_) => Err(OmniError::new(
            kind,
            format!("operation timed out after {:.3}s", duration.as_secs_f64()),
        )),
    }
}

/// A non-panicking, structured timeout result: `{success, value, timed_out,
/// elapsed, error}`. Used where the caller wants to continue past a single
/// timed-out sub-operation instead of propagating (e.g. the workflow
/// engine's per-file security scan).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    pub timed_out: bool,
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn run_with_timeout_structured<T>(
    duration: Duration,
    fut: impl Future<Output = Result<T, OmniError>>,
) -> TimeoutResult<T> {
    let start = Instant::now();
    match tokio::time::timeout(duration, fut).await {
        Ok(Ok(value)) => TimeoutResult {
            success: true,
            value: Some(value),
            timed_out: false,
            elapsed: start.elapsed(),
            error: None,
        },
        Ok(Err(err)) => TimeoutResult {
            success: false,
            value: None,
            timed_out: false,
            elapsed: start.elapsed(),
            error: Some(err.message),
        },
        Err(_) => TimeoutResult {
            success: false,
            value: None,
            timed_out: true,
            elapsed: start.elapsed(),
            error: Some("timed out".to_string()),
        },
    }
}

/// Per-step record in a [`TimeBudget`]'s ledger: `{name, started, timeout,
/// completed, timedOut, elapsed}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub name: String,
    pub started: bool,
    pub timeout: Duration,
    pub completed: bool,
    pub timed_out: bool,
    pub skipped: bool,
    pub elapsed: Duration,
}

/// What happened when a step ran under the budget.
pub enum StepRun<T> {
    Completed(T),
    TimedOut,
    /// The outer deadline had already elapsed before this step could start.
    Skipped,
}

/// Composes multiple scoped timeouts over one outer deadline. Each step is
/// bounded by `min(stepMax, remaining)`; a step attempted after the
/// deadline has passed is recorded `skipped` without running.
pub struct TimeBudget {
    deadline: Instant,
    outcomes: Vec<StepOutcome>,
}

impl TimeBudget {
    pub fn new(total: Duration) -> Self {
        Self {
            deadline: Instant::now() + total,
            outcomes: Vec::new(),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Runs `f()` bounded by `min(step_max, remaining)`. If no time remains
    /// the step is skipped without being started.
    pub async fn step<F, Fut, T>(&mut self, name: &str, step_max: Duration, f: F) -> StepRun<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let remaining = self.remaining();
        if remaining.is_zero() {
            self.outcomes.push(StepOutcome {
                name: name.to_string(),
                started: false,
                timeout: step_max,
                completed: false,
                timed_out: false,
                skipped: true,
                elapsed: Duration::ZERO,
            });
            return StepRun::Skipped;
        }
        let bound = step_max.min(remaining);
        let start = Instant::now();
        match tokio::time::timeout(bound, f()).await {
            Ok(value) => {
                self.outcomes.push(StepOutcome {
                    name: name.to_string(),
                    started: true,
                    timeout: bound,
                    completed: true,
                    timed_out: false,
                    skipped: false,
                    elapsed: start.elapsed(),
                });
                StepRun::Completed(value)
            }
            Err(_) => {
                self.outcomes.push(StepOutcome {
                    name: name.to_string(),
                    started: true,
                    timeout: bound,
                    completed: false,
                    timed_out: true,
                    skipped: false,
                    elapsed: start.elapsed(),
                });
                StepRun::TimedOut
            }
        }
    }

    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    pub fn completed_stage_names(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.completed)
            .map(|o| o.name.clone())
            .collect()
    }

    pub fn is_exhausted(&self) -> bool {
        self.outcomes.iter().any(|o| o.timed_out || o.skipped)
    }

    /// Builds the workflow-timeout error naming the stages completed so
    /// far, for a caller that has determined the budget ran out.
    pub fn exhausted_error(&self) -> OmniError {
        let completed = self.completed_stage_names();
        OmniError::new(
            ErrorKind::WorkflowTimeout,
            format!(
                "time budget exhausted; completed stages: [{}]",
                completed.join(", ")
            ),
        )
        .with_context(ErrorContext::new().operation("time_budget"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn step_times_out_and_later_steps_are_skipped() {
        let mut budget = TimeBudget::new(Duration::from_millis(50));
        let first = budget
            .step("context", Duration::from_secs(1), || async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                42
            })
            .await;
        assert!(matches!(first, StepRun::TimedOut));

        let second = budget
            .step("retrieval", Duration::from_secs(1), || async { 1 })
            .await;
        assert!(matches!(second, StepRun::Skipped));

        assert!(budget.completed_stage_names().is_empty());
        assert!(budget.is_exhausted());
    }

    #[tokio::test]
    async fn completed_steps_are_named_in_order() {
        let mut budget = TimeBudget::new(Duration::from_secs(5));
        let _: StepRun<i32> = budget.step("context", Duration::from_secs(1), || async { 1 }).await;
        let _: StepRun<i32> = budget.step("retrieval", Duration::from_secs(1), || async { 2 }).await;
        assert_eq!(budget.completed_stage_names(), vec!["context", "retrieval"]);
    }
}
