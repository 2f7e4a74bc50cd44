use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kind::ErrorKind;

/// Context attached to an error at the point it crosses an agent or
/// orchestrator boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agent(mut self, id: impl Into<String>) -> Self {
        self.agent_id = Some(id.into());
        self
    }

    pub fn operation(mut self, op: impl Into<String>) -> Self {
        self.operation = Some(op.into());
        self
    }

    pub fn correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// The single error type that underpins control flow across the workspace.
/// Carries `message`, an optional boxed cause, optional `context`, and a
/// `recoverable` flag that retry policies consult alongside `kind`.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct OmniError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip)]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
    pub recoverable: bool,
}

impl OmniError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let recoverable = kind.default_recoverable();
        Self {
            kind,
            message: message.into(),
            cause: None,
            context: None,
            recoverable,
        }
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AgentTimeout, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AgentNotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AgentValidation, message)
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "agent={:?} operation={:?} correlation={:?}",
            self.agent_id, self.operation, self.correlation_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_kinds_default_recoverable() {
        let err = OmniError::new(ErrorKind::LlmTimeout, "slow provider");
        assert!(err.recoverable);
    }

    #[test]
    fn validation_kinds_default_unrecoverable() {
        let err = OmniError::new(ErrorKind::AgentValidation, "bad input");
        assert!(!err.recoverable);
    }

    #[test]
    fn context_builder_round_trips_through_json() {
        let err = OmniError::new(ErrorKind::AgentNotFound, "no such agent").with_context(
            ErrorContext::new().agent("security").operation("process"),
        );
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("security"));
    }
}
