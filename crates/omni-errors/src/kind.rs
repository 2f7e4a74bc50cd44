use serde::{Deserialize, Serialize};

/// The error taxonomy from the error-handling design: kinds, not concrete
/// types. Grouped by the subsystem that raises them, mirroring the nested
/// shape named in the component design rather than flattening to one enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AgentTimeout,
    AgentValidation,
    AgentConfiguration,
    AgentNotFound,
    AgentFatal,
    AgentDependency,

    LlmTimeout,
    LlmRateLimit,
    LlmAuthentication,
    LlmResponse,

    VectorDbConnection,
    VectorDbQuery,
    VectorDbIndex,

    RagIndex,
    RagQuery,

    WorkflowTimeout,
    WorkflowValidation,
    WorkflowStage,

    /// Raised by a `TimeBudget` when remaining time is exhausted before a
    /// step can start.
    BudgetExhausted,
    /// Pool exhaustion / generic connection-pool failures that don't fit
    /// the vector-db-specific kinds.
    PoolExhausted,
    PoolClosed,
}

impl ErrorKind {
    /// Default recoverability per kind: timeout, rate-limit, and connection
    /// errors default to recoverable; validation, auth, not-found, and
    /// fatal kinds default to non-recoverable.
    pub fn default_recoverable(self) -> bool {
        use ErrorKind::*;
        matches!(
            self,
            AgentTimeout
                | LlmTimeout
                | LlmRateLimit
                | VectorDbConnection
                | WorkflowTimeout
                | BudgetExhausted
                | PoolExhausted
        )
    }

    /// Whether the default retry policies should consider this kind
    /// retryable by default (used by `RetryConfig::default_retryable`).
    pub fn is_default_retryable(self) -> bool {
        use ErrorKind::*;
        matches!(
            self,
            AgentTimeout | LlmTimeout | LlmRateLimit | VectorDbConnection | PoolExhausted
        )
    }
}
