//! Error taxonomy, retry policy, and timeout/time-budget primitives shared
//! by every crate in the workspace.

mod error;
mod kind;
mod retry;
mod timeout;

pub use error::{ErrorContext, OmniError};
pub use kind::ErrorKind;
pub use retry::{
    retry_async, should_retry, RetryConfig, RetryContext, RETRY_FAST, RETRY_PATIENT,
    RETRY_STANDARD,
};
pub use timeout::{
    run_with_timeout, run_with_timeout_structured, StepOutcome, StepRun, TimeBudget,
    TimeoutResult,
};

pub type Result<T> = std::result::Result<T, OmniError>;
