//! Correlation ids, structured logging, metrics (counters/gauges/timing
//! samples), and nested request traces — the observability substrate
//! component G names.

mod correlation;
mod logging;
mod metrics;
mod trace;

pub use correlation::{current_correlation_id, new_correlation_id, with_root_correlation, CorrelationGuard};
pub use logging::{init_logging, record, LogFields};
pub use metrics::{Metrics, TimedOperation, TimingStats};
pub use trace::{AgentSpan, RequestTrace, SpanGuard, SpanStatus};
