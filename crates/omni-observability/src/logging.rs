use std::path::Path;

use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Every log record from `logging::record` carries these fields so a
/// structured-log consumer can always group by request and by agent.
#[derive(Debug, Clone, Serialize)]
pub struct LogFields<'a> {
    pub correlation_id: Option<&'a str>,
    pub agent_id: Option<&'a str>,
    pub operation: Option<&'a str>,
    pub duration_ms: Option<u128>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl Default for LogFields<'_> {
    fn default() -> Self {
        Self { correlation_id: None, agent_id: None, operation: None, duration_ms: None, extra: serde_json::Value::Null }
    }
}

/// Emits one structured log record at `level`, with the correlation id
/// falling back to [`crate::current_correlation_id`] when the caller
/// doesn't supply one explicitly.
pub fn record(level: tracing::Level, message: &str, mut fields: LogFields<'_>) {
    let inherited = crate::current_correlation_id();
    let correlation_id = fields.correlation_id.map(str::to_string).or(inherited);
    let correlation_id = correlation_id.as_deref().unwrap_or("");
    let agent_id = fields.agent_id.take().unwrap_or("");
    let operation = fields.operation.take().unwrap_or("");
    let duration_ms = fields.duration_ms.unwrap_or(0);
    let extra = fields.extra.to_string();

    match level {
        tracing::Level::ERROR => {
            tracing::error!(correlation_id, agent_id, operation, duration_ms, extra, "{}", message)
        }
        tracing::Level::WARN => {
            tracing::warn!(correlation_id, agent_id, operation, duration_ms, extra, "{}", message)
        }
        tracing::Level::DEBUG => {
            tracing::debug!(correlation_id, agent_id, operation, duration_ms, extra, "{}", message)
        }
        tracing::Level::TRACE => {
            tracing::trace!(correlation_id, agent_id, operation, duration_ms, extra, "{}", message)
        }
        _ => tracing::info!(correlation_id, agent_id, operation, duration_ms, extra, "{}", message),
    }
}

/// Initializes process-wide logging: a compact console layer plus a
/// rotating JSON-lines file layer, filtered by `RUST_LOG`
/// (default `info`). The returned guard must be held for the process
/// lifetime — dropping it stops the non-blocking file writer.
pub fn init_logging(logs_dir: &Path, file_prefix: &str) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(file_prefix)
        .filename_suffix("jsonl")
        .build(logs_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_current_span(false)
        .with_span_list(false);

    let console_layer = tracing_subscriber::fmt::layer().compact().with_target(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_fields_default_to_empty() {
        let fields = LogFields::default();
        assert!(fields.correlation_id.is_none());
        assert!(fields.agent_id.is_none());
    }
}
