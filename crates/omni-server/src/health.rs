use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// `GET /health` on the health/config port (`port + 1`). Always
/// succeeds once the process is listening — there is no "starting up"
/// phase distinct from "serving", since agent registration happens
/// before the listener binds.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.uptime_seconds(),
        "agents": state.orchestrator.agent_ids(),
    }))
}

/// `GET /config` — the redacted view of the running configuration.
pub async fn config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.config.as_ref().clone())
}

/// `GET /metrics` — request counters and per-operation timing stats
/// accumulated by [`omni_observability::Metrics`] since process start.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "requestsTotal": state.metrics.counter("wire.requests_total"),
        "sendToAgent": state.metrics.timing_stats("orchestrator.send_to_agent"),
        "validateCode": state.metrics.timing_stats("orchestrator.validate_code"),
        "analyzeWorkspace": state.metrics.timing_stats("workflow.analyze_workspace"),
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::router::health_router;
    use crate::state::AppState;

    async fn test_state() -> AppState {
        crate::state::build_state(crate::state::RedactedConfig {
            host: "127.0.0.1".into(),
            port: 7890,
            log_level: "info".into(),
            enable_streaming: true,
            enable_rag: false,
            default_agents: vec!["context".into()],
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn health_route_reports_healthy() {
        let state = test_state().await;
        let app = health_router(state);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn config_route_omits_secrets() {
        let state = test_state().await;
        let app = health_router(state);
        let response = app
            .oneshot(Request::builder().uri("/config").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value.get("apiKey").is_none());
        assert!(value.get("host").is_some());
    }
}
