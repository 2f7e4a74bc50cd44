use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::health::{config, health, metrics};
use crate::state::AppState;
use crate::ws::ws_upgrade;

/// Router bound on `port`: the message channel.
pub fn message_router(state: AppState) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(state)
}

/// Router bound on `port + 1`: health and redacted config. Kept
/// on a separate listener so a client can probe liveness without the
/// message channel's CORS and upgrade machinery in its path.
pub fn health_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    Router::new()
        .route("/health", get(health))
        .route("/config", get(config))
        .route("/metrics", get(metrics))
        .layer(cors)
        .with_state(state)
}
