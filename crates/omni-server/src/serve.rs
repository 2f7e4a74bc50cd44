use std::net::SocketAddr;

use crate::router::{health_router, message_router};
use crate::state::AppState;

/// Binds the dual-port listener pair: the message channel on `host:port`,
/// health/config on `host:port+1`. Both serve
/// until either listener errors or the process receives `ctrl_c`.
pub async fn serve(host: &str, port: u16, state: AppState) -> anyhow::Result<()> {
    let message_addr: SocketAddr = format!("{host}:{port}").parse()?;
    let health_addr: SocketAddr = format!("{host}:{}", port + 1).parse()?;

    let message_listener = tokio::net::TcpListener::bind(message_addr).await?;
    let health_listener = tokio::net::TcpListener::bind(health_addr).await?;

    tracing::info!(%message_addr, %health_addr, "omni-server listening");

    let message_app = message_router(state.clone());
    let health_app = health_router(state);

    let message_server = axum::serve(message_listener, message_app).with_graceful_shutdown(ctrl_c());
    let health_server = axum::serve(health_listener, health_app).with_graceful_shutdown(ctrl_c());

    tokio::try_join!(
        async { message_server.await.map_err(anyhow::Error::from) },
        async { health_server.await.map_err(anyhow::Error::from) },
    )?;
    Ok(())
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
