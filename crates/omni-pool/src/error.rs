use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool exhausted: max {max_connections} connections, timed out after {timeout:?}")]
    Exhausted {
        max_connections: usize,
        timeout: Duration,
    },

    #[error("pool is closed")]
    Closed,

    #[error("failed to create connection: {0}")]
    ConnectFailed(String),
}
