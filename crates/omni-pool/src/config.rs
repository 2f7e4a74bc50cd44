use std::time::Duration;

/// Tuning knobs for a [`crate::ConnectionPool`]. Mirrors the defaults used
/// for database and vector-store pooling.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_connections: usize,
    pub max_connections: usize,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
    pub health_check_interval: Duration,
    pub retry_connect_on_failure: bool,
    pub max_connect_retries: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            idle_timeout: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(60),
            retry_connect_on_failure: true,
            max_connect_retries: 3,
        }
    }
}
