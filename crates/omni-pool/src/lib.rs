//! Generic async connection pool: acquire/release, idle-connection cleanup,
//! periodic health checks, and basic acquire-time metrics.

mod config;
mod connection;
mod error;
mod pool;

pub use config::PoolConfig;
pub use connection::{ConnectionFactory, ConnectionState};
pub use error::PoolError;
pub use pool::{ConnectionPool, PoolStats, PooledGuard};
