use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Lifecycle state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    InUse,
    Closing,
}

/// Wraps a user connection with pool bookkeeping.
pub(crate) struct PooledConnection<T> {
    pub connection: T,
    pub state: ConnectionState,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub use_count: u64,
}

impl<T> PooledConnection<T> {
    pub fn new(connection: T) -> Self {
        let now = Instant::now();
        Self {
            connection,
            state: ConnectionState::Idle,
            created_at: now,
            last_used_at: now,
            use_count: 0,
        }
    }

    pub fn mark_in_use(&mut self) {
        self.state = ConnectionState::InUse;
        self.last_used_at = Instant::now();
        self.use_count += 1;
    }

    pub fn mark_idle(&mut self) {
        self.state = ConnectionState::Idle;
        self.last_used_at = Instant::now();
    }

    pub fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.state == ConnectionState::Idle && self.last_used_at.elapsed() > idle_timeout
    }
}

/// Creates, closes, and health-checks connections of type `T`. Implement
/// this for each backend (vector store, database, ...) the pool manages.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Connection: Send;

    async fn create(&self) -> Result<Self::Connection, String>;
    async fn close(&self, connection: Self::Connection);
    async fn is_healthy(&self, connection: &Self::Connection) -> bool;

    async fn on_acquire(&self, _connection: &Self::Connection) {}
    async fn on_release(&self, _connection: &Self::Connection) {}
}
