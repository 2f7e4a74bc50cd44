use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::PoolConfig;
use crate::connection::{ConnectionFactory, PooledConnection};
use crate::error::PoolError;

/// Point-in-time pool metrics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub total_connections: usize,
    pub idle_connections: usize,
    pub in_use_connections: usize,
    pub total_acquires: u64,
    pub total_releases: u64,
    pub total_timeouts: u64,
    pub total_errors: u64,
    pub avg_acquire_time_ms: f64,
    pub max_acquire_time_ms: f64,
}

#[derive(Default)]
struct Counters {
    total_acquires: u64,
    total_releases: u64,
    total_timeouts: u64,
    total_errors: u64,
    acquire_times_ms: Vec<f64>,
}

const MAX_ACQUIRE_SAMPLES: usize = 1000;

struct Inner<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    idle: Mutex<Vec<PooledConnection<F::Connection>>>,
    // Tracks how many connections are currently checked out, for the
    // total-connection count used by the max_connections gate. The actual
    // connection value lives in the caller's `PooledGuard`, not here.
    in_use_count: AtomicU64,
    next_id: AtomicU64,
    available: Notify,
    closed: AtomicBool,
    counters: Mutex<Counters>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

/// Async connection pool with idle cleanup and background health checks.
pub struct ConnectionPool<F: ConnectionFactory + 'static> {
    inner: Arc<Inner<F>>,
}

impl<F: ConnectionFactory + 'static> Clone for ConnectionPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: ConnectionFactory + 'static> ConnectionPool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                config,
                idle: Mutex::new(Vec::new()),
                in_use_count: AtomicU64::new(0),
                next_id: AtomicU64::new(0),
                available: Notify::new(),
                closed: AtomicBool::new(false),
                counters: Mutex::new(Counters::default()),
                cleanup_task: Mutex::new(None),
                health_task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub async fn stats(&self) -> PoolStats {
        let idle = self.inner.idle.lock().await;
        let in_use = self.inner.in_use_count.load(Ordering::SeqCst) as usize;
        let counters = self.inner.counters.lock().await;

        let (avg, max) = if counters.acquire_times_ms.is_empty() {
            (0.0, 0.0)
        } else {
            let sum: f64 = counters.acquire_times_ms.iter().sum();
            let max = counters
                .acquire_times_ms
                .iter()
                .cloned()
                .fold(f64::MIN, f64::max);
            (sum / counters.acquire_times_ms.len() as f64, max)
        };

        PoolStats {
            total_connections: idle.len() + in_use,
            idle_connections: idle.len(),
            in_use_connections: in_use,
            total_acquires: counters.total_acquires,
            total_releases: counters.total_releases,
            total_timeouts: counters.total_timeouts,
            total_errors: counters.total_errors,
            avg_acquire_time_ms: avg,
            max_acquire_time_ms: max,
        }
    }

    /// Starts the pool: creates `min_connections` eagerly (failures are
    /// logged, not fatal) and spawns the cleanup and health-check loops.
    pub async fn start(&self) {
        {
            let mut idle = self.inner.idle.lock().await;
            for _ in 0..self.inner.config.min_connections {
                match self.inner.factory.create().await {
                    Ok(conn) => idle.push(PooledConnection::new(conn)),
                    Err(e) => warn!(error = %e, "failed to create initial connection"),
                }
            }
        }

        let cleanup_inner = self.inner.clone();
        let cleanup_handle = tokio::spawn(async move { cleanup_loop(cleanup_inner).await });
        *self.inner.cleanup_task.lock().await = Some(cleanup_handle);

        let health_inner = self.inner.clone();
        let health_handle = tokio::spawn(async move { health_check_loop(health_inner).await });
        *self.inner.health_task.lock().await = Some(health_handle);

        let total = self.inner.idle.lock().await.len();
        info!(
            total,
            min = self.inner.config.min_connections,
            max = self.inner.config.max_connections,
            "connection pool started"
        );
    }

    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.inner.cleanup_task.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.inner.health_task.lock().await.take() {
            handle.abort();
        }

        let mut idle = self.inner.idle.lock().await;
        for pooled in idle.drain(..) {
            self.inner.factory.close(pooled.connection).await;
        }

        info!("connection pool closed");
    }

    /// Acquires a connection, starting the pool on first use. The returned
    /// guard returns the connection to the pool (health-checked) on drop.
    pub async fn acquire(&self) -> Result<PooledGuard<F>, PoolError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let started_at = Instant::now();
        let connection = self.acquire_inner().await?;
        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;

        {
            let mut counters = self.inner.counters.lock().await;
            counters.acquire_times_ms.push(elapsed_ms);
            if counters.acquire_times_ms.len() > MAX_ACQUIRE_SAMPLES {
                let overflow = counters.acquire_times_ms.len() - MAX_ACQUIRE_SAMPLES;
                counters.acquire_times_ms.drain(0..overflow);
            }
        }

        self.inner.factory.on_acquire(&connection).await;

        Ok(PooledGuard {
            pool: self.inner.clone(),
            connection: Some(connection),
        })
    }

    async fn acquire_inner(&self) -> Result<F::Connection, PoolError> {
        let deadline = Instant::now() + self.inner.config.acquire_timeout;

        loop {
            {
                let mut idle = self.inner.idle.lock().await;
                if let Some(mut pooled) = idle.pop() {
                    pooled.mark_in_use();
                    self.inner.in_use_count.fetch_add(1, Ordering::SeqCst);
                    self.inner.counters.lock().await.total_acquires += 1;
                    return Ok(pooled.connection);
                }
            }

            let total = self.inner.idle.lock().await.len()
                + self.inner.in_use_count.load(Ordering::SeqCst) as usize;
            if total < self.inner.config.max_connections {
                match self.create_connection_with_retry().await {
                    Ok(conn) => {
                        self.inner.in_use_count.fetch_add(1, Ordering::SeqCst);
                        self.inner.counters.lock().await.total_acquires += 1;
                        return Ok(conn);
                    }
                    Err(e) => {
                        self.inner.counters.lock().await.total_errors += 1;
                        warn!(error = %e, "failed to create connection");
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.inner.counters.lock().await.total_timeouts += 1;
                return Err(PoolError::Exhausted {
                    max_connections: self.inner.config.max_connections,
                    timeout: self.inner.config.acquire_timeout,
                });
            }

            if timeout(remaining, self.inner.available.notified())
                .await
                .is_err()
            {
                self.inner.counters.lock().await.total_timeouts += 1;
                return Err(PoolError::Exhausted {
                    max_connections: self.inner.config.max_connections,
                    timeout: self.inner.config.acquire_timeout,
                });
            }
        }
    }

    async fn create_connection_with_retry(&self) -> Result<F::Connection, String> {
        let retries = if self.inner.config.retry_connect_on_failure {
            self.inner.config.max_connect_retries.max(1)
        } else {
            1
        };

        let mut last_error = String::from("failed to create connection");
        for attempt in 0..retries {
            match self.inner.factory.create().await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    last_error = e;
                    if attempt + 1 < retries {
                        tokio::time::sleep(Duration::from_millis(100 * (attempt as u64 + 1))).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    async fn release(&self, connection: F::Connection) {
        self.inner.in_use_count.fetch_sub(1, Ordering::SeqCst);

        if self.inner.closed.load(Ordering::SeqCst) {
            self.inner.factory.close(connection).await;
            self.inner.available.notify_one();
            return;
        }

        self.inner.factory.on_release(&connection).await;

        if self.inner.factory.is_healthy(&connection).await {
            let mut pooled = PooledConnection::new(connection);
            pooled.mark_idle();
            self.inner.idle.lock().await.push(pooled);
            self.inner.counters.lock().await.total_releases += 1;
        } else {
            self.inner.factory.close(connection).await;
        }

        self.inner.available.notify_one();
    }
}

async fn cleanup_loop<F: ConnectionFactory + 'static>(inner: Arc<Inner<F>>) {
    loop {
        tokio::time::sleep(inner.config.idle_timeout / 2).await;
        if inner.closed.load(Ordering::SeqCst) {
            break;
        }

        let mut idle = inner.idle.lock().await;
        let min = inner.config.min_connections;
        let idle_timeout = inner.config.idle_timeout;
        let mut kept = Vec::with_capacity(idle.len());
        for pooled in idle.drain(..) {
            if kept.len() + 1 > min && pooled.is_expired(idle_timeout) {
                inner.factory.close(pooled.connection).await;
            } else {
                kept.push(pooled);
            }
        }
        *idle = kept;
    }
}

async fn health_check_loop<F: ConnectionFactory + 'static>(inner: Arc<Inner<F>>) {
    loop {
        tokio::time::sleep(inner.config.health_check_interval).await;
        if inner.closed.load(Ordering::SeqCst) {
            break;
        }

        let mut idle = inner.idle.lock().await;
        let mut healthy = Vec::with_capacity(idle.len());
        for pooled in idle.drain(..) {
            if inner.factory.is_healthy(&pooled.connection).await {
                healthy.push(pooled);
            } else {
                inner.factory.close(pooled.connection).await;
                info!("removed unhealthy connection from pool");
            }
        }
        *idle = healthy;
    }
}

/// RAII handle to a checked-out connection. Returns it to the pool on drop.
pub struct PooledGuard<F: ConnectionFactory + 'static> {
    pool: Arc<Inner<F>>,
    connection: Option<F::Connection>,
}

impl<F: ConnectionFactory + 'static> Deref for PooledGuard<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref().expect("connection taken only on drop")
    }
}

impl<F: ConnectionFactory + 'static> DerefMut for PooledGuard<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_mut().expect("connection taken only on drop")
    }
}

impl<F: ConnectionFactory + 'static> Drop for PooledGuard<F> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            let pool = self.pool.clone();
            tokio::spawn(async move {
                ConnectionPool { inner: pool }.release(connection).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct CountingFactory {
        next: AtomicU64,
    }

    #[async_trait]
    impl ConnectionFactory for CountingFactory {
        type Connection = u64;

        async fn create(&self) -> Result<u64, String> {
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }

        async fn close(&self, _connection: u64) {}

        async fn is_healthy(&self, _connection: &u64) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn acquire_reuses_released_connection() {
        let pool = ConnectionPool::new(
            CountingFactory {
                next: AtomicU64::new(0),
            },
            PoolConfig {
                min_connections: 0,
                max_connections: 1,
                ..Default::default()
            },
        );
        pool.start().await;

        let first_id = *pool.acquire().await.unwrap();
        // guard dropped here, connection released asynchronously
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second_id = *pool.acquire().await.unwrap();
        assert_eq!(first_id, second_id);
        pool.close().await;
    }

    #[tokio::test]
    async fn acquire_times_out_when_pool_exhausted() {
        let pool = ConnectionPool::new(
            CountingFactory {
                next: AtomicU64::new(0),
            },
            PoolConfig {
                min_connections: 0,
                max_connections: 1,
                acquire_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );
        pool.start().await;

        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(
            err,
            PoolError::Exhausted {
                max_connections: 1,
                ..
            }
        ));

        let stats = pool.stats().await;
        assert_eq!(stats.total_timeouts, 1);
        pool.close().await;
    }
}
