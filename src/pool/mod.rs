//! Upstream connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyRouter picks an endpoint
//!     → manager.rs (pool for that endpoint)
//!     → ConnectionPool::acquire
//!         - pop a reusable idle connection, or
//!         - reserve a slot and connect (upstream.rs), or
//!         - fail fast with PoolExhausted
//!     → connection.rs (Checkout guard held for the exchange)
//!     → Checkout::release (validate, back to idle) or drop (discard)
//! ```
//!
//! # Design Decisions
//! - One pool and one mutex per endpoint; the lock is never held across I/O
//! - No waiting for a free slot: callers get PoolExhausted and back off
//! - Dead or stale connections are dropped, never eagerly recreated
//! - Release is idempotent: unknown ids are ignored

pub mod connection;
pub mod manager;
pub mod upstream;

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use crate::error::{ProxyError, Result};
use crate::load_balancer::backend::EndpointId;
use crate::observability::metrics;

pub use connection::{Checkout, PooledConnection, Upstream};
pub use manager::PoolManager;
pub use upstream::UpstreamConnection;

/// Limits for one pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: usize,
    pub keepalive_timeout: Duration,
    pub validate_on_release: bool,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PoolStats {
    pub endpoint: String,
    pub max_connections: usize,
    pub idle: usize,
    pub checked_out: usize,
    pub created: u64,
    pub reused: u64,
    pub discarded: u64,
    pub exhausted: u64,
}

#[derive(Debug)]
struct PoolState<T> {
    idle: VecDeque<PooledConnection<T>>,
    checked_out: HashSet<u64>,
    closed: bool,
    created: u64,
    reused: u64,
    discarded: u64,
    exhausted: u64,
}

/// Bounded set of reusable connections to one endpoint.
#[derive(Debug)]
pub struct ConnectionPool<T> {
    endpoint: EndpointId,
    settings: PoolSettings,
    next_id: AtomicU64,
    state: Mutex<PoolState<T>>,
}

impl<T: Upstream> ConnectionPool<T> {
    pub fn new(endpoint: EndpointId, settings: PoolSettings) -> Self {
        Self {
            endpoint,
            settings,
            next_id: AtomicU64::new(1),
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(settings.max_connections),
                checked_out: HashSet::new(),
                closed: false,
                created: 0,
                reused: 0,
                discarded: 0,
                exhausted: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    /// Check out a connection.
    ///
    /// Reuses the most recently released idle connection when one is still
    /// alive, otherwise reserves a slot and runs `connect` outside the lock.
    /// Fails with [`ProxyError::PoolExhausted`] when every slot is taken.
    pub async fn acquire<F, Fut>(self: &Arc<Self>, connect: F) -> Result<Checkout<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let reservation = {
            let mut state = self.lock();
            if state.closed {
                return Err(ProxyError::PoolExhausted(self.endpoint.clone()));
            }

            while let Some(mut conn) = state.idle.pop_back() {
                if conn.is_reusable(self.settings.keepalive_timeout) {
                    conn.last_used = std::time::Instant::now();
                    state.checked_out.insert(conn.id);
                    state.reused += 1;
                    metrics::record_pool_event(&self.endpoint.to_string(), "reused");
                    return Ok(Checkout::new(self.clone(), conn));
                }
                state.discarded += 1;
                tracing::debug!(endpoint = %self.endpoint, conn_id = conn.id, "Discarding stale idle connection");
            }

            if state.checked_out.len() >= self.settings.max_connections {
                state.exhausted += 1;
                metrics::record_pool_event(&self.endpoint.to_string(), "exhausted");
                tracing::warn!(
                    endpoint = %self.endpoint,
                    max_connections = self.settings.max_connections,
                    "Connection pool exhausted"
                );
                return Err(ProxyError::PoolExhausted(self.endpoint.clone()));
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            state.checked_out.insert(id);
            Reservation { pool: self, id, armed: true }
        };

        let transport = connect().await?;
        let id = reservation.commit();

        self.lock().created += 1;
        metrics::record_pool_event(&self.endpoint.to_string(), "created");
        tracing::debug!(endpoint = %self.endpoint, conn_id = id, "Opened upstream connection");

        Ok(Checkout::new(
            self.clone(),
            PooledConnection::new(id, self.endpoint.clone(), transport),
        ))
    }

    /// Return a connection to the idle queue after validation.
    ///
    /// Releasing a connection that is not checked out (already released,
    /// discarded, or from before a shutdown) changes nothing.
    pub fn release(&self, mut conn: PooledConnection<T>) -> bool {
        let mut state = self.lock();
        if !state.checked_out.remove(&conn.id) {
            tracing::debug!(endpoint = %self.endpoint, conn_id = conn.id, "Ignoring release of connection not checked out");
            return false;
        }

        let alive = !self.settings.validate_on_release || conn.is_reusable(self.settings.keepalive_timeout);
        if state.closed || !alive || state.idle.len() >= self.settings.max_connections {
            state.discarded += 1;
            metrics::record_pool_event(&self.endpoint.to_string(), "discarded");
            return false;
        }

        conn.last_used = std::time::Instant::now();
        state.idle.push_back(conn);
        true
    }

    /// Free the slot of a connection that will not be reused.
    pub fn discard(&self, id: u64) {
        let mut state = self.lock();
        if state.checked_out.remove(&id) {
            state.discarded += 1;
            metrics::record_pool_event(&self.endpoint.to_string(), "discarded");
        }
    }

    /// Drop idle connections past the keepalive timeout or already closed.
    pub fn sweep(&self) -> usize {
        let mut state = self.lock();
        let before = state.idle.len();
        let keepalive = self.settings.keepalive_timeout;
        state.idle.retain(|conn| conn.is_reusable(keepalive));
        let removed = before - state.idle.len();
        state.discarded += removed as u64;
        removed
    }

    /// Drop every idle connection and refuse new checkouts.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        let dropped = state.idle.len();
        state.idle.clear();
        state.discarded += dropped as u64;
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            endpoint: self.endpoint.to_string(),
            max_connections: self.settings.max_connections,
            idle: state.idle.len(),
            checked_out: state.checked_out.len(),
            created: state.created,
            reused: state.reused,
            discarded: state.discarded,
            exhausted: state.exhausted,
        }
    }
}

/// Slot held while a new connection is being opened.
/// Dropped early (connect error, cancellation) it gives the slot back.
struct Reservation<'a, T: Upstream> {
    pool: &'a ConnectionPool<T>,
    id: u64,
    armed: bool,
}

impl<T: Upstream> Reservation<'_, T> {
    fn commit(mut self) -> u64 {
        self.armed = false;
        self.id
    }
}

impl<T: Upstream> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.lock().checked_out.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Debug, Clone)]
    struct FakeConn {
        open: Arc<AtomicBool>,
    }

    impl FakeConn {
        fn new() -> Self {
            Self { open: Arc::new(AtomicBool::new(true)) }
        }
    }

    impl Upstream for FakeConn {
        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    fn pool(max: usize) -> Arc<ConnectionPool<FakeConn>> {
        Arc::new(ConnectionPool::new(
            EndpointId::new("alpha", "127.0.0.1", 9000),
            PoolSettings {
                max_connections: max,
                keepalive_timeout: Duration::from_secs(300),
                validate_on_release: true,
            },
        ))
    }

    async fn fresh() -> Result<FakeConn> {
        Ok(FakeConn::new())
    }

    #[tokio::test]
    async fn test_acquire_reuses_released_connection() {
        let pool = pool(2);
        let first = pool.acquire(fresh).await.unwrap();
        let id = first.id();
        assert!(first.release());

        let second = pool.acquire(fresh).await.unwrap();
        assert_eq!(second.id(), id);
        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.checked_out, 1);
        assert_eq!(stats.idle, 0);
    }

    #[tokio::test]
    async fn test_exhaustion_fails_fast() {
        let pool = pool(2);
        let _a = pool.acquire(fresh).await.unwrap();
        let _b = pool.acquire(fresh).await.unwrap();

        let err = pool.acquire(fresh).await.err().unwrap();
        assert!(matches!(err, ProxyError::PoolExhausted(_)));
        assert_eq!(pool.stats().exhausted, 1);
    }

    #[tokio::test]
    async fn test_repeated_release_is_idempotent() {
        let pool = pool(2);
        let checkout = pool.acquire(fresh).await.unwrap();
        let conn = PooledConnection::new(checkout.id(), pool.endpoint().clone(), (*checkout).clone());
        assert!(checkout.release());

        // A second release of the same id must not double count.
        assert!(!pool.release(conn.clone()));
        assert!(!pool.release(conn));
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.checked_out, 0);
    }

    #[tokio::test]
    async fn test_dropped_checkout_frees_slot() {
        let pool = pool(1);
        {
            let _checkout = pool.acquire(fresh).await.unwrap();
            assert!(pool.acquire(fresh).await.is_err());
        }
        let stats = pool.stats();
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.idle, 0);
        assert!(pool.acquire(fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_discard_and_release_settle_slot_once() {
        let pool = pool(1);
        let checkout = pool.acquire(fresh).await.unwrap();
        checkout.discard();
        let stats = pool.stats();
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.discarded, 1);

        // A released guard must not discard on drop afterwards.
        let checkout = pool.acquire(fresh).await.unwrap();
        assert!(checkout.release());
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.discarded, 1);
    }

    #[tokio::test]
    async fn test_failed_connect_frees_slot() {
        let pool = pool(1);
        let err = pool
            .acquire(|| async {
                Err::<FakeConn, _>(ProxyError::UpstreamConnect {
                    endpoint: EndpointId::new("alpha", "127.0.0.1", 9000),
                    source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
                })
            })
            .await;
        assert!(err.is_err());
        assert_eq!(pool.stats().checked_out, 0);
        assert!(pool.acquire(fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_connection_not_reused() {
        let pool = pool(2);
        let checkout = pool.acquire(fresh).await.unwrap();
        checkout.open.store(false, Ordering::SeqCst);
        assert!(!checkout.release());

        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.discarded, 1);
    }

    #[tokio::test]
    async fn test_sweep_drops_stale_idle() {
        let pool = Arc::new(ConnectionPool::new(
            EndpointId::new("alpha", "127.0.0.1", 9000),
            PoolSettings {
                max_connections: 2,
                keepalive_timeout: Duration::from_millis(20),
                validate_on_release: true,
            },
        ));
        let checkout = pool.acquire(fresh).await.unwrap();
        let stale_id = checkout.id();
        checkout.release();
        assert_eq!(pool.stats().idle, 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(pool.sweep(), 1);
        assert_eq!(pool.stats().idle, 0);

        let next = pool.acquire(fresh).await.unwrap();
        assert_ne!(next.id(), stale_id);
    }

    #[tokio::test]
    async fn test_close_refuses_checkouts() {
        let pool = pool(2);
        let checkout = pool.acquire(fresh).await.unwrap();
        pool.close();
        assert!(!checkout.release());
        assert!(pool.acquire(fresh).await.is_err());
    }
}
