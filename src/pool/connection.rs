//! Pooled connection handles and checkout guards.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::load_balancer::backend::EndpointId;
use crate::pool::ConnectionPool;

/// Transport that can live in a [`ConnectionPool`].
pub trait Upstream: Send + 'static {
    /// Cheap liveness check; a closed transport is never reused.
    fn is_open(&self) -> bool;
}

/// A reusable upstream connection and its bookkeeping.
#[derive(Debug, Clone)]
pub struct PooledConnection<T> {
    pub(crate) id: u64,
    pub endpoint: EndpointId,
    pub created_at: Instant,
    pub last_used: Instant,
    pub(crate) transport: T,
}

impl<T: Upstream> PooledConnection<T> {
    pub(crate) fn new(id: u64, endpoint: EndpointId, transport: T) -> Self {
        let now = Instant::now();
        Self {
            id,
            endpoint,
            created_at: now,
            last_used: now,
            transport,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// A connection idle longer than `keepalive` or already closed is dead.
    pub fn is_reusable(&self, keepalive: Duration) -> bool {
        self.idle_for() <= keepalive && self.transport.is_open()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// Exclusive use of one pooled connection.
///
/// Call [`Checkout::release`] after a clean exchange. Dropping the guard
/// without releasing (error, timeout, cancelled request) discards the
/// connection and frees its slot.
pub struct Checkout<T: Upstream> {
    conn: PooledConnection<T>,
    slot: Slot<T>,
}

/// Frees the pool slot of a checked-out connection unless disarmed.
struct Slot<T: Upstream> {
    pool: Arc<ConnectionPool<T>>,
    id: u64,
    armed: bool,
}

impl<T: Upstream> Drop for Slot<T> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.discard(self.id);
        }
    }
}

impl<T: Upstream> Checkout<T> {
    pub(crate) fn new(pool: Arc<ConnectionPool<T>>, conn: PooledConnection<T>) -> Self {
        let slot = Slot {
            pool,
            id: conn.id,
            armed: true,
        };
        Self { conn, slot }
    }

    pub fn id(&self) -> u64 {
        self.conn.id
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.conn.endpoint
    }

    /// Hand the connection back to the pool. Returns true if it was kept idle.
    pub fn release(self) -> bool {
        let Checkout { conn, mut slot } = self;
        slot.armed = false;
        slot.pool.release(conn)
    }

    /// Drop the connection and free its slot.
    pub fn discard(self) {
        drop(self);
    }
}

impl<T: Upstream> Deref for Checkout<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.conn.transport
    }
}

impl<T: Upstream> DerefMut for Checkout<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn.transport
    }
}
