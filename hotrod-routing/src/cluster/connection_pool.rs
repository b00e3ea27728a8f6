use derivative::Derivative;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::*;

use crate::cluster::{ConnectionManager, ServerAddress};
use crate::error::{Error, Result};
use crate::transport::RoutingTransport;

const DEFAULT_MAX_CONNECTIONS: usize = 8;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for per-server connection pools. By default, at most 8 connections are kept per
/// server and callers wait up to 5 seconds for a free one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionPoolConfig {
    max_connections: usize,
    acquire_timeout: Duration,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        ConnectionPoolConfig {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl ConnectionPoolConfig {
    /// Creates a new configuration for a pool of given size and acquire timeout.
    pub fn new(max_connections: usize, acquire_timeout: Duration) -> Self {
        assert!(max_connections > 0);
        ConnectionPoolConfig {
            max_connections,
            acquire_timeout,
        }
    }

    #[inline]
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    #[inline]
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }
}

/// Point-in-time connection counts of a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStatus {
    pub idle: usize,
    pub in_use: usize,
}

/// Pool of connections to a single server. Checked out connections hold a slot until they are
/// released or dropped, so idle and in-use connections together never exceed the configured
/// maximum.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct ConnectionPool<T: RoutingTransport, CM: ConnectionManager<T>> {
    address: ServerAddress,
    config: ConnectionPoolConfig,
    #[derivative(Debug = "ignore")]
    connection_manager: Arc<CM>,
    #[derivative(Debug = "ignore")]
    state: Mutex<PoolState<T>>,
    #[derivative(Debug = "ignore")]
    slots: Arc<Semaphore>,
}

struct PoolState<T> {
    idle: Vec<T>,
    in_use: usize,
}

impl<T: RoutingTransport, CM: ConnectionManager<T>> ConnectionPool<T, CM> {
    pub fn new(
        address: ServerAddress,
        connection_manager: Arc<CM>,
        config: ConnectionPoolConfig,
    ) -> Self {
        ConnectionPool {
            address,
            config,
            connection_manager,
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(config.max_connections),
                in_use: 0,
            }),
            slots: Arc::new(Semaphore::new(config.max_connections)),
        }
    }

    #[inline]
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Returns an idle connection which passes the liveness check, or opens a new one. Waits for
    /// a free slot up to the configured acquire timeout.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection<T, CM>> {
        let slot = match tokio::time::timeout(
            self.config.acquire_timeout,
            self.slots.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(slot)) => slot,
            // closed by eviction
            Ok(Err(_)) => return Err(Error::NoAddressAvailable),
            Err(_) => {
                warn!(address = %self.address, "Connection pool exhausted.");
                return Err(Error::PoolExhausted {
                    address: self.address.clone(),
                });
            }
        };

        let transport = match self.take_idle() {
            Some(transport) => transport,
            None => {
                trace!(address = %self.address, "Opening new connection.");
                let transport = self.connection_manager.connection(&self.address).await?;
                self.state.lock().unwrap().in_use += 1;
                transport
            }
        };

        Ok(PooledConnection {
            transport: Some(transport),
            pool: Arc::downgrade(self),
            _slot: slot,
        })
    }

    /// Closes the pool: every idle connection is dropped and subsequent acquisitions fail.
    /// Connections which are currently checked out are discarded when released.
    pub fn evict_all(&self) {
        self.slots.close();

        let idle = std::mem::take(&mut self.state.lock().unwrap().idle);
        debug!(address = %self.address, closed = idle.len(), "Evicted connection pool.");
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock().unwrap();
        PoolStatus {
            idle: state.idle.len(),
            in_use: state.in_use,
        }
    }

    fn take_idle(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        while let Some(transport) = state.idle.pop() {
            if !transport.is_broken() {
                state.in_use += 1;
                return Some(transport);
            }

            trace!(address = %self.address, "Discarding broken idle connection.");
        }

        None
    }

    fn check_in(&self, transport: T, healthy: bool) {
        let mut state = self.state.lock().unwrap();
        state.in_use -= 1;

        if !healthy {
            trace!(address = %self.address, "Discarding unhealthy connection.");
        } else if self.is_closed() {
            trace!(address = %self.address, "Discarding connection released to closed pool.");
        } else {
            state.idle.push(transport);
        }
    }
}

/// Connection checked out of a [`ConnectionPool`], exclusively owned by one request. Dropping it
/// without calling [`release`](Self::release) closes the connection.
pub struct PooledConnection<T: RoutingTransport, CM: ConnectionManager<T>> {
    transport: Option<T>,
    pool: Weak<ConnectionPool<T, CM>>,
    // declared last - the slot is freed only after the connection went back to the pool
    _slot: OwnedSemaphorePermit,
}

impl<T: RoutingTransport, CM: ConnectionManager<T>> PooledConnection<T, CM> {
    /// Returns the connection to its pool if it is healthy, otherwise closes it.
    #[inline]
    pub fn release(mut self, healthy: bool) {
        self.check_in(healthy);
    }

    fn check_in(&mut self, healthy: bool) {
        if let Some(transport) = self.transport.take() {
            let healthy = healthy && !transport.is_broken();
            if let Some(pool) = self.pool.upgrade() {
                pool.check_in(transport, healthy);
            }
        }
    }
}

impl<T: RoutingTransport, CM: ConnectionManager<T>> Drop for PooledConnection<T, CM> {
    fn drop(&mut self) {
        self.check_in(false);
    }
}

impl<T: RoutingTransport, CM: ConnectionManager<T>> Deref for PooledConnection<T, CM> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // only taken on release, which consumes the connection
        self.transport.as_ref().unwrap()
    }
}

impl<T: RoutingTransport, CM: ConnectionManager<T>> DerefMut for PooledConnection<T, CM> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.transport.as_mut().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cluster::connection_manager::TestConnectionManager;
    use crate::transport::TestTransport;

    fn address() -> ServerAddress {
        ServerAddress::new("localhost".into(), 11222)
    }

    fn create_pool(
        max_connections: usize,
        acquire_timeout: Duration,
    ) -> (
        Arc<ConnectionPool<TestTransport, TestConnectionManager>>,
        Arc<TestConnectionManager>,
    ) {
        let connection_manager = Arc::new(TestConnectionManager::default());
        let pool = Arc::new(ConnectionPool::new(
            address(),
            connection_manager.clone(),
            ConnectionPoolConfig::new(max_connections, acquire_timeout),
        ));

        (pool, connection_manager)
    }

    #[tokio::test]
    async fn should_reuse_released_connection() {
        let (pool, connection_manager) = create_pool(2, Duration::from_secs(1));

        let connection = pool.acquire().await.unwrap();
        let id = connection.id();
        connection.release(true);

        assert_eq!(pool.status(), PoolStatus { idle: 1, in_use: 0 });

        let connection = pool.acquire().await.unwrap();
        assert_eq!(connection.id(), id);
        assert_eq!(connection_manager.opened(), 1);
        assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 1 });
    }

    #[tokio::test]
    async fn should_discard_unhealthy_connection() {
        let (pool, connection_manager) = create_pool(2, Duration::from_secs(1));

        pool.acquire().await.unwrap().release(false);
        assert_eq!(pool.status(), PoolStatus::default());
        assert_eq!(connection_manager.live(), 0);

        pool.acquire().await.unwrap().release(true);
        assert_eq!(connection_manager.opened(), 2);
    }

    #[tokio::test]
    async fn should_discard_dropped_connection() {
        let (pool, connection_manager) = create_pool(1, Duration::from_secs(1));

        drop(pool.acquire().await.unwrap());

        assert_eq!(pool.status(), PoolStatus::default());
        assert_eq!(connection_manager.live(), 0);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn should_skip_broken_idle_connection() {
        let (pool, connection_manager) = create_pool(2, Duration::from_secs(1));

        pool.acquire().await.unwrap().release(true);
        connection_manager.break_all();

        let connection = pool.acquire().await.unwrap();
        assert!(!connection.is_broken());
        assert_eq!(connection_manager.opened(), 2);
        assert_eq!(connection_manager.live(), 1);
    }

    #[tokio::test]
    async fn should_fail_when_exhausted() {
        let (pool, _) = create_pool(1, Duration::from_millis(20));

        let _connection = pool.acquire().await.unwrap();

        match pool.acquire().await {
            Err(Error::PoolExhausted { address: failed }) => assert_eq!(failed, address()),
            _ => panic!("expected pool exhaustion"),
        }
    }

    #[tokio::test]
    async fn should_wait_for_released_connection() {
        let (pool, connection_manager) = create_pool(1, Duration::from_secs(5));

        let connection = pool.acquire().await.unwrap();
        let waiting = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire().await.map(|connection| connection.id()) }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let id = connection.id();
        connection.release(true);

        assert_eq!(waiting.await.unwrap().unwrap(), id);
        assert_eq!(connection_manager.opened(), 1);
    }

    #[tokio::test]
    async fn should_propagate_connect_failure() {
        let (pool, connection_manager) = create_pool(1, Duration::from_secs(1));
        connection_manager.set_down(&address(), true);

        assert!(matches!(
            pool.acquire().await,
            Err(Error::ConnectFailed { .. })
        ));

        // the slot must have been returned
        connection_manager.set_down(&address(), false);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn should_evict_all_connections() {
        let (pool, connection_manager) = create_pool(3, Duration::from_secs(1));

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        first.release(true);

        pool.evict_all();

        assert!(pool.is_closed());
        assert_eq!(pool.status().idle, 0);
        assert!(matches!(pool.acquire().await, Err(Error::NoAddressAvailable)));

        second.release(true);
        assert_eq!(pool.status().idle, 0);
        assert_eq!(connection_manager.live(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_never_exceed_max_connections() {
        const MAX: usize = 3;

        let (pool, connection_manager) = create_pool(MAX, Duration::from_millis(50));

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let pool = pool.clone();
                let connection_manager = connection_manager.clone();
                tokio::spawn(async move {
                    for round in 0..8 {
                        if let Ok(connection) = pool.acquire().await {
                            let status = pool.status();
                            assert!(status.idle + status.in_use <= MAX);
                            assert!(connection_manager.live() <= MAX);

                            tokio::time::sleep(Duration::from_millis(1)).await;
                            connection.release((i + round) % 3 != 0);
                        }

                        let status = pool.status();
                        assert!(status.idle + status.in_use <= MAX);
                        assert!(connection_manager.live() <= MAX);
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(pool.status().in_use, 0);
        assert!(pool.status().idle <= MAX);
        assert_eq!(connection_manager.live(), pool.status().idle);
    }
}
