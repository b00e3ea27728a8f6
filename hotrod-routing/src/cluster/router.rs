use arc_swap::ArcSwap;
use derivative::Derivative;
use fxhash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::*;

use crate::cluster::connection_pool::{ConnectionPool, ConnectionPoolConfig, PoolStatus};
use crate::cluster::failover::FailoverExecutor;
use crate::cluster::{
    ConnectionManager, PooledConnection, RouterConfig, ServerAddress, TcpConnectionManager,
    Topology, TopologyHolder,
};
use crate::error::{Error, Result};
use crate::future::BoxFuture;
use crate::load_balancing::BalancingStrategy;
use crate::retry::RetryPolicy;
use crate::transport::{RoutingTransport, TransportTcp};

type PoolMap<T, CM> = FxHashMap<ServerAddress, Arc<ConnectionPool<T, CM>>>;

/// Routes requests to cache servers. Holds the current topology, the balancing strategy and a
/// connection pool per server, and fails requests over to other servers on transport errors.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct Router<T: RoutingTransport, CM: ConnectionManager<T>> {
    topology: TopologyHolder,
    #[derivative(Debug = "ignore")]
    balancing_strategy: Box<dyn BalancingStrategy>,
    #[derivative(Debug = "ignore")]
    pools: ArcSwap<PoolMap<T, CM>>,
    #[derivative(Debug = "ignore")]
    connection_manager: Arc<CM>,
    pool_config: ConnectionPoolConfig,
    #[derivative(Debug = "ignore")]
    retry_policy: Arc<dyn RetryPolicy + Send + Sync>,
    request_timeout: Option<Duration>,
    #[derivative(Debug = "ignore")]
    topology_update: Mutex<()>,
}

impl Router<TransportTcp, TcpConnectionManager> {
    /// Creates a router using plain TCP connections with default settings.
    pub fn tcp(config: RouterConfig) -> Self {
        Router::new(config, Arc::new(TcpConnectionManager::default()))
    }
}

impl<T: RoutingTransport, CM: ConnectionManager<T>> Router<T, CM> {
    /// Creates a router with the balancing strategy named in the configuration.
    pub fn new(config: RouterConfig, connection_manager: Arc<CM>) -> Self {
        let balancing_strategy = config.balancing_strategy.create();
        Self::with_balancing_strategy(config, connection_manager, balancing_strategy)
    }

    /// Creates a router with a custom balancing strategy.
    pub fn with_balancing_strategy(
        config: RouterConfig,
        connection_manager: Arc<CM>,
        balancing_strategy: Box<dyn BalancingStrategy>,
    ) -> Self {
        let topology = TopologyHolder::new(config.servers);
        balancing_strategy.on_topology_changed(&topology.current());

        Router {
            topology,
            balancing_strategy,
            pools: ArcSwap::from_pointee(FxHashMap::default()),
            connection_manager,
            pool_config: config.pool_config,
            retry_policy: config.retry_policy,
            request_timeout: config.request_timeout,
            topology_update: Mutex::new(()),
        }
    }

    /// Returns the latest published topology.
    #[inline]
    pub fn current_topology(&self) -> Arc<Topology> {
        self.topology.current()
    }

    /// Publishes a new server list. The balancing strategy is notified and pools of servers which
    /// are no longer present are closed. Requests in flight keep the snapshot they started with.
    pub fn notify_topology_changed(&self, addresses: Vec<ServerAddress>) -> Arc<Topology> {
        let _update = self.topology_update.lock().unwrap();

        let topology = self.topology.publish(addresses);
        self.balancing_strategy.on_topology_changed(&topology);

        let mut removed = vec![];
        self.pools.rcu(|pools| {
            removed.clear();

            let mut retained = PoolMap::default();
            for (address, pool) in pools.iter() {
                if topology.contains(address) {
                    retained.insert(address.clone(), pool.clone());
                } else {
                    removed.push(pool.clone());
                }
            }

            retained
        });

        for pool in &removed {
            pool.evict_all();
        }

        if !removed.is_empty() {
            info!(
                generation = topology.generation(),
                removed = removed.len(),
                "Closed pools of removed servers."
            );
        }

        topology
    }

    /// Sends a request, failing over to other servers on transport errors. `send` is called with a
    /// connection checked out for the duration of a single attempt and may be called again for a
    /// different server.
    pub async fn execute<R, F>(&self, send: F) -> Result<R>
    where
        F: for<'c> FnMut(&'c mut T) -> BoxFuture<'c, Result<R>>,
    {
        let executor = FailoverExecutor::new(self);
        match self.request_timeout {
            Some(request_timeout) => tokio::time::timeout(request_timeout, executor.execute(send))
                .await
                .map_err(|_| {
                    Error::Timeout(format!(
                        "Request did not complete within {request_timeout:?}"
                    ))
                })?,
            None => executor.execute(send).await,
        }
    }

    /// Picks a server for the next attempt of a request, skipping servers which already failed for
    /// it.
    pub fn select(&self, excluded: &FxHashSet<ServerAddress>) -> Result<ServerAddress> {
        let topology = self.topology.current();
        self.balancing_strategy
            .next_server(&topology, excluded)
            .ok_or(Error::NoAddressAvailable)
    }

    /// Checks out a connection to the server chosen by the balancing strategy. No failover is
    /// done - see [`execute`](Self::execute) for that.
    pub async fn acquire(&self) -> Result<PooledConnection<T, CM>> {
        let address = self.select(&FxHashSet::default())?;
        self.acquire_from(&address).await
    }

    /// Checks out a connection to given server, creating its pool on first use.
    pub async fn acquire_from(&self, address: &ServerAddress) -> Result<PooledConnection<T, CM>> {
        self.pool(address).acquire().await
    }

    /// Returns the status of the pool for given server, if one has been created.
    pub fn pool_status(&self, address: &ServerAddress) -> Option<PoolStatus> {
        self.pools.load().get(address).map(|pool| pool.status())
    }

    #[inline]
    pub(crate) fn retry_policy(&self) -> &(dyn RetryPolicy + Send + Sync) {
        self.retry_policy.as_ref()
    }

    fn pool(&self, address: &ServerAddress) -> Arc<ConnectionPool<T, CM>> {
        if let Some(pool) = self.pools.load().get(address) {
            return pool.clone();
        }

        let created = Arc::new(ConnectionPool::new(
            address.clone(),
            self.connection_manager.clone(),
            self.pool_config,
        ));

        let previous = self.pools.rcu(|pools| {
            if pools.contains_key(address) {
                return pools.clone();
            }

            let mut pools = PoolMap::clone(pools);
            pools.insert(address.clone(), created.clone());
            Arc::new(pools)
        });

        let pool = match previous.get(address) {
            Some(pool) => pool.clone(),
            None => {
                debug!(%address, "Created connection pool.");
                created
            }
        };

        // the server might have been removed while the pool was being added
        if !self.topology.current().contains(address) {
            self.pools.rcu(|pools| {
                let mut pools = PoolMap::clone(pools);
                pools.remove(address);
                pools
            });

            pool.evict_all();
        }

        pool
    }
}
