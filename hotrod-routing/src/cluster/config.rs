use derivative::Derivative;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::connection_pool::ConnectionPoolConfig;
use crate::cluster::server_address::parse_server_list;
use crate::cluster::ServerAddress;
use crate::error::{Error, Result};
use crate::load_balancing::BalancingStrategyKind;
use crate::retry::{DefaultRetryPolicy, RetryPolicy};

/// Router configuration. Use [`RouterConfigBuilder`] to create one.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct RouterConfig {
    pub servers: Vec<ServerAddress>,
    pub balancing_strategy: BalancingStrategyKind,
    pub pool_config: ConnectionPoolConfig,
    #[derivative(Debug = "ignore")]
    pub retry_policy: Arc<dyn RetryPolicy + Send + Sync>,
    pub request_timeout: Option<Duration>,
}

/// Builder structure that helps to configure the router.
pub struct RouterConfigBuilder {
    servers: Vec<ServerAddress>,
    server_list: Option<String>,
    balancing_strategy: BalancingStrategyKind,
    max_connections_per_address: usize,
    acquire_timeout: Duration,
    retry_policy: Arc<dyn RetryPolicy + Send + Sync>,
    request_timeout: Option<Duration>,
}

impl Default for RouterConfigBuilder {
    fn default() -> Self {
        let pool_config = ConnectionPoolConfig::default();
        RouterConfigBuilder {
            servers: vec![],
            server_list: None,
            balancing_strategy: Default::default(),
            max_connections_per_address: pool_config.max_connections(),
            acquire_timeout: pool_config.acquire_timeout(),
            retry_policy: Arc::new(DefaultRetryPolicy::default()),
            request_timeout: None,
        }
    }
}

impl RouterConfigBuilder {
    pub fn new() -> RouterConfigBuilder {
        Default::default()
    }

    /// Adds server address.
    pub fn with_server_address(mut self, address: ServerAddress) -> Self {
        self.servers.push(address);
        self
    }

    /// Adds servers from a `host1:port1;host2:port2` list. The list is parsed when building.
    pub fn with_server_list(mut self, servers: impl Into<String>) -> Self {
        self.server_list = Some(servers.into());
        self
    }

    /// Sets the request balancing strategy.
    pub fn with_balancing_strategy(mut self, balancing_strategy: BalancingStrategyKind) -> Self {
        self.balancing_strategy = balancing_strategy;
        self
    }

    /// Sets the maximum number of connections (idle and in use) kept per server.
    pub fn with_max_connections_per_address(mut self, max_connections: usize) -> Self {
        self.max_connections_per_address = max_connections;
        self
    }

    /// Sets how long a request waits for a free connection slot before trying another server.
    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Sets the number of retries on other servers after a transport failure. `None` means every
    /// known server is tried at most once.
    pub fn with_max_retries(self, max_retries: Option<usize>) -> Self {
        self.with_retry_policy(Arc::new(DefaultRetryPolicy::new(max_retries)))
    }

    /// Sets a custom retry policy.
    pub fn with_retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy + Send + Sync>) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sets the overall timeout of a single request, including all retries.
    pub fn with_request_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Finalizes building process
    pub fn build(self) -> Result<RouterConfig> {
        if self.max_connections_per_address == 0 {
            return Err(Error::InvalidConfiguration(
                "Maximum connections per address must be positive".into(),
            ));
        }

        let mut servers = self.servers;
        if let Some(server_list) = self.server_list {
            servers.extend(parse_server_list(&server_list)?);
        }

        Ok(RouterConfig {
            servers,
            balancing_strategy: self.balancing_strategy,
            pool_config: ConnectionPoolConfig::new(
                self.max_connections_per_address,
                self.acquire_timeout,
            ),
            retry_policy: self.retry_policy,
            request_timeout: self.request_timeout,
        })
    }
}
