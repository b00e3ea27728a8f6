pub use crate::cluster::config::{RouterConfig, RouterConfigBuilder};
pub use crate::cluster::connection_manager::ConnectionManager;
pub use crate::cluster::connection_pool::{
    ConnectionPool, ConnectionPoolConfig, PoolStatus, PooledConnection,
};
pub use crate::cluster::failover::FailoverExecutor;
pub use crate::cluster::router::Router;
pub use crate::cluster::server_address::{parse_server_list, ServerAddress, DEFAULT_PORT};
pub use crate::cluster::tcp_connection_manager::TcpConnectionManager;
pub use crate::cluster::topology::{Topology, TopologyHolder};

mod config;
mod connection_manager;
mod connection_pool;
mod failover;
mod router;
mod server_address;
mod tcp_connection_manager;
mod topology;
