use crate::cluster::ServerAddress;
use crate::future::BoxFuture;
use crate::transport::RoutingTransport;
use crate::Result;

/// Manages establishing connections to servers. Opening a connection may perform a blocking
/// handshake; the router only calls it while holding a pool slot for the address.
pub trait ConnectionManager<T: RoutingTransport>: Send + Sync {
    /// Tries to establish a new, ready to use connection to given server.
    fn connection<'a>(&'a self, address: &'a ServerAddress) -> BoxFuture<'a, Result<T>>;
}

#[cfg(test)]
pub(crate) use self::test_connection_manager::TestConnectionManager;
