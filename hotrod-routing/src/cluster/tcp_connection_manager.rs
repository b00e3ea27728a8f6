use futures::FutureExt;
use std::time::Duration;

use crate::cluster::{ConnectionManager, ServerAddress};
use crate::future::BoxFuture;
use crate::transport::TransportTcp;
use crate::Result;

/// Opens plain TCP connections.
#[derive(Clone, Copy, Debug)]
pub struct TcpConnectionManager {
    connect_timeout: Option<Duration>,
    tcp_nodelay: bool,
}

impl Default for TcpConnectionManager {
    fn default() -> Self {
        TcpConnectionManager::new(None, true)
    }
}

impl ConnectionManager<TransportTcp> for TcpConnectionManager {
    fn connection<'a>(&'a self, address: &'a ServerAddress) -> BoxFuture<'a, Result<TransportTcp>> {
        TransportTcp::new(address.clone(), self.connect_timeout, self.tcp_nodelay).boxed()
    }
}

impl TcpConnectionManager {
    pub fn new(connect_timeout: Option<Duration>, tcp_nodelay: bool) -> Self {
        TcpConnectionManager {
            connect_timeout,
            tcp_nodelay,
        }
    }
}
