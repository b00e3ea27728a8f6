use derive_more::{Constructor, Display};
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Port used when a server address does not specify one.
pub const DEFAULT_PORT: u16 = 11222;

/// Address of a single cache server. Two addresses are equal only if both host and port are equal,
/// so the same server reached through different host names is treated as two servers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Constructor, Display)]
#[display("{}:{port}", display_host(host))]
pub struct ServerAddress {
    host: String,
    port: u16,
}

fn display_host(host: &str) -> String {
    if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

impl ServerAddress {
    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<SocketAddr> for ServerAddress {
    fn from(addr: SocketAddr) -> Self {
        ServerAddress::new(addr.ip().to_string(), addr.port())
    }
}

impl FromStr for ServerAddress {
    type Err = Error;

    /// Parses `host:port`, `host` (default port) or `[ipv6]:port`.
    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::InvalidAddress(value.to_string()));
        }

        let (host, port) = if let Some(rest) = value.strip_prefix('[') {
            let (host, rest) = rest
                .split_once(']')
                .ok_or_else(|| Error::InvalidAddress(value.to_string()))?;

            match rest.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if rest.is_empty() => (host, None),
                None => return Err(Error::InvalidAddress(value.to_string())),
            }
        } else {
            match value.rsplit_once(':') {
                // bare ipv6 literal without brackets
                Some((host, _)) if host.contains(':') => (value, None),
                Some((host, port)) => (host, Some(port)),
                None => (value, None),
            }
        };

        if host.is_empty() {
            return Err(Error::InvalidAddress(value.to_string()));
        }

        let port = match port {
            Some(port) => port
                .parse()
                .map_err(|_| Error::InvalidAddress(value.to_string()))?,
            None => DEFAULT_PORT,
        };

        Ok(ServerAddress::new(host.to_string(), port))
    }
}

/// Parses a server list in the `host1:port1;host2:port2` form. Blank entries are skipped.
pub fn parse_server_list(servers: &str) -> Result<Vec<ServerAddress>> {
    servers
        .split(';')
        .filter(|server| !server.trim().is_empty())
        .map(str::parse)
        .collect()
}
