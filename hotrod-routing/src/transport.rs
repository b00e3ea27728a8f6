//!This module contains a declaration of `RoutingTransport` trait which should be implemented
//!for particular transport in order to be pooled and routed by the [`Router`](crate::cluster::Router).
//!
//! [`TransportTcp`] is the default TCP transport. It does not interpret the bytes it carries -
//! encoding cache operations is left to the caller.
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::*;

use crate::cluster::ServerAddress;
use crate::{Error, Result};

/// General routing transport trait.
pub trait RoutingTransport: Send + Sync {
    /// Checks if the connection is broken (e.g. after read or write errors). Must be cheap and
    /// must not block.
    fn is_broken(&self) -> bool;

    /// Returns associated server address
    fn address(&self) -> &ServerAddress;
}

/// Default Tcp transport.
pub struct TransportTcp {
    stream: TcpStream,
    address: ServerAddress,
    is_broken: AtomicBool,
}

impl TransportTcp {
    /// Connects to given server, with an optional timeout for establishing the connection.
    pub async fn new(
        address: ServerAddress,
        connect_timeout: Option<Duration>,
        tcp_nodelay: bool,
    ) -> Result<TransportTcp> {
        let connect = TcpStream::connect((address.host(), address.port()));
        let stream = match connect_timeout {
            Some(connect_timeout) => tokio::time::timeout(connect_timeout, connect)
                .await
                .map_err(|_| Error::ConnectFailed {
                    address: address.clone(),
                    reason: format!("timed out after {connect_timeout:?}"),
                })?,
            None => connect.await,
        }
        .map_err(|error| Error::ConnectFailed {
            address: address.clone(),
            reason: error.to_string(),
        })?;

        stream.set_nodelay(tcp_nodelay)?;

        trace!(%address, "Connection established.");

        Ok(TransportTcp {
            stream,
            address,
            is_broken: AtomicBool::new(false),
        })
    }

    /// Writes the whole buffer to the server.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let result = self.stream.write_all(data).await;
        self.check_io(result)
    }

    /// Flushes buffered data.
    pub async fn flush(&mut self) -> Result<()> {
        let result = self.stream.flush().await;
        self.check_io(result)
    }

    /// Reads exactly `buffer.len()` bytes. A closed connection is reported as an IO error.
    pub async fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        let result = self.stream.read_exact(buffer).await.map(|_| ());
        self.check_io(result)
    }

    /// Gives direct access to the underlying stream, for codecs which need it. Errors encountered
    /// this way should be reported with [`mark_broken`](Self::mark_broken).
    #[inline]
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Marks the connection as unusable. It will be discarded instead of going back to the pool.
    #[inline]
    pub fn mark_broken(&self) {
        self.is_broken.store(true, Ordering::Relaxed);
    }

    fn check_io<T>(&self, result: io::Result<T>) -> Result<T> {
        result.map_err(|error| {
            debug!(address = %self.address, %error, "Transport error.");
            self.mark_broken();
            Error::Io(error)
        })
    }
}

impl RoutingTransport for TransportTcp {
    /// Probes the socket with a non-blocking read. The probe consumes a byte if one is pending
    /// (and then reports the connection as broken), so it must only be called on idle
    /// connections, never in the middle of a request/response exchange.
    fn is_broken(&self) -> bool {
        if self.is_broken.load(Ordering::Relaxed) {
            return true;
        }

        // an idle connection should have nothing to read - EOF means the server closed it, and
        // stray data means the stream is out of sync
        let mut probe = [0u8; 1];
        match self.stream.try_read(&mut probe) {
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => false,
            Ok(0) => {
                trace!(address = %self.address, "Connection closed by server.");
                self.mark_broken();
                true
            }
            Ok(_) => {
                warn!(address = %self.address, "Unexpected data on idle connection.");
                self.mark_broken();
                true
            }
            Err(error) => {
                trace!(address = %self.address, %error, "Connection error.");
                self.mark_broken();
                true
            }
        }
    }

    #[inline]
    fn address(&self) -> &ServerAddress {
        &self.address
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn should_exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = ServerAddress::from(listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = [0u8; 4];
            socket.read_exact(&mut buffer).await.unwrap();
            socket.write_all(&buffer).await.unwrap();
            socket
        });

        let mut transport = TransportTcp::new(address.clone(), None, true)
            .await
            .unwrap();
        transport.write_all(b"ping").await.unwrap();

        let mut response = [0u8; 4];
        transport.read_exact(&mut response).await.unwrap();

        assert_eq!(&response, b"ping");
        assert_eq!(transport.address(), &address);
        assert!(!transport.is_broken());

        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn should_mark_broken_on_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = ServerAddress::from(listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut transport = TransportTcp::new(address, None, true).await.unwrap();
        server.await.unwrap();

        let mut response = [0u8; 1];
        assert!(transport.read_exact(&mut response).await.is_err());
        assert!(transport.is_broken());
    }

    #[tokio::test]
    async fn should_mark_broken_on_unexpected_data() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = ServerAddress::from(listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[42]).await.unwrap();
            socket
        });

        let transport = TransportTcp::new(address, None, true).await.unwrap();
        let _socket = server.await.unwrap();

        // the byte needs a moment to arrive over loopback
        let mut broken = false;
        for _ in 0..100 {
            if transport.is_broken() {
                broken = true;
                break;
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(broken);
        assert!(transport.is_broken());
    }

    #[tokio::test]
    async fn should_fail_connecting_to_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = ServerAddress::from(listener.local_addr().unwrap());
        drop(listener);

        let result = TransportTcp::new(address.clone(), Some(Duration::from_secs(5)), true).await;
        match result {
            Err(Error::ConnectFailed {
                address: failed, ..
            }) => assert_eq!(failed, address),
            _ => panic!("expected connect failure"),
        }
    }
}

#[cfg(test)]
pub(crate) use self::test_transport::TestTransport;
