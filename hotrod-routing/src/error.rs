use std::io;
use std::result;
use thiserror::Error as ThisError;

use crate::cluster::ServerAddress;

pub type Result<T> = result::Result<T, Error>;

/// Routing error type. Transport-level errors (IO, connection, pool and timeout failures) are
/// handled by failover and only surface wrapped in [`Error::RetryBudgetExhausted`]. Protocol
/// errors reported by the operation layer are passed through unchanged.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Internal IO error, e.g. connection reset by peer.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// General error
    #[error("General error: {0}")]
    General(String),
    /// The topology contains no servers or the target pool has been closed.
    #[error("No server address available")]
    NoAddressAvailable,
    /// No connection slot became available within the acquire timeout.
    #[error("Connection pool exhausted for: {address}")]
    PoolExhausted { address: ServerAddress },
    /// A new connection could not be established.
    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed {
        address: ServerAddress,
        reason: String,
    },
    /// Timed out waiting for an operation to complete.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// Every attempted server failed, or the retry session gave up.
    #[error("All attempted servers failed ({}): {last_error}", display_addresses(.attempted))]
    RetryBudgetExhausted {
        attempted: Vec<ServerAddress>,
        last_error: Box<Error>,
    },
    /// Error reported by the operation layer. Never retried.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// Invalid server address.
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),
    /// Invalid router configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

fn display_addresses(addresses: &[ServerAddress]) -> String {
    itertools::join(addresses, ", ")
}

impl Error {
    /// Checks if the error comes from the transport layer and the request may be retried against
    /// a different server.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::PoolExhausted { .. }
                | Error::ConnectFailed { .. }
                | Error::Timeout(_)
        )
    }
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::General(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Error {
        Error::General(err.to_string())
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Io(error) => Error::Io(io::Error::new(
                error.kind(),
                error
                    .get_ref()
                    .map(|error| error.to_string())
                    .unwrap_or_default(),
            )),
            Error::General(error) => Error::General(error.clone()),
            Error::NoAddressAvailable => Error::NoAddressAvailable,
            Error::PoolExhausted { address } => Error::PoolExhausted {
                address: address.clone(),
            },
            Error::ConnectFailed { address, reason } => Error::ConnectFailed {
                address: address.clone(),
                reason: reason.clone(),
            },
            Error::Timeout(error) => Error::Timeout(error.clone()),
            Error::RetryBudgetExhausted {
                attempted,
                last_error,
            } => Error::RetryBudgetExhausted {
                attempted: attempted.clone(),
                last_error: last_error.clone(),
            },
            Error::Protocol(error) => Error::Protocol(error.clone()),
            Error::InvalidAddress(error) => Error::InvalidAddress(error.clone()),
            Error::InvalidConfiguration(error) => Error::InvalidConfiguration(error.clone()),
        }
    }
}
