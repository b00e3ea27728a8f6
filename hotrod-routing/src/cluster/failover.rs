use fxhash::FxHashSet;
use tracing::*;

use crate::cluster::{ConnectionManager, Router, ServerAddress};
use crate::error::{Error, Result};
use crate::future::BoxFuture;
use crate::retry::{RetryDecision, RetrySession};
use crate::transport::RoutingTransport;

/// Runs a single request against the router: selects a server, sends the request over a pooled
/// connection and on transport errors asks the retry session whether to try another server.
/// Servers which failed are skipped for the rest of the request only.
pub struct FailoverExecutor<'a, T: RoutingTransport, CM: ConnectionManager<T>> {
    router: &'a Router<T, CM>,
    retry_session: Box<dyn RetrySession + Send + Sync>,
    excluded: FxHashSet<ServerAddress>,
    attempted: Vec<ServerAddress>,
}

impl<'a, T: RoutingTransport, CM: ConnectionManager<T>> FailoverExecutor<'a, T, CM> {
    pub fn new(router: &'a Router<T, CM>) -> Self {
        let known_servers = router.current_topology().len();
        FailoverExecutor {
            router,
            retry_session: router.retry_policy().new_session(known_servers),
            excluded: Default::default(),
            attempted: vec![],
        }
    }

    pub async fn execute<R, F>(mut self, mut send: F) -> Result<R>
    where
        F: for<'c> FnMut(&'c mut T) -> BoxFuture<'c, Result<R>>,
    {
        let mut last_error = None;

        loop {
            let address = match self.router.select(&self.excluded) {
                Ok(address) => address,
                Err(error) => {
                    return Err(match last_error {
                        Some(last_error) => {
                            warn!("No servers left to try.");
                            self.exhausted(last_error)
                        }
                        None => error,
                    })
                }
            };

            trace!(%address, attempt = self.attempted.len() + 1, "Sending request.");

            let result = match self.router.acquire_from(&address).await {
                Ok(mut connection) => {
                    let result = send(&mut *connection).await;
                    let healthy = !matches!(&result, Err(error) if error.is_transport());
                    connection.release(healthy);
                    result
                }
                Err(Error::NoAddressAvailable) => {
                    debug!(%address, "Server removed while the request was in progress.");
                    self.excluded.insert(address);
                    continue;
                }
                Err(error) => Err(error),
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_transport() => return Err(error),
                Err(error) => error,
            };

            self.attempted.push(address.clone());
            self.excluded.insert(address.clone());

            match self.retry_session.decide(&error) {
                RetryDecision::RetryNextServer => {
                    warn!(%address, %error, "Request failed, trying next server.");
                    last_error = Some(error);
                }
                RetryDecision::DontRetry => {
                    warn!(%address, %error, "Request failed, not retrying.");
                    return Err(self.exhausted(error));
                }
            }
        }
    }

    fn exhausted(&mut self, last_error: Error) -> Error {
        Error::RetryBudgetExhausted {
            attempted: std::mem::take(&mut self.attempted),
            last_error: Box::new(last_error),
        }
    }
}
