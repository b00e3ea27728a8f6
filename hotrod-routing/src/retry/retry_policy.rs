use derive_more::Display;
#[cfg(test)]
use mockall::automock;

use crate::error::Error;

#[derive(Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Copy, Clone, Display)]
pub enum RetryDecision {
    RetryNextServer,
    DontRetry,
}

/// Request-specific information about current state of retrying.
pub trait RetrySession {
    /// Decide what to do with the failing request.
    fn decide(&mut self, error: &Error) -> RetryDecision;
}

/// Retry policy determines what to do in case of communication error.
#[cfg_attr(test, automock)]
pub trait RetryPolicy {
    /// Called for each new request, starts a session of deciding about retries. `known_servers`
    /// is the size of the topology at the time the request starts.
    fn new_session(&self, known_servers: usize) -> Box<dyn RetrySession + Send + Sync>;
}

/// Forwards all errors directly to the user, never retries
#[derive(Default, Debug, Clone, Copy)]
pub struct FallthroughRetryPolicy;

impl RetryPolicy for FallthroughRetryPolicy {
    fn new_session(&self, _known_servers: usize) -> Box<dyn RetrySession + Send + Sync> {
        Box::new(FallthroughRetrySession)
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct FallthroughRetrySession;

impl RetrySession for FallthroughRetrySession {
    fn decide(&mut self, _error: &Error) -> RetryDecision {
        RetryDecision::DontRetry
    }
}

/// Default retry policy - transport errors are retried on the next server, as long as the retry
/// budget allows. Without an explicit budget, every server known when the request starts is tried
/// at most once.
#[derive(Default, Debug, Clone, Copy)]
pub struct DefaultRetryPolicy {
    max_retries: Option<usize>,
}

impl DefaultRetryPolicy {
    pub fn new(max_retries: Option<usize>) -> Self {
        DefaultRetryPolicy { max_retries }
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn new_session(&self, known_servers: usize) -> Box<dyn RetrySession + Send + Sync> {
        let remaining_retries = self
            .max_retries
            .unwrap_or_else(|| known_servers.saturating_sub(1));

        Box::new(DefaultRetrySession { remaining_retries })
    }
}

#[derive(Debug)]
pub struct DefaultRetrySession {
    remaining_retries: usize,
}

impl RetrySession for DefaultRetrySession {
    fn decide(&mut self, error: &Error) -> RetryDecision {
        if !error.is_transport() || self.remaining_retries == 0 {
            return RetryDecision::DontRetry;
        }

        self.remaining_retries -= 1;
        RetryDecision::RetryNextServer
    }
}
