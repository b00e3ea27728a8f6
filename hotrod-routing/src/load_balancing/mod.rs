//! Request balancing strategies. A strategy picks the server the next request should be sent to,
//! from the topology snapshot it is given. Strategies never block and never return an address
//! which is not part of that snapshot.
//!
//! Only the router calls the strategy. On failover it passes the servers which already failed
//! for the request as an exclusion set, next to the full snapshot, so positions in the rotation
//! always refer to the whole topology.

mod always_first;
mod random;
mod round_robin;

pub use self::always_first::AlwaysFirstBalancingStrategy;
pub use self::random::RandomBalancingStrategy;
pub use self::round_robin::RoundRobinBalancingStrategy;

use derive_more::Display;
use fxhash::FxHashSet;
use std::str::FromStr;

use crate::cluster::{ServerAddress, Topology};
use crate::error::Error;

/// Request balancing strategy, choosing target servers for requests.
pub trait BalancingStrategy: Send + Sync {
    /// Called whenever a new topology is published, before it is used for selection.
    fn on_topology_changed(&self, topology: &Topology);

    /// Returns the server to use for the next request, skipping `excluded` ones, or `None` if no
    /// server is left. May be called concurrently, including concurrently with
    /// `on_topology_changed`.
    fn next_server(
        &self,
        topology: &Topology,
        excluded: &FxHashSet<ServerAddress>,
    ) -> Option<ServerAddress>;
}

/// Available balancing strategies, for use in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum BalancingStrategyKind {
    #[default]
    #[display("round-robin")]
    RoundRobin,
    #[display("always-first")]
    AlwaysFirst,
    #[display("random")]
    Random,
}

impl BalancingStrategyKind {
    /// Creates a new strategy instance with fresh internal state.
    pub fn create(self) -> Box<dyn BalancingStrategy> {
        match self {
            BalancingStrategyKind::RoundRobin => Box::new(RoundRobinBalancingStrategy::new()),
            BalancingStrategyKind::AlwaysFirst => Box::new(AlwaysFirstBalancingStrategy::new()),
            BalancingStrategyKind::Random => Box::new(RandomBalancingStrategy::new()),
        }
    }
}

impl FromStr for BalancingStrategyKind {
    type Err = Error;

    /// Accepts kebab-case names and strategy class names, ignoring case and package prefix.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let name = value.trim().rsplit('.').next().unwrap_or_default();
        match name.to_ascii_lowercase().as_str() {
            "round-robin" | "roundrobin" | "roundrobinbalancingstrategy" => {
                Ok(BalancingStrategyKind::RoundRobin)
            }
            "always-first" | "alwaysfirst" | "alwaysfirstbalancingstrategy" => {
                Ok(BalancingStrategyKind::AlwaysFirst)
            }
            "random" | "randombalancingstrategy" => Ok(BalancingStrategyKind::Random),
            _ => Err(Error::InvalidConfiguration(format!(
                "Unknown balancing strategy: {value}"
            ))),
        }
    }
}
