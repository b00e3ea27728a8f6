use fxhash::FxHashSet;

use crate::cluster::{ServerAddress, Topology};
use crate::load_balancing::BalancingStrategy;

/// Load balancing strategy always returning the first server. Useful for active/passive setups,
/// where all requests must go to the active server - once it is removed from the topology, the
/// next server in line takes over.
///
/// Note: the "first" server is whatever the topology source lists first. Nothing guarantees it
/// corresponds to a particular configured server, unless the source documents so.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysFirstBalancingStrategy;

impl AlwaysFirstBalancingStrategy {
    pub fn new() -> Self {
        Default::default()
    }
}

impl BalancingStrategy for AlwaysFirstBalancingStrategy {
    fn on_topology_changed(&self, _topology: &Topology) {}

    fn next_server(
        &self,
        topology: &Topology,
        excluded: &FxHashSet<ServerAddress>,
    ) -> Option<ServerAddress> {
        topology
            .addresses()
            .iter()
            .find(|address| !excluded.contains(*address))
            .cloned()
    }
}
