use fxhash::FxHashSet;
use rand::prelude::*;
use rand::rng;

use crate::cluster::{ServerAddress, Topology};
use crate::load_balancing::BalancingStrategy;

/// Pure random load balancing.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomBalancingStrategy;

impl RandomBalancingStrategy {
    pub fn new() -> Self {
        Default::default()
    }
}

impl BalancingStrategy for RandomBalancingStrategy {
    fn on_topology_changed(&self, _topology: &Topology) {}

    fn next_server(
        &self,
        topology: &Topology,
        excluded: &FxHashSet<ServerAddress>,
    ) -> Option<ServerAddress> {
        if excluded.is_empty() {
            return topology.addresses().choose(&mut rng()).cloned();
        }

        topology
            .addresses()
            .iter()
            .filter(|address| !excluded.contains(*address))
            .choose(&mut rng())
            .cloned()
    }
}
