use fxhash::FxHashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cluster::{ServerAddress, Topology};
use crate::load_balancing::BalancingStrategy;

/// Simple round-robin load balancing. The cursor survives topology changes as long as it still
/// points inside the new topology, so servers unaffected by a change keep their relative order.
#[derive(Debug, Default)]
pub struct RoundRobinBalancingStrategy {
    next_idx: AtomicUsize,
}

impl RoundRobinBalancingStrategy {
    pub fn new() -> Self {
        Default::default()
    }
}

impl BalancingStrategy for RoundRobinBalancingStrategy {
    fn on_topology_changed(&self, topology: &Topology) {
        let len = topology.len();
        let _ = self
            .next_idx
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |idx| {
                if idx >= len {
                    Some(0)
                } else {
                    None
                }
            });
    }

    fn next_server(
        &self,
        topology: &Topology,
        excluded: &FxHashSet<ServerAddress>,
    ) -> Option<ServerAddress> {
        let len = topology.len();

        // positions always refer to the full topology - excluded servers give up their turn
        // instead of shifting the rotation
        for _ in 0..len {
            let address = topology.get(self.advance(len))?;
            if !excluded.contains(address) {
                return Some(address.clone());
            }
        }

        None
    }
}

impl RoundRobinBalancingStrategy {
    fn advance(&self, len: usize) -> usize {
        // the cursor might be out of range for a topology it was not adjusted to yet
        self.next_idx
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |idx| {
                Some((idx % len + 1) % len)
            })
            .unwrap_or_default()
            % len
    }
}
