use arc_swap::ArcSwap;
use itertools::Itertools;
use std::sync::Arc;
use tracing::*;

use crate::cluster::ServerAddress;

/// Immutable, ordered view of the servers known to the client. A new instance with a higher
/// generation is published on every change; published instances are never modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    addresses: Vec<ServerAddress>,
    generation: u64,
}

impl Topology {
    /// Creates a topology with given generation. Duplicate addresses are collapsed to their first
    /// occurrence.
    pub fn new(addresses: Vec<ServerAddress>, generation: u64) -> Self {
        let unique_count = addresses.iter().unique().count();
        let addresses = if unique_count != addresses.len() {
            warn!(
                duplicates = addresses.len() - unique_count,
                "Ignoring duplicate server addresses."
            );

            addresses.into_iter().unique().collect()
        } else {
            addresses
        };

        Topology {
            addresses,
            generation,
        }
    }

    #[inline]
    pub fn addresses(&self) -> &[ServerAddress] {
        &self.addresses
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&ServerAddress> {
        self.addresses.get(index)
    }

    #[inline]
    pub fn contains(&self, address: &ServerAddress) -> bool {
        self.addresses.contains(address)
    }
}

/// Holds the currently published topology. Readers get a consistent snapshot without locking;
/// publishers replace the whole topology.
#[derive(Debug, Default)]
pub struct TopologyHolder {
    current: ArcSwap<Topology>,
}

impl TopologyHolder {
    pub fn new(addresses: Vec<ServerAddress>) -> Self {
        TopologyHolder {
            current: ArcSwap::from_pointee(Topology::new(addresses, 0)),
        }
    }

    /// Returns the latest published topology.
    #[inline]
    pub fn current(&self) -> Arc<Topology> {
        self.current.load_full()
    }

    /// Replaces the current topology and returns the published snapshot. Concurrent publishers
    /// are serialized - each one gets a distinct, increasing generation.
    pub fn publish(&self, addresses: Vec<ServerAddress>) -> Arc<Topology> {
        let mut published = None;
        self.current.rcu(|current| {
            let topology = Arc::new(Topology::new(addresses.clone(), current.generation + 1));
            published = Some(topology.clone());
            topology
        });

        // rcu always runs the update at least once
        let published = published.unwrap_or_else(|| self.current());

        debug!(
            generation = published.generation(),
            servers = %published.addresses().iter().join(", "),
            "Published new topology."
        );

        published
    }
}
