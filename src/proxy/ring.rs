//! Partition resolution
//!
//! Resource names map to a partition with BLAKE3, and each partition to an
//! ordered replica set chosen by HRW hashing when the ring is built. The
//! ring is immutable once built, so concurrent lookups need no locking.

use std::collections::HashMap;

use crate::common::{partition_for, NodeDescriptor, PartitionTable, Result, RingConfig};

/// A storage endpoint holding replicas of a partition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplicaNode {
    pub id: u64,
    /// host:port
    pub address: String,
    pub device: String,
}

impl From<&NodeDescriptor> for ReplicaNode {
    fn from(desc: &NodeDescriptor) -> Self {
        Self {
            id: desc.id,
            address: desc.address.clone(),
            device: desc.device.clone(),
        }
    }
}

/// Maps a resource name to its partition and replica nodes, in the order
/// reads should try them.
pub trait Partitioner: Send + Sync {
    fn resolve(&self, name: &str) -> Result<(u64, Vec<ReplicaNode>)>;
}

/// Partition table built from static ring configuration
pub struct HashRing {
    table: PartitionTable,
    nodes: HashMap<u64, ReplicaNode>,
    replicas: usize,
}

impl HashRing {
    pub fn new(config: &RingConfig) -> Result<Self> {
        let mut nodes = HashMap::new();
        for desc in &config.nodes {
            if nodes.insert(desc.id, ReplicaNode::from(desc)).is_some() {
                return Err(crate::Error::InvalidConfig(format!(
                    "duplicate node id {} in ring",
                    desc.id
                )));
            }
        }

        if nodes.is_empty() {
            tracing::warn!("ring has no nodes; every request will fail");
        } else if nodes.len() < config.replicas {
            return Err(crate::Error::InsufficientNodes {
                needed: config.replicas,
                available: nodes.len(),
            });
        }

        let mut ids: Vec<u64> = nodes.keys().copied().collect();
        ids.sort_unstable();
        let mut table = PartitionTable::new(config.partitions);
        table.rebalance(&ids, config.replicas);

        tracing::info!(
            "ring built: {} partitions, {} replicas, {} nodes",
            config.partitions,
            config.replicas,
            nodes.len()
        );

        Ok(Self {
            table,
            nodes,
            replicas: config.replicas,
        })
    }

    pub fn partition(&self, name: &str) -> u64 {
        partition_for(name, self.table.partitions())
    }

    pub fn replica_count(&self) -> usize {
        self.replicas
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Partitioner for HashRing {
    fn resolve(&self, name: &str) -> Result<(u64, Vec<ReplicaNode>)> {
        let partition = self.partition(name);
        let nodes = self
            .table
            .nodes(partition)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.nodes.get(id).cloned())
            .collect();
        Ok((partition, nodes))
    }
}
