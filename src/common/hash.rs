//! Hashing utilities for ringproxy
//!
//! - BLAKE3 for partitioning resource names
//! - HRW (Highest Random Weight) for replica placement per partition

use std::collections::HashMap;

fn hash_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(buf)
}

/// Compute the partition for a resource name
pub fn partition_for(name: &str, partitions: u64) -> u64 {
    hash_u64(name.as_bytes()) % partitions
}

/// HRW (Highest Random Weight) hashing for replica placement
///
/// Given a key and a set of node ids, returns the ids sorted by their
/// weight (deterministic based on key). Adding or removing a node only
/// moves the keys whose top choices involved that node.
pub fn hrw_order(key: &str, nodes: &[u64]) -> Vec<u64> {
    let mut weights: Vec<(u64, u64)> = nodes
        .iter()
        .map(|node| {
            let combined = format!("{}{}", key, node);
            (*node, hash_u64(combined.as_bytes()))
        })
        .collect();

    // Sort by weight (descending)
    weights.sort_by(|a, b| b.1.cmp(&a.1));

    weights.into_iter().map(|(node, _)| node).collect()
}

/// Select N replicas using HRW hashing
pub fn select_replicas(key: &str, nodes: &[u64], n: usize) -> Vec<u64> {
    hrw_order(key, nodes).into_iter().take(n).collect()
}

/// Partition -> ordered node ids
///
/// The order within a partition is the replica order callers scan on reads.
#[derive(Debug, Clone)]
pub struct PartitionTable {
    partitions: u64,
    assignments: HashMap<u64, Vec<u64>>,
}

impl PartitionTable {
    pub fn new(partitions: u64) -> Self {
        Self {
            partitions,
            assignments: HashMap::new(),
        }
    }

    pub fn partitions(&self) -> u64 {
        self.partitions
    }

    /// Nodes for a specific partition
    pub fn nodes(&self, partition: u64) -> Option<&[u64]> {
        self.assignments.get(&partition).map(|v| v.as_slice())
    }

    /// Redistribute every partition across the available nodes
    pub fn rebalance(&mut self, available_nodes: &[u64], replicas: usize) {
        for partition in 0..self.partitions {
            let key = format!("partition-{}", partition);
            let nodes = select_replicas(&key, available_nodes, replicas);
            self.assignments.insert(partition, nodes);
        }
    }
}
