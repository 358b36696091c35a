use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::atom::Handle;
use crate::config::ClusterConfig;

/// How an atom handle is mapped to its owning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartitioningStrategy {
    RoundRobin,
    /// Minimal consistent-hash ring with node-id hashes as positions.
    #[default]
    HashBased,
    /// Routed like `HashBased`; see DESIGN.md.
    TypeBased,
    /// Least-loaded node according to the caller's load view.
    LoadBalanced,
}

/// How many extra copies an atom gets, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationStrategy {
    SingleCopy,
    #[default]
    PrimaryBackup,
    FullReplication,
    QuorumBased,
}

pub fn stable_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn sorted(nodes: &[String]) -> Vec<String> {
    let mut nodes = nodes.to_vec();
    nodes.sort();
    nodes.dedup();
    nodes
}

/// Picks the owner of `handle` among `nodes`. `None` only when `nodes` is empty.
///
/// Every strategy except `LoadBalanced` is a pure function of the handle and
/// the node set (order-insensitive).
pub fn responsible_node(
    handle: &Handle,
    nodes: &[String],
    strategy: PartitioningStrategy,
    loads: &HashMap<String, usize>,
) -> Option<String> {
    let nodes = sorted(nodes);
    if nodes.is_empty() {
        return None;
    }
    let key = stable_hash(handle);

    match strategy {
        PartitioningStrategy::RoundRobin => {
            let index = (key % nodes.len() as u64) as usize;
            nodes.get(index).cloned()
        }
        PartitioningStrategy::HashBased | PartitioningStrategy::TypeBased => nodes
            .iter()
            .find(|node| stable_hash(node.as_str()) >= key)
            .or_else(|| nodes.first())
            .cloned(),
        PartitioningStrategy::LoadBalanced => nodes
            .iter()
            .min_by_key(|node| (loads.get(node.as_str()).copied().unwrap_or(0), node.as_str()))
            .cloned(),
    }
}

/// Nodes holding extra copies of `handle`, never including `responsible`.
///
/// Sampled strategies draw from an RNG seeded with the handle hash, so every
/// node computes the same replica set for the same membership.
pub fn replica_nodes(
    handle: &Handle,
    responsible: &str,
    nodes: &[String],
    strategy: ReplicationStrategy,
    replication_factor: usize,
) -> Vec<String> {
    let others: Vec<String> = sorted(nodes)
        .into_iter()
        .filter(|node| node != responsible)
        .collect();

    let wanted = match strategy {
        ReplicationStrategy::SingleCopy => return Vec::new(),
        ReplicationStrategy::FullReplication => return others,
        ReplicationStrategy::PrimaryBackup => replication_factor.saturating_sub(1),
        // Owner plus replicas reach a majority of the full node set.
        ReplicationStrategy::QuorumBased => (others.len() + 1) / 2,
    };

    let mut rng = StdRng::seed_from_u64(stable_hash(handle));
    others
        .choose_multiple(&mut rng, wanted.min(others.len()))
        .cloned()
        .collect()
}

/// Owner plus replicas for one handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub owner: String,
    pub replicas: Vec<String>,
}

impl Placement {
    pub fn holds(&self, node_id: &str) -> bool {
        self.owner == node_id || self.replicas.iter().any(|r| r == node_id)
    }
}

/// Strategy bundle used by the storage node to place atoms.
#[derive(Debug, Clone)]
pub struct PartitionManager {
    partitioning: PartitioningStrategy,
    replication: ReplicationStrategy,
    replication_factor: usize,
}

impl PartitionManager {
    pub fn new(
        partitioning: PartitioningStrategy,
        replication: ReplicationStrategy,
        replication_factor: usize,
    ) -> Self {
        Self {
            partitioning,
            replication,
            replication_factor: replication_factor.max(1),
        }
    }

    pub fn from_config(config: &ClusterConfig) -> Self {
        Self::new(
            config.partitioning,
            config.replication,
            config.replication_factor,
        )
    }

    pub fn partitioning(&self) -> PartitioningStrategy {
        self.partitioning
    }

    pub fn replication(&self) -> ReplicationStrategy {
        self.replication
    }

    pub fn responsible_node(
        &self,
        handle: &Handle,
        nodes: &[String],
        loads: &HashMap<String, usize>,
    ) -> Option<String> {
        responsible_node(handle, nodes, self.partitioning, loads)
    }

    pub fn replica_nodes(&self, handle: &Handle, responsible: &str, nodes: &[String]) -> Vec<String> {
        replica_nodes(
            handle,
            responsible,
            nodes,
            self.replication,
            self.replication_factor,
        )
    }

    pub fn placement(
        &self,
        handle: &Handle,
        nodes: &[String],
        loads: &HashMap<String, usize>,
    ) -> Option<Placement> {
        let owner = self.responsible_node(handle, nodes, loads)?;
        let replicas = self.replica_nodes(handle, &owner, nodes);
        Some(Placement { owner, replicas })
    }
}
