//! Distributed Storage Module
//!
//! Partitioned, replicated atom storage layered over a `LocalStore` and a
//! `DistributedCluster`.
//!
//! ## Core Concepts
//! - **Partitioning**: `PartitionManager` maps each handle to an owner node using the
//!   configured strategy (round-robin, consistent hash, type, least-loaded).
//! - **Replication**: the owner persists the atom and pushes copies to its replica set
//!   (none, primary/backup, everyone, or a majority).
//! - **Access**: `DistributedStorageNode` routes writes to owners, reads through the
//!   LRU and partition-info caches before asking peers, and keeps a routing table that
//!   is repaired when nodes leave and flattened by `rebalance_cluster`.

pub mod handlers;
pub mod node;
pub mod partitioner;
pub mod protocol;
pub mod types;

pub use node::DistributedStorageNode;
pub use partitioner::{PartitionManager, PartitioningStrategy, Placement, ReplicationStrategy};
pub use types::{Migration, OperationStats, RebalanceReport, StorageStats};

#[cfg(test)]
mod tests;
