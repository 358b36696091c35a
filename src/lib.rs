//! Distributed AtomSpace Cluster Library
//!
//! Spreads an AtomSpace hypergraph across a cluster of cooperating nodes.
//! It serves as the foundation for the node binary (`main.rs`).
//!
//! ## Architecture Modules
//!
//! - **`atom`**: the atom model (`Handle`, `Atom`, `TruthValue`), the in-process
//!   `AtomSpace` with its change subscriptions, and the `LocalStore` backend trait.
//! - **`cache`**: the LRU atom cache and the TTL-bound partition-info cache that save
//!   network round-trips.
//! - **`consistency`**: vector clocks, per-atom causal history and pluggable conflict
//!   resolution.
//! - **`membership`**: the membership table, node status and the adaptive heartbeat
//!   controller.
//! - **`cluster`**: the line-delimited JSON wire protocol, the TCP transport and the
//!   `DistributedCluster` orchestrator (join, heartbeat, sync, departure).
//! - **`storage`**: partitioning/replication strategies and the `DistributedStorageNode`
//!   façade that stores, fetches and removes atoms cluster-wide.

pub mod atom;
pub mod cache;
pub mod cluster;
pub mod config;
pub mod consistency;
pub mod error;
pub mod membership;
pub mod storage;
