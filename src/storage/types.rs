use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::atom::Handle;
use crate::cache::{CacheStats, PartitionCacheStats};
use crate::membership::HeartbeatStats;

/// Snapshot returned by `DistributedStorageNode::stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub node_id: String,
    pub cluster_size: usize,
    pub local_atoms: usize,
    pub partition_entries: usize,
    pub replica_entries: usize,
    pub pending_sync_operations: usize,
    pub lru_cache: CacheStats,
    pub partition_cache: PartitionCacheStats,
    pub heartbeat: HeartbeatStats,
    pub operations: OperationStats,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct OperationStats {
    pub stores: u64,
    pub fetches: u64,
    pub removes: u64,
    pub local_writes: u64,
    pub forwarded_writes: u64,
    pub replicated_writes: u64,
    pub remote_fetches: u64,
}

#[derive(Debug, Default)]
pub(crate) struct OperationCounters {
    pub stores: AtomicU64,
    pub fetches: AtomicU64,
    pub removes: AtomicU64,
    pub local_writes: AtomicU64,
    pub forwarded_writes: AtomicU64,
    pub replicated_writes: AtomicU64,
    pub remote_fetches: AtomicU64,
}

impl OperationCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OperationStats {
        OperationStats {
            stores: self.stores.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            local_writes: self.local_writes.load(Ordering::Relaxed),
            forwarded_writes: self.forwarded_writes.load(Ordering::Relaxed),
            replicated_writes: self.replicated_writes.load(Ordering::Relaxed),
            remote_fetches: self.remote_fetches.load(Ordering::Relaxed),
        }
    }
}

/// A single ownership move planned by a rebalance pass.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Migration {
    pub handle: Handle,
    pub from: String,
    pub to: String,
}

/// Outcome of `rebalance_cluster`. Only routing is updated; atom data stays put.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RebalanceReport {
    pub average_load: f64,
    pub overloaded: Vec<String>,
    pub underloaded: Vec<String>,
    pub migrations: Vec<Migration>,
}

impl RebalanceReport {
    pub fn moved(&self) -> usize {
        self.migrations.len()
    }
}
