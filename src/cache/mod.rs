//! Read-Path Caches
//!
//! Two bounded caches sit in front of the network to cut remote round-trips:
//!
//! - **`AtomCache`**: handle -> atom, least-recently-used eviction with hit/miss accounting.
//! - **`PartitionInfoCache`**: handle -> (owner, replicas) routing hints with a TTL. Hints confirmed
//!   by a successful remote fetch are marked `verified` and survive eviction longer.
//!
//! Both guard their state with a single mutex; every operation is short.

pub mod lru;
pub mod partition_info;

pub use self::lru::{AtomCache, CacheStats};
pub use self::partition_info::{PartitionCacheStats, PartitionInfo, PartitionInfoCache};

pub(crate) fn hit_rate_percent(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 * 100.0 / total as f64
    }
}
