use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::atom::Handle;

pub const DEFAULT_PARTITION_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_PARTITION_CACHE_TTL: Duration = Duration::from_secs(300);

/// Routing hint for one atom.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionInfo {
    pub node_id: String,
    pub replicas: Vec<String>,
    pub cached_at: Instant,
    /// Set when the hint was confirmed by a successful remote fetch.
    pub verified: bool,
}

impl PartitionInfo {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.cached_at) > ttl
    }

    fn involves(&self, node_id: &str) -> bool {
        self.node_id == node_id || self.replicas.iter().any(|r| r == node_id)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PartitionCacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_percent: f64,
    pub ttl_seconds: u64,
}

struct Inner {
    entries: HashMap<Handle, PartitionInfo>,
    hits: u64,
    misses: u64,
}

/// TTL cache of handle -> owner/replica hints, kept apart from the
/// authoritative partition map.
pub struct PartitionInfoCache {
    inner: Mutex<Inner>,
    max_size: usize,
    ttl: Duration,
}

impl PartitionInfoCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
            max_size: max_size.max(1),
            ttl,
        }
    }

    pub fn get(&self, handle: &Handle) -> Option<PartitionInfo> {
        self.get_at(handle, Instant::now())
    }

    pub(crate) fn get_at(&self, handle: &Handle, now: Instant) -> Option<PartitionInfo> {
        let mut inner = self.inner.lock();
        let lookup = inner
            .entries
            .get(handle)
            .map(|info| (info.is_expired(self.ttl, now), info.clone()));
        match lookup {
            Some((false, info)) => {
                inner.hits += 1;
                Some(info)
            }
            Some((true, _)) => {
                inner.entries.remove(handle);
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn put(&self, handle: Handle, node_id: String, replicas: Vec<String>, verified: bool) {
        self.put_at(handle, node_id, replicas, verified, Instant::now());
    }

    pub(crate) fn put_at(
        &self,
        handle: Handle,
        node_id: String,
        replicas: Vec<String>,
        verified: bool,
        now: Instant,
    ) {
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(&handle) && inner.entries.len() >= self.max_size {
            self.evict(&mut inner, now);
        }
        inner.entries.insert(
            handle,
            PartitionInfo {
                node_id,
                replicas,
                cached_at: now,
                verified,
            },
        );
    }

    /// Makes room for one insert: expired entries go first, then the oldest
    /// unverified entry, and only then the oldest verified one.
    fn evict(&self, inner: &mut Inner, now: Instant) {
        let ttl = self.ttl;
        inner.entries.retain(|_, info| !info.is_expired(ttl, now));
        if inner.entries.len() < self.max_size {
            return;
        }

        let oldest = |verified: bool| {
            inner
                .entries
                .iter()
                .filter(|(_, info)| info.verified == verified)
                .min_by_key(|(_, info)| info.cached_at)
                .map(|(handle, _)| *handle)
        };
        let victim = oldest(false).or_else(|| oldest(true));
        if let Some(victim) = victim {
            inner.entries.remove(&victim);
        }
    }

    pub fn invalidate(&self, handle: &Handle) -> bool {
        self.inner.lock().entries.remove(handle).is_some()
    }

    /// Drops every hint that routes through `node_id`. Returns how many were removed.
    pub fn invalidate_node(&self, node_id: &str) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, info| !info.involves(node_id));
        before - inner.entries.len()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> PartitionCacheStats {
        let inner = self.inner.lock();
        PartitionCacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate_percent: super::hit_rate_percent(inner.hits, inner.misses),
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}

impl Default for PartitionInfoCache {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITION_CACHE_CAPACITY, DEFAULT_PARTITION_CACHE_TTL)
    }
}
