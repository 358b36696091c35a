use ::lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::time::Instant;

use crate::atom::{Atom, Handle};

pub const DEFAULT_LRU_CAPACITY: usize = 10_000;

struct CacheEntry {
    atom: Atom,
    last_access: Instant,
    access_count: u64,
}

struct Inner {
    entries: LruCache<Handle, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Bounded handle -> atom cache.
pub struct AtomCache {
    inner: Mutex<Inner>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_percent: f64,
}

impl AtomCache {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn get(&self, handle: &Handle) -> Option<Atom> {
        let mut inner = self.inner.lock();
        let found = inner.entries.get_mut(handle).map(|entry| {
            entry.last_access = Instant::now();
            entry.access_count += 1;
            entry.atom.clone()
        });
        match found {
            Some(atom) => {
                inner.hits += 1;
                Some(atom)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Inserts or refreshes an atom, evicting the least recently used entry when full.
    pub fn put(&self, atom: Atom) {
        let mut inner = self.inner.lock();
        let handle = atom.handle;
        let access_count = inner
            .entries
            .peek(&handle)
            .map(|entry| entry.access_count)
            .unwrap_or(0);
        let evicted = inner.entries.push(
            handle,
            CacheEntry {
                atom,
                last_access: Instant::now(),
                access_count,
            },
        );
        if let Some((evicted_handle, _)) = evicted
            && evicted_handle != handle
        {
            tracing::trace!("LRU evicted {}", evicted_handle);
        }
    }

    pub fn invalidate(&self, handle: &Handle) -> bool {
        self.inner.lock().entries.pop(handle).is_some()
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

    /// Number of cache hits served for this handle, if it is cached.
    pub fn access_count(&self, handle: &Handle) -> Option<u64> {
        self.inner
            .lock()
            .entries
            .peek(handle)
            .map(|entry| entry.access_count)
    }

    pub fn last_access(&self, handle: &Handle) -> Option<Instant> {
        self.inner
            .lock()
            .entries
            .peek(handle)
            .map(|entry| entry.last_access)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.entries.len(),
            max_size: inner.entries.cap().get(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate_percent: super::hit_rate_percent(inner.hits, inner.misses),
        }
    }
}

impl Default for AtomCache {
    fn default() -> Self {
        Self::new(DEFAULT_LRU_CAPACITY)
    }
}
