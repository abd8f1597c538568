//! Bounded LRU cache for generated responses.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use serde::Serialize;

/// Default number of cached responses.
pub const DEFAULT_CAPACITY: usize = 100;

/// Cache counters for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Entries currently held.
    pub len: usize,
    /// Maximum number of entries.
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

#[derive(Debug)]
struct Inner {
    entries: LruCache<(String, String), String>,
    stats: CacheStats,
}

/// Thread-safe LRU cache keyed by the exact `(instruction, input)` pair.
///
/// Lookup, insertion and eviction all happen under one lock, so concurrent
/// readers never observe a half-applied eviction.
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<Inner>,
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` responses (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats { capacity: capacity.get(), ..CacheStats::default() },
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the LRU half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a response, marking it most recently used.
    pub fn get(&self, instruction: &str, input: &str) -> Option<String> {
        let mut inner = self.lock();
        let key = (instruction.to_string(), input.to_string());
        match inner.entries.get(&key).cloned() {
            Some(response) => {
                inner.stats.hits += 1;
                Some(response)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a response, evicting the least recently used entry when full.
    pub fn put(&self, instruction: &str, input: &str, response: String) {
        let mut inner = self.lock();
        let key = (instruction.to_string(), input.to_string());
        if let Some((evicted, _)) = inner.entries.push(key.clone(), response) {
            if evicted != key {
                inner.stats.evictions += 1;
            }
        }
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of cached responses.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats { len: inner.entries.len(), ..inner.stats }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
