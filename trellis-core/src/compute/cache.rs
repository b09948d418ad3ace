//! Value Cache
//!
//! Computed values are cached by [`PlugHash`]. Because the hash covers every
//! input, a hit is always valid; entries are never invalidated, only evicted
//! when the memory budget is exceeded.
//!
//! # Singleflight
//!
//! At most one computation runs per hash. The first requester installs an
//! in-flight slot and holds its lock while computing; later requesters block
//! on the same lock and then read the shared result. A failed computation
//! leaves the slot empty, so the next requester computes again.
//!
//! # Eviction
//!
//! Each entry records a logical "last used" tick. When the total cost
//! exceeds the budget, entries are removed oldest first until it fits.
//! Eviction only costs a recomputation later.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::hash::PlugHash;
use crate::error::Result;
use crate::value::Value;

struct CacheEntry {
    value: Arc<Value>,
    cost: usize,
    last_used: AtomicU64,
}

type InFlight = Arc<Mutex<Option<Arc<Value>>>>;

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub memory_usage: usize,
    pub memory_limit: usize,
}

/// Hash-keyed store of computed values, shareable across graphs.
pub struct ValueCache {
    entries: DashMap<PlugHash, CacheEntry>,
    in_flight: DashMap<PlugHash, InFlight>,
    memory_limit: AtomicUsize,
    memory_usage: AtomicUsize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    eviction_lock: Mutex<()>,
}

impl ValueCache {
    /// A cache holding at most `memory_limit` bytes of values.
    pub fn new(memory_limit: usize) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            memory_limit: AtomicUsize::new(memory_limit),
            memory_usage: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            eviction_lock: Mutex::new(()),
        }
    }

    /// The cached value for `hash`, if any. Counts as a use.
    pub fn get(&self, hash: &PlugHash) -> Option<Arc<Value>> {
        let entry = self.entries.get(hash)?;
        entry.last_used.store(self.tick(), Ordering::Relaxed);
        Some(entry.value.clone())
    }

    pub fn contains(&self, hash: &PlugHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Return the value for `hash`, calling `compute` on a miss.
    ///
    /// Concurrent calls for the same hash run `compute` once; the others
    /// wait and share its result. Errors are returned to the computing
    /// caller only and are not cached.
    pub fn get_or_compute<F>(&self, hash: PlugHash, compute: F) -> Result<Arc<Value>>
    where
        F: FnOnce() -> Result<Value>,
    {
        if let Some(value) = self.get(&hash) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(%hash, "cache hit");
            return Ok(value);
        }

        let slot = self
            .in_flight
            .entry(hash)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        let mut guard = slot.lock();

        // Another thread may have finished while we waited for the lock.
        let ready = guard.clone().or_else(|| self.get(&hash));
        if let Some(value) = ready {
            self.hits.fetch_add(1, Ordering::Relaxed);
            drop(guard);
            self.release(&hash, &slot);
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%hash, "cache miss");

        let outcome = compute().map(Arc::new);
        if let Ok(value) = &outcome {
            *guard = Some(value.clone());
            self.insert(hash, value.clone());
        }

        drop(guard);
        self.release(&hash, &slot);
        outcome
    }

    /// Drop the in-flight slot once no other requester holds it.
    fn release(&self, hash: &PlugHash, slot: &InFlight) {
        self.in_flight
            .remove_if(hash, |_, s| Arc::ptr_eq(s, slot) && Arc::strong_count(s) <= 2);
    }

    /// Store `value` under `hash`, evicting older entries if over budget.
    pub fn insert(&self, hash: PlugHash, value: Arc<Value>) {
        let cost = value.memory_usage();
        let entry = CacheEntry {
            value,
            cost,
            last_used: AtomicU64::new(self.tick()),
        };
        // Count the cost before the entry becomes visible to `clear`.
        self.memory_usage.fetch_add(cost, Ordering::Relaxed);
        if let Some(old) = self.entries.insert(hash, entry) {
            self.memory_usage.fetch_sub(old.cost, Ordering::Relaxed);
        }
        self.evict();
    }

    /// Remove every entry. Values inserted concurrently may survive, with
    /// their cost still counted.
    pub fn clear(&self) {
        let _guard = self.eviction_lock.lock();
        let keys: Vec<PlugHash> = self.entries.iter().map(|e| *e.key()).collect();
        for hash in keys {
            if let Some((_, entry)) = self.entries.remove(&hash) {
                self.memory_usage.fetch_sub(entry.cost, Ordering::Relaxed);
            }
        }
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit.load(Ordering::Relaxed)
    }

    /// Change the budget, evicting immediately if the cache is now over it.
    pub fn set_memory_limit(&self, bytes: usize) {
        self.memory_limit.store(bytes, Ordering::Relaxed);
        self.evict();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
            memory_usage: self.memory_usage.load(Ordering::Relaxed),
            memory_limit: self.memory_limit(),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Drop least recently used entries until usage fits the budget.
    fn evict(&self) {
        let limit = self.memory_limit();
        if self.memory_usage.load(Ordering::Relaxed) <= limit {
            return;
        }

        let _guard = self.eviction_lock.lock();
        let mut by_age: Vec<(u64, PlugHash)> = self
            .entries
            .iter()
            .map(|e| (e.last_used.load(Ordering::Relaxed), *e.key()))
            .collect();
        by_age.sort_unstable();

        let mut evicted = 0u64;
        for (_, hash) in by_age {
            if self.memory_usage.load(Ordering::Relaxed) <= limit {
                break;
            }
            if let Some((_, entry)) = self.entries.remove(&hash) {
                self.memory_usage.fetch_sub(entry.cost, Ordering::Relaxed);
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            tracing::warn!(
                evicted,
                usage = self.memory_usage.load(Ordering::Relaxed),
                limit,
                "value cache over budget"
            );
        }
    }
}

impl Default for ValueCache {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CACHE_MEMORY_LIMIT)
    }
}

impl std::fmt::Debug for ValueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCache").field("stats", &self.stats()).finish()
    }
}
