//! L1 Cache - bounded ring of series
//!
//! # Design
//!
//! - Fixed slot arena plus a key→slot index for O(1) lookup, insert and evict
//! - One `parking_lot::RwLock` around both so the index and the ring never
//!   disagree; readers share the lock, writers hold it for one insert plus
//!   any eviction bookkeeping
//! - Hit/miss/eviction counters are atomics outside the lock

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::trace;

use super::DEFAULT_CACHE_CAPACITY;
use crate::series::SeriesKey;

/// Deep copy of the cache contents, steps ordered ascending per series.
pub type CacheSnapshot = HashMap<SeriesKey, BTreeMap<u64, f64>>;

/// One occupied ring slot
#[derive(Debug)]
struct Slot {
    key: SeriesKey,
    steps: HashMap<u64, f64>,
}

#[derive(Debug)]
struct Ring {
    slots: Vec<Option<Slot>>,
    index: HashMap<SeriesKey, usize>,
    /// Next slot to claim; once the ring is full this is the oldest series.
    cursor: usize,
}

impl Ring {
    fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            index: HashMap::with_capacity(capacity),
            cursor: 0,
        }
    }
}

/// Bounded, insertion-order-evicting series cache
pub struct SeriesCache {
    ring: RwLock<Ring>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl SeriesCache {
    /// Create a cache holding at most `capacity` series.
    ///
    /// A capacity of zero is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: RwLock::new(Ring::with_capacity(capacity)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up the value of `key` at step `n`
    pub fn get(&self, key: SeriesKey, n: u64) -> Option<f64> {
        let value = {
            let ring = self.ring.read();
            ring.index
                .get(&key)
                .and_then(|&slot| ring.slots[slot].as_ref())
                .and_then(|slot| slot.steps.get(&n).copied())
        };

        match value {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        value
    }

    /// Insert or overwrite the value of `key` at step `n`.
    ///
    /// A key not yet cached takes the slot under the cursor; if that slot is
    /// occupied its whole series is dropped first.
    pub fn set(&self, key: SeriesKey, n: u64, value: f64) {
        let mut ring = self.ring.write();

        if let Some(&slot) = ring.index.get(&key) {
            if let Some(occupant) = ring.slots[slot].as_mut() {
                occupant.steps.insert(n, value);
                return;
            }
        }

        let slot = ring.cursor;
        if let Some(evicted) = ring.slots[slot].take() {
            ring.index.remove(&evicted.key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(
                series = %evicted.key,
                steps = evicted.steps.len(),
                "Evicted oldest series from L1"
            );
        }

        let mut steps = HashMap::new();
        steps.insert(n, value);
        ring.slots[slot] = Some(Slot { key, steps });
        ring.index.insert(key, slot);
        ring.cursor = (slot + 1) % self.capacity;
    }

    /// Deep copy of every cached series.
    ///
    /// Taken under the lock, so a concurrent `set` is either fully visible
    /// or not at all.
    pub fn snapshot(&self) -> CacheSnapshot {
        let ring = self.ring.read();
        ring.slots
            .iter()
            .flatten()
            .map(|slot| {
                let steps = slot.steps.iter().map(|(&n, &x)| (n, x)).collect();
                (slot.key, steps)
            })
            .collect()
    }

    /// Check whether any step of `key` is cached
    pub fn contains_series(&self, key: SeriesKey) -> bool {
        self.ring.read().index.contains_key(&key)
    }

    /// Number of cached steps for `key`
    pub fn series_len(&self, key: SeriesKey) -> usize {
        let ring = self.ring.read();
        ring.index
            .get(&key)
            .and_then(|&slot| ring.slots[slot].as_ref())
            .map_or(0, |slot| slot.steps.len())
    }

    /// Cached keys, oldest insertion first
    pub fn keys(&self) -> Vec<SeriesKey> {
        let ring = self.ring.read();
        let cap = self.capacity;
        (0..cap)
            .filter_map(|offset| ring.slots[(ring.cursor + offset) % cap].as_ref())
            .map(|slot| slot.key)
            .collect()
    }

    /// Number of cached series
    pub fn len(&self) -> usize {
        self.ring.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of series
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let (series, steps) = {
            let ring = self.ring.read();
            let steps = ring.slots.iter().flatten().map(|s| s.steps.len()).sum();
            (ring.index.len(), steps)
        };
        CacheStats {
            series,
            steps,
            capacity: self.capacity,
            hits: self.hits(),
            misses: self.misses(),
            evictions: self.evictions(),
        }
    }
}

impl Default for SeriesCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for SeriesCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesCache")
            .field("capacity", &self.capacity)
            .field("series", &self.len())
            .finish()
    }
}

/// L1 cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached series
    pub series: usize,
    /// Total cached steps across all series
    pub steps: usize,
    /// Maximum number of series
    pub capacity: usize,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Series evicted so far
    pub evictions: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u64) -> SeriesKey {
        SeriesKey::from_param(1.0 + i as f64 / 100.0)
    }

    #[test]
    fn test_cache_creation() {
        let cache = SeriesCache::default();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), DEFAULT_CACHE_CAPACITY);
        assert_eq!(cache.stats().steps, 0);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = SeriesCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.set(key(1), 1, 0.1);
        cache.set(key(2), 1, 0.2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_series(key(2)));
    }

    #[test]
    fn test_set_get() {
        let cache = SeriesCache::new(4);
        cache.set(key(1), 10, 0.25);

        assert_eq!(cache.get(key(1), 10), Some(0.25));
        assert_eq!(cache.get(key(1), 11), None);
        assert_eq!(cache.get(key(2), 10), None);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 2);
    }

    #[test]
    fn test_overwrite_step() {
        let cache = SeriesCache::new(2);
        cache.set(key(1), 3, 0.1);
        cache.set(key(1), 3, 0.9);
        assert_eq!(cache.get(key(1), 3), Some(0.9));
        assert_eq!(cache.series_len(key(1)), 1);
    }

    #[test]
    fn test_capacity_bound_evicts_first_inserted() {
        let cache = SeriesCache::new(5);
        for i in 0..8 {
            cache.set(key(i), 1, i as f64);
        }

        assert_eq!(cache.len(), 5);
        for i in 0..3 {
            assert!(!cache.contains_series(key(i)), "series {} should be gone", i);
        }
        for i in 3..8 {
            assert!(cache.contains_series(key(i)), "series {} should remain", i);
        }
        assert_eq!(cache.evictions(), 3);
        assert_eq!(cache.keys(), (3..8).map(key).collect::<Vec<_>>());
    }

    #[test]
    fn test_eviction_drops_whole_series() {
        let cache = SeriesCache::new(1);
        for n in 1..=100 {
            cache.set(key(1), n, n as f64);
        }
        assert_eq!(cache.series_len(key(1)), 100);

        cache.set(key(2), 1, 0.5);
        assert_eq!(cache.series_len(key(1)), 0);
        assert_eq!(cache.stats().steps, 1);
    }

    #[test]
    fn test_updates_to_existing_series_never_evict() {
        let cache = SeriesCache::new(3);
        for i in 0..3 {
            cache.set(key(i), 1, 0.0);
        }
        for n in 2..500 {
            cache.set(key(0), n, 0.0);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.evictions(), 0);
    }

    #[test]
    fn test_reads_do_not_refresh_position() {
        // Insertion order, not LRU: the oldest series goes even if it is hot.
        let cache = SeriesCache::new(2);
        cache.set(key(0), 1, 0.0);
        cache.set(key(1), 1, 0.0);
        for _ in 0..10 {
            assert!(cache.get(key(0), 1).is_some());
        }
        cache.set(key(0), 2, 0.0);

        cache.set(key(2), 1, 0.0);
        assert!(!cache.contains_series(key(0)));
        assert!(cache.contains_series(key(1)));
        assert!(cache.contains_series(key(2)));
    }

    #[test]
    fn test_evicted_key_can_return() {
        let cache = SeriesCache::new(2);
        cache.set(key(0), 1, 0.0);
        cache.set(key(1), 1, 0.0);
        cache.set(key(2), 1, 0.0);
        cache.set(key(0), 1, 0.7);

        assert_eq!(cache.keys(), vec![key(2), key(0)]);
        assert_eq!(cache.get(key(0), 1), Some(0.7));
    }

    #[test]
    fn test_snapshot_is_deep_copy() {
        let cache = SeriesCache::new(4);
        cache.set(key(1), 2, 0.2);
        cache.set(key(1), 1, 0.1);
        cache.set(key(2), 1000, 0.3);

        let snapshot = cache.snapshot();
        cache.set(key(1), 3, 0.4);
        cache.set(key(3), 1, 0.5);

        assert_eq!(snapshot.len(), 2);
        let steps: Vec<_> = snapshot[&key(1)].iter().map(|(&n, &x)| (n, x)).collect();
        assert_eq!(steps, vec![(1, 0.1), (2, 0.2)]);
        assert_eq!(snapshot[&key(2)].get(&1000), Some(&0.3));
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(SeriesCache::new(16));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..1000u64 {
                        let k = key(t * 1000 + i % 4);
                        cache.set(k, i, i as f64);
                        cache.get(k, i);
                        if i % 100 == 0 {
                            let _ = cache.snapshot();
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 16);
        assert_eq!(cache.keys().len(), cache.len());
        assert_eq!(cache.hits() + cache.misses(), 8000);
    }
}
