//! In-memory checkpoint backend
//!
//! Process-local stand-in for the Redis store with the same observable
//! contract: per-series ordered collections, sliding TTL, values kept in
//! their textual encoding. Used by tests and by `--store memory` runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::codec::{decode_value, encode_value};
use super::{Checkpoint, CheckpointStore, DEFAULT_CHECKPOINT_TTL};
use crate::error::{Error, Result};
use crate::series::SeriesKey;

/// Writes between sweeps of expired collections
const SWEEP_EVERY: u64 = 1024;

/// One series' checkpoints
struct Collection {
    /// step -> encoded value
    entries: BTreeMap<u64, String>,
    expires_at: Instant,
}

impl Collection {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory checkpoint store.
/// Uses DashMap so concurrent series do not contend on one lock.
pub struct InMemoryCheckpointStore {
    collections: DashMap<SeriesKey, Collection>,
    ttl: Duration,
    closed: AtomicBool,
    /// When set every operation fails as if the network were down
    unavailable: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_CHECKPOINT_TTL)
    }
}

impl InMemoryCheckpointStore {
    /// Create a store with the default one-hour TTL
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            collections: DashMap::new(),
            ttl,
            closed: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Simulate a store outage (or end one)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Write an arbitrary encoded value, bypassing the codec
    pub fn insert_raw(&self, key: SeriesKey, step: u64, raw: impl Into<String>) {
        self.write_encoded(key, step, raw.into());
    }

    /// Whether the store was closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get storage statistics
    pub fn stats(&self) -> MemoryStoreStats {
        let now = Instant::now();
        self.purge_expired(now);
        let (series, checkpoints) = self
            .collections
            .iter()
            .filter(|c| !c.is_expired(now))
            .fold((0, 0), |(s, n), c| (s + 1, n + c.entries.len()));
        MemoryStoreStats {
            series,
            checkpoints,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    fn gate(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::StoreClosed);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("in-memory store marked unavailable".into()));
        }
        Ok(())
    }

    /// Drop every expired collection, including ones never read again.
    fn purge_expired(&self, now: Instant) {
        self.collections.retain(|_, c| !c.is_expired(now));
    }

    fn write_encoded(&self, key: SeriesKey, step: u64, encoded: String) {
        let written = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Instant::now();
        // Must run before `entry` takes a shard lock.
        if written % SWEEP_EVERY == 0 {
            self.purge_expired(now);
        }
        let mut collection = self.collections.entry(key).or_insert_with(|| Collection {
            entries: BTreeMap::new(),
            expires_at: now + self.ttl,
        });
        if collection.is_expired(now) {
            collection.entries.clear();
        }
        collection.entries.insert(step, encoded);
        collection.expires_at = now + self.ttl;
    }

    /// Run `pick` against a live collection, dropping it first if expired.
    fn read_with<F>(&self, key: SeriesKey, pick: F) -> Result<Option<Checkpoint>>
    where
        F: FnOnce(&BTreeMap<u64, String>) -> Option<(u64, String)>,
    {
        self.gate()?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        self.collections.remove_if(&key, |_, c| c.is_expired(now));

        let found = self
            .collections
            .get(&key)
            .and_then(|collection| pick(&collection.entries));

        match found {
            Some((step, raw)) => Ok(Some(Checkpoint::new(step, decode_value(key, &raw)?))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, key: SeriesKey, checkpoint: Checkpoint) -> Result<()> {
        self.gate()?;
        self.write_encoded(key, checkpoint.step, encode_value(checkpoint.value));
        Ok(())
    }

    async fn find_at_or_below(&self, key: SeriesKey, n: u64) -> Result<Option<Checkpoint>> {
        self.read_with(key, |entries| {
            entries
                .range(..=n)
                .next_back()
                .map(|(&step, raw)| (step, raw.clone()))
        })
    }

    async fn find_latest(&self, key: SeriesKey) -> Result<Option<Checkpoint>> {
        self.read_with(key, |entries| {
            entries
                .iter()
                .next_back()
                .map(|(&step, raw)| (step, raw.clone()))
        })
    }

    async fn list_keys(&self, limit: usize) -> Result<Vec<SeriesKey>> {
        self.gate()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        self.purge_expired(now);
        Ok(self
            .collections
            .iter()
            .filter(|c| !c.entries.is_empty())
            .map(|c| *c.key())
            .take(limit)
            .collect())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// In-memory store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// Series with live checkpoints
    pub series: usize,
    /// Live checkpoints across all series
    pub checkpoints: usize,
    /// Read operations
    pub reads: u64,
    /// Write operations (one per checkpoint written)
    pub writes: u64,
}

// =============================================================================
// Tests
// =============================================================================
