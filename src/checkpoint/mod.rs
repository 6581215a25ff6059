//! Checkpoint Store
//!
//! Durable, shared, TTL-bounded tier behind the L1 cache. Each series owns
//! one collection of `(step, value)` pairs ordered by step; the engine asks
//! it for the nearest checkpoint at or below a requested step and resumes
//! the recurrence from there.
//!
//! # Layout
//!
//! ```text
//! cp:<decimal series key>   sorted set, score = step
//!   ├── "1000:8.2688...e-1"
//!   ├── "2000:3.1234...e-1"
//!   └── ...                 whole collection expires TTL after last write
//! ```
//!
//! # Backends
//!
//! - [`RedisCheckpointStore`] - production backend (sorted sets + EXPIRE)
//! - [`InMemoryCheckpointStore`] - process-local backend for tests and
//!   single-node runs

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::series::{SeriesKey, INITIAL_VALUE};

pub mod codec;
mod memory;
mod redis_store;

pub use memory::{InMemoryCheckpointStore, MemoryStoreStats};
pub use redis_store::{RedisCheckpointStore, RedisStoreConfig};

/// Steps persisted as checkpoints are multiples of this
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 1000;

/// Sliding expiry of a series' checkpoint collection
pub const DEFAULT_CHECKPOINT_TTL: Duration = Duration::from_secs(60 * 60);

/// A persisted `(step, value)` pair of one series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    pub step: u64,
    pub value: f64,
}

impl Checkpoint {
    pub fn new(step: u64, value: f64) -> Self {
        Self { step, value }
    }

    /// The recurrence's initial condition, used when no checkpoint exists.
    pub fn origin() -> Self {
        Self::new(0, INITIAL_VALUE)
    }
}

/// Whether step `n` is persisted under the given interval.
pub fn is_checkpoint_step(n: u64, interval: u64) -> bool {
    interval != 0 && n % interval == 0
}

/// Storage backend for checkpoints.
///
/// Every method may fail with a transient error; callers on the compute path
/// treat any failure as "no checkpoint".
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Backend label for logs
    fn name(&self) -> &'static str;

    /// Insert or overwrite one checkpoint and restart the series' TTL
    async fn upsert(&self, key: SeriesKey, checkpoint: Checkpoint) -> Result<()>;

    /// Bulk form of [`upsert`](Self::upsert); backends that can batch should.
    async fn upsert_batch(&self, batch: &[(SeriesKey, Checkpoint)]) -> Result<()> {
        for &(key, checkpoint) in batch {
            self.upsert(key, checkpoint).await?;
        }
        Ok(())
    }

    /// Checkpoint with the greatest step `<= n`
    async fn find_at_or_below(&self, key: SeriesKey, n: u64) -> Result<Option<Checkpoint>>;

    /// Checkpoint with the greatest step
    async fn find_latest(&self, key: SeriesKey) -> Result<Option<Checkpoint>>;

    /// Up to `limit` series with live checkpoints
    async fn list_keys(&self, limit: usize) -> Result<Vec<SeriesKey>>;

    /// Release connections; later calls fail with `StoreClosed`
    async fn close(&self);
}
