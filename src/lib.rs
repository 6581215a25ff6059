//! seqcalc - logistic map compute service with a two-tier cache
//!
//! Answers "what is x(n) for parameter r" for the recurrence
//! `x(0) = 0.5, x(n+1) = r * x(n) * (1 - x(n))`, reusing earlier work
//! through a bounded in-process cache (L1) and a shared checkpoint store.
//!
//! # Architecture
//!
//! ```text
//! HTTP (/calculate) ──▶ ComputeEngine ──▶ L1 SeriesCache
//!                            │
//!                            ├──▶ PodPartitioner (advisory ownership)
//!                            │
//!                            └──▶ CheckpointStore (Redis | in-memory)
//! ```
//!
//! # Modules
//!
//! - [`series`] - Series identity and the recurrence
//! - [`cache`] - Bounded L1 cache of computed steps
//! - [`checkpoint`] - Durable checkpoint store and its encoding
//! - [`partition`] - Deterministic series-to-pod assignment
//! - [`engine`] - Compute engine tying the tiers together
//! - [`metrics`] - Prometheus metrics
//! - [`server`] - HTTP front end
//! - [`error`] - Error types

pub mod cache;
pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod partition;
pub mod series;
pub mod server;

pub use cache::{CacheStats, SeriesCache};
pub use checkpoint::{
    Checkpoint, CheckpointStore, InMemoryCheckpointStore, RedisCheckpointStore, RedisStoreConfig,
};
pub use engine::{ComputeEngine, EngineConfig, SeriesRequest, SeriesResult};
pub use error::{Error, Result};
pub use partition::{Ownership, PodPartitioner};
pub use series::SeriesKey;
