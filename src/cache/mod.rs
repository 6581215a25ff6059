//! In-Process Series Cache (L1)
//!
//! Bounded store of per-series `step -> value` maps sitting in front of the
//! checkpoint store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SeriesCache                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  index: SeriesKey → slot      slots: [Slot; capacity]        │
//! │  ┌──────────────────────┐     ┌────┬────┬────┬────┬────┐     │
//! │  │ HashMap (O(1) probe) │ ──▶ │ s0 │ s1 │ s2 │ .. │ sN │     │
//! │  └──────────────────────┘     └────┴────┴────┴────┴────┘     │
//! │                                  ▲ cursor (oldest series)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Eviction
//!
//! Insertion order, not recency. A *new* series claims the slot under the
//! cursor, evicting whatever series occupied it, and the cursor advances.
//! Adding steps to an existing series never evicts. Reads do not refresh a
//! series' position.

mod l1;

pub use l1::{CacheSnapshot, CacheStats, SeriesCache};

/// Default number of series held in L1
pub const DEFAULT_CACHE_CAPACITY: usize = 75;
