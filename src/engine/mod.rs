//! Compute Engine
//!
//! Answers "what is x(n) for parameter r" using the L1 cache, the checkpoint
//! store and, as a last resort, sequential recomputation.
//!
//! # Request path
//!
//! ```text
//! (r, n) ──▶ SeriesKey ──▶ L1 hit? ──yes──▶ value
//!                            │ no
//!                            ▼
//!                  ownership check (advisory, logs only)
//!                            │
//!                            ▼
//!            store.find_at_or_below(n) ──▶ resume point (or step 0)
//!                            │
//!                            ▼
//!          iterate to n: every step → L1, every interval-th → store
//! ```
//!
//! # Concurrency
//!
//! One engine is shared by all request handlers. There is no coalescing of
//! identical in-flight work: two callers that miss L1 for the same series at
//! the same time both query the store, both recompute and both persist the
//! overlapping checkpoints.

mod compute;
mod config;
#[cfg(test)]
mod proptest;

pub use compute::ComputeEngine;
pub use config::EngineConfig;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::series::SeriesKey;

/// One `(r, n)` request as received at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesRequest {
    pub r: f64,
    pub n: u64,
}

/// Answer to one [`SeriesRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesResult {
    pub r: f64,
    pub n: u64,
    pub result: f64,
}

/// Requests for one series, steps ascending
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesGroup {
    pub r: f64,
    pub steps: Vec<u64>,
}

/// Group requests by series in first-appearance order and sort each group's
/// steps ascending. Duplicate steps are kept.
pub fn group_by_series(requests: &[SeriesRequest]) -> Vec<SeriesGroup> {
    let mut order: Vec<SeriesKey> = Vec::new();
    let mut groups: HashMap<SeriesKey, SeriesGroup> = HashMap::new();

    for request in requests {
        let key = SeriesKey::from_param(request.r);
        groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                SeriesGroup {
                    r: request.r,
                    steps: Vec::new(),
                }
            })
            .steps
            .push(request.n);
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(|mut group| {
            group.steps.sort_unstable();
            group
        })
        .collect()
}
