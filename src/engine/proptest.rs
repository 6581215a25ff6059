//! Property-Based Tests for the compute path
//!
//! # Test Properties
//!
//! 1. **Resume Equivalence**: resuming from any stored checkpoint gives the
//!    same bits as computing from step 0
//! 2. **Cache Transparency**: a second request is answered identically
//! 3. **Storage Fidelity**: checkpoint values survive the text encoding
//! 4. **Partition Totality**: every key maps to a pod in range

#![cfg(test)]

use std::sync::Arc;

use proptest::prelude::*;

use super::{ComputeEngine, EngineConfig, SeriesRequest};
use crate::checkpoint::codec::{decode_value, encode_value};
use crate::checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};
use crate::partition::pod_for;
use crate::series::{value_at, SeriesKey};

// =============================================================================
// Property Strategies
// =============================================================================

/// Parameters inside the bounded regime of the map.
fn param_strategy() -> impl Strategy<Value = f64> {
    0.0f64..=4.0
}

/// Target step plus a split point at or below it.
fn split_strategy() -> impl Strategy<Value = (u64, u64)> {
    (0u64..3000).prop_flat_map(|n| (Just(n), 0..=n))
}

/// Every finite double, including subnormals and both zeros.
fn finite_strategy() -> impl Strategy<Value = f64> {
    any::<u64>()
        .prop_map(f64::from_bits)
        .prop_filter("finite", |v| v.is_finite())
}

fn fresh_engine(store: Arc<InMemoryCheckpointStore>, interval: u64) -> ComputeEngine {
    let config = EngineConfig {
        checkpoint_interval: interval,
        ..Default::default()
    };
    ComputeEngine::new(config, store).unwrap()
}

// =============================================================================
// Compute Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: a checkpoint at any step below the target changes nothing.
    #[test]
    fn prop_resume_equivalence(r in param_strategy(), (n, split) in split_strategy()) {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let key = SeriesKey::from_param(r);
        tokio_test::block_on(store.upsert(key, Checkpoint::new(split, value_at(r, split))))?;

        let engine = fresh_engine(store, 1000);
        let resumed = tokio_test::block_on(engine.compute(r, n));

        prop_assert_eq!(resumed.to_bits(), value_at(r, n).to_bits());
    }

    /// Property: repeating a request returns the same bits, whether from L1 or
    /// from checkpoints written by the first request.
    #[test]
    fn prop_repeat_is_identical(r in param_strategy(), n in 0u64..2500, interval in 1u64..500) {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let first_engine = fresh_engine(store.clone(), interval);
        let first = tokio_test::block_on(first_engine.compute(r, n));
        let again = tokio_test::block_on(first_engine.compute(r, n));

        // A fresh engine over the same store resumes from persisted checkpoints.
        let second_engine = fresh_engine(store, interval);
        let resumed = tokio_test::block_on(second_engine.compute(r, n));

        prop_assert_eq!(first.to_bits(), again.to_bits());
        prop_assert_eq!(first.to_bits(), resumed.to_bits());
    }

    /// Property: batch answers match single-request answers, one per request.
    #[test]
    fn prop_batch_matches_single(
        requests in prop::collection::vec((prop::sample::select(vec![2.5, 3.2, 3.9]), 0u64..200), 0..20)
    ) {
        let engine = ComputeEngine::in_memory().unwrap();
        let requests: Vec<_> = requests.into_iter().map(|(r, n)| SeriesRequest { r, n }).collect();
        let results = tokio_test::block_on(engine.compute_batch(&requests));

        prop_assert_eq!(results.len(), requests.len());
        for result in results {
            prop_assert_eq!(result.result.to_bits(), value_at(result.r, result.n).to_bits());
        }
    }
}

// =============================================================================
// Storage and Partition Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Property: decode(encode(v)) has the same bit pattern as v.
    #[test]
    fn prop_value_encoding_is_bit_exact(value in finite_strategy()) {
        let key = SeriesKey::from_param(3.5);
        let decoded = decode_value(key, &encode_value(value))?;
        prop_assert_eq!(decoded.to_bits(), value.to_bits());
    }

    /// Property: every key has exactly one owner in `0..total`.
    #[test]
    fn prop_pod_for_in_range(bits in any::<u64>(), total in 1usize..64) {
        let owner = pod_for(SeriesKey::from_raw(bits), total);
        prop_assert!(owner < total);
        prop_assert_eq!(owner, pod_for(SeriesKey::from_raw(bits), total));
    }
}
