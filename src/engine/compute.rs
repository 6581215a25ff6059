//! Compute engine: L1, checkpoint resumption and persistence

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{group_by_series, EngineConfig, SeriesRequest, SeriesResult};
use crate::cache::SeriesCache;
use crate::checkpoint::{is_checkpoint_step, Checkpoint, CheckpointStore, InMemoryCheckpointStore};
use crate::error::Result;
use crate::metrics::EngineMetrics;
use crate::partition::{Ownership, PodPartitioner};
use crate::series::{self, SeriesKey};

/// Shared compute engine
pub struct ComputeEngine {
    cache: SeriesCache,
    store: Arc<dyn CheckpointStore>,
    partitioner: PodPartitioner,
    config: EngineConfig,
    metrics: EngineMetrics,
}

impl ComputeEngine {
    /// Create an engine over `store`
    pub fn new(config: EngineConfig, store: Arc<dyn CheckpointStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache: SeriesCache::new(config.cache_capacity),
            partitioner: PodPartitioner::new(config.pod_id.clone(), config.total_pods),
            metrics: EngineMetrics::new()?,
            store,
            config,
        })
    }

    /// Create with default configuration and an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::new(
            EngineConfig::default(),
            Arc::new(InMemoryCheckpointStore::new()),
        )
    }

    /// Value of the series for `r` at step `n`.
    ///
    /// Never fails: store problems degrade to recomputation, and non-finite
    /// values produced by extreme `r` are returned as they are.
    pub async fn compute(&self, r: f64, n: u64) -> f64 {
        self.metrics.compute_requests.inc();
        let key = SeriesKey::from_param(r);

        if let Some(value) = self.cache.get(key, n) {
            self.metrics.cache_hits.inc();
            return value;
        }
        self.metrics.cache_misses.inc();

        // Advisory only: forwarding to the owner would branch off here.
        if let Ownership::Remote { owner } = self.partitioner.ownership(key) {
            self.metrics.non_local_computes.inc();
            warn!(
                "Computing non-local r={} (should be on pod {}, this is pod {})",
                r,
                owner,
                self.partitioner.local_index()
            );
        }

        let start = self.resume_point(key, n).await;
        let interval = self.config.checkpoint_interval;

        let mut x = start.value;
        for i in start.step..n {
            x = series::step(r, x);
            let current = i + 1;
            self.cache.set(key, current, x);

            if is_checkpoint_step(current, interval) {
                self.persist(key, Checkpoint::new(current, x)).await;
            }
        }

        self.metrics
            .steps_computed
            .inc_by(n.saturating_sub(start.step));
        x
    }

    /// Compute a batch of requests, grouped by series with steps ascending so
    /// later steps of a series extend the ones just computed.
    pub async fn compute_batch(&self, requests: &[SeriesRequest]) -> Vec<SeriesResult> {
        let mut results = Vec::with_capacity(requests.len());
        for group in group_by_series(requests) {
            for n in group.steps {
                let result = self.compute(group.r, n).await;
                results.push(SeriesResult {
                    r: group.r,
                    n,
                    result,
                });
            }
        }
        results
    }

    /// Closest stored checkpoint at or below `n`, or the initial condition.
    async fn resume_point(&self, key: SeriesKey, n: u64) -> Checkpoint {
        match self.store.find_at_or_below(key, n).await {
            Ok(Some(checkpoint)) if checkpoint.step <= n => {
                self.metrics.checkpoint_resumes.inc();
                debug!(
                    "Resuming series {} from checkpoint at step {} (target {})",
                    key, checkpoint.step, n
                );
                checkpoint
            }
            Ok(Some(checkpoint)) => {
                warn!(
                    "Store returned checkpoint at step {} for a lookup at or below {}; ignoring it",
                    checkpoint.step, n
                );
                Checkpoint::origin()
            }
            Ok(None) => Checkpoint::origin(),
            Err(e) => {
                self.metrics.store_errors.inc();
                warn!(
                    "Checkpoint lookup for series {} failed, computing from step 0: {}",
                    key, e
                );
                Checkpoint::origin()
            }
        }
    }

    async fn persist(&self, key: SeriesKey, checkpoint: Checkpoint) {
        match self.store.upsert(key, checkpoint).await {
            Ok(()) => self.metrics.checkpoint_writes.inc(),
            Err(e) => {
                self.metrics.store_errors.inc();
                warn!(
                    "Failed to store checkpoint {} of series {}: {}",
                    checkpoint.step, key, e
                );
            }
        }
    }

    /// Seed L1 with the latest checkpoint of up to `preheat_limit` series.
    ///
    /// Returns the number of series loaded. Failures are logged and skipped.
    pub async fn preheat(&self) -> usize {
        let limit = self.config.preheat_limit;
        info!("Preheating cache from {} store (up to {} series)", self.store.name(), limit);

        let keys = match self.store.list_keys(limit).await {
            Ok(keys) => keys,
            Err(e) => {
                self.metrics.store_errors.inc();
                warn!("Could not list checkpointed series, skipping preheat: {}", e);
                return 0;
            }
        };

        let mut loaded = 0;
        for key in keys.into_iter().take(limit) {
            match self.store.find_latest(key).await {
                Ok(Some(checkpoint)) => {
                    self.cache.set(key, checkpoint.step, checkpoint.value);
                    loaded += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    self.metrics.store_errors.inc();
                    warn!("Skipping series {} during preheat: {}", key, e);
                }
            }
        }

        info!("Preheated {} entries", loaded);
        loaded
    }

    /// Write every checkpoint-step value currently in L1 to the store in one
    /// batch. Best effort: a failure is logged and reported as 0 written.
    pub async fn flush_to_store(&self) -> usize {
        let interval = self.config.checkpoint_interval;
        let snapshot = self.cache.snapshot();

        let batch: Vec<(SeriesKey, Checkpoint)> = snapshot
            .iter()
            .flat_map(|(&key, steps)| {
                steps
                    .iter()
                    .filter(|&(&n, _)| is_checkpoint_step(n, interval))
                    .map(move |(&n, &x)| (key, Checkpoint::new(n, x)))
            })
            .collect();

        if batch.is_empty() {
            debug!("Nothing to flush: no checkpoint steps in L1");
            return 0;
        }

        info!(
            "Flushing {} checkpoints from {} series to {} store",
            batch.len(),
            snapshot.len(),
            self.store.name()
        );
        match self.store.upsert_batch(&batch).await {
            Ok(()) => {
                self.metrics.checkpoint_writes.inc_by(batch.len() as u64);
                info!("Flushed {} checkpoints", batch.len());
                batch.len()
            }
            Err(e) => {
                self.metrics.store_errors.inc();
                error!("Flush error: {}", e);
                0
            }
        }
    }

    /// Release the store connection
    pub async fn close(&self) {
        self.store.close().await;
        info!("Checkpoint store closed");
    }

    /// Get reference to L1 cache
    pub fn cache(&self) -> &SeriesCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn partitioner(&self) -> &PodPartitioner {
        &self.partitioner
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Metrics with L1 gauges refreshed
    pub fn metrics(&self) -> &EngineMetrics {
        self.metrics.observe_cache(&self.cache.stats());
        &self.metrics
    }
}

impl std::fmt::Debug for ComputeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeEngine")
            .field("store", &self.store.name())
            .field("cache", &self.cache)
            .field("partitioner", &self.partitioner)
            .field("config", &self.config)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
