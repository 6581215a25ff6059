//! Engine metrics
//!
//! Prometheus counters for the compute path plus L1 gauges that are
//! refreshed from [`CacheStats`] whenever the registry is scraped.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

use crate::cache::CacheStats;
use crate::error::Result;

/// Metric name prefix
const NAMESPACE: &str = "seqcalc";

/// Prometheus metrics owned by one engine
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,
    pub compute_requests: IntCounter,
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub checkpoint_resumes: IntCounter,
    pub checkpoint_writes: IntCounter,
    pub store_errors: IntCounter,
    pub non_local_computes: IntCounter,
    pub steps_computed: IntCounter,
    cache_series: IntGauge,
    cache_evictions: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(format!("{}_{}", NAMESPACE, name), help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::new(format!("{}_{}", NAMESPACE, name), help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl EngineMetrics {
    /// Create and register all engine metrics in a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            compute_requests: counter(
                &registry,
                "compute_requests_total",
                "Total number of compute requests",
            )?,
            cache_hits: counter(&registry, "cache_hits_total", "Requests answered from L1")?,
            cache_misses: counter(&registry, "cache_misses_total", "Requests that missed L1")?,
            checkpoint_resumes: counter(
                &registry,
                "checkpoint_resumes_total",
                "Computations resumed from a stored checkpoint",
            )?,
            checkpoint_writes: counter(
                &registry,
                "checkpoint_writes_total",
                "Checkpoints written to the store",
            )?,
            store_errors: counter(
                &registry,
                "store_errors_total",
                "Checkpoint store operations that failed",
            )?,
            non_local_computes: counter(
                &registry,
                "non_local_computes_total",
                "Series computed on a pod that does not own them",
            )?,
            steps_computed: counter(
                &registry,
                "steps_computed_total",
                "Recurrence steps evaluated",
            )?,
            cache_series: gauge(&registry, "cache_series", "Series currently held in L1")?,
            cache_evictions: gauge(
                &registry,
                "cache_evictions",
                "Series evicted from L1 since start",
            )?,
            registry,
        })
    }

    /// Copy L1 statistics into the gauges
    pub fn observe_cache(&self, stats: &CacheStats) {
        self.cache_series.set(stats.series as i64);
        self.cache_evictions.set(stats.evictions as i64);
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics")
            .field("compute_requests", &self.compute_requests.get())
            .field("cache_hits", &self.cache_hits.get())
            .finish()
    }
}
