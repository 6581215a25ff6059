//! Engine configuration

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::checkpoint::DEFAULT_CHECKPOINT_INTERVAL;
use crate::error::{Error, Result};

/// Default number of series loaded into L1 at startup
pub const DEFAULT_PREHEAT_LIMIT: usize = 50;

/// Compute engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Identifier of this instance, e.g. `pod-2`
    pub pod_id: String,
    /// Number of cooperating instances
    pub total_pods: usize,
    /// Series held in L1
    pub cache_capacity: usize,
    /// Steps that are multiples of this are persisted
    pub checkpoint_interval: u64,
    /// Series loaded from the store by `preheat`
    pub preheat_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pod_id: "pod-0".to_string(),
            total_pods: 1,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            preheat_limit: DEFAULT_PREHEAT_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::Config("cache capacity must be at least 1".into()));
        }
        if self.checkpoint_interval == 0 {
            return Err(Error::Config("checkpoint interval must be at least 1".into()));
        }
        if self.total_pods == 0 {
            return Err(Error::Config("total pods must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_capacity, 75);
        assert_eq!(config.checkpoint_interval, 1000);
        assert_eq!(config.preheat_limit, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_values() {
        let zero_capacity = EngineConfig {
            cache_capacity: 0,
            ..Default::default()
        };
        assert_matches!(zero_capacity.validate(), Err(Error::Config(_)));

        let zero_interval = EngineConfig {
            checkpoint_interval: 0,
            ..Default::default()
        };
        assert_matches!(zero_interval.validate(), Err(Error::Config(_)));

        let zero_pods = EngineConfig {
            total_pods: 0,
            ..Default::default()
        };
        assert_matches!(zero_pods.validate(), Err(Error::Config(_)));
    }
}
