//! Pod Partitioner
//!
//! Deterministic assignment of each series to one nominal owner among the
//! cooperating instances ("pods"). Ownership is advisory: a pod that
//! receives a series it does not own still computes it locally and reports
//! the mismatch. [`Ownership::Remote`] is where request forwarding to the
//! owning pod would plug in.

use tracing::warn;

use crate::series::SeriesKey;

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// FNV-1a, 32-bit
fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV32_OFFSET, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV32_PRIME)
    })
}

/// Owning pod index of `key` among `total_pods` pods.
///
/// Hashes the key's little-endian bytes; `total_pods == 0` behaves as 1.
pub fn pod_for(key: SeriesKey, total_pods: usize) -> usize {
    let total = total_pods.max(1) as u64;
    (u64::from(fnv1a_32(&key.to_le_bytes())) % total) as usize
}

/// Ordinal of a pod from its identifier: the integer after the last `-`.
///
/// `"pod-2"` and `"seqcalc-2"` both give 2. Anything else gives `None`.
pub fn parse_pod_index(pod_id: &str) -> Option<usize> {
    let (_, ordinal) = pod_id.rsplit_once('-')?;
    ordinal.parse().ok()
}

/// Result of an ownership check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// This pod owns the series
    Local,
    /// Another pod owns the series
    Remote { owner: usize },
}

/// Ownership view of one pod
#[derive(Debug, Clone)]
pub struct PodPartitioner {
    pod_id: String,
    local_index: usize,
    total_pods: usize,
}

impl PodPartitioner {
    /// Partitioner for pod `pod_id` in a cluster of `total_pods`.
    ///
    /// A malformed `pod_id` resolves to index 0 with a warning.
    pub fn new(pod_id: impl Into<String>, total_pods: usize) -> Self {
        let pod_id = pod_id.into();
        let local_index = parse_pod_index(&pod_id).unwrap_or_else(|| {
            warn!(
                "Pod id {:?} has no numeric ordinal suffix, assuming index 0",
                pod_id
            );
            0
        });
        let total_pods = total_pods.max(1);
        if local_index >= total_pods {
            warn!(
                "Pod index {} is outside a cluster of {} pods; this pod will own no series",
                local_index, total_pods
            );
        }

        Self {
            pod_id,
            local_index,
            total_pods,
        }
    }

    pub fn pod_id(&self) -> &str {
        &self.pod_id
    }

    pub fn local_index(&self) -> usize {
        self.local_index
    }

    pub fn total_pods(&self) -> usize {
        self.total_pods
    }

    /// Nominal owner of `key`
    pub fn owner_of(&self, key: SeriesKey) -> usize {
        pod_for(key, self.total_pods)
    }

    pub fn is_local(&self, key: SeriesKey) -> bool {
        self.owner_of(key) == self.local_index
    }

    pub fn ownership(&self, key: SeriesKey) -> Ownership {
        let owner = self.owner_of(key);
        if owner == self.local_index {
            Ownership::Local
        } else {
            Ownership::Remote { owner }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_reference_vectors() {
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a_32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_pod_for_is_deterministic() {
        let key = SeriesKey::from_param(3.7);
        assert_eq!(pod_for(key, 3), pod_for(key, 3));
        assert_eq!(
            pod_for(key, 3),
            (fnv1a_32(&key.to_le_bytes()) % 3) as usize
        );
    }

    #[test]
    fn test_pod_for_is_total() {
        for i in 0..1000u64 {
            let key = SeriesKey::from_param(i as f64 * 0.004);
            for total in 1..8 {
                assert!(pod_for(key, total) < total);
            }
        }
    }

    #[test]
    fn test_zero_pods_behaves_as_one() {
        assert_eq!(pod_for(SeriesKey::from_param(2.5), 0), 0);
    }

    #[test]
    fn test_spread_across_pods() {
        let mut counts = [0usize; 3];
        for i in 0..3000u64 {
            counts[pod_for(SeriesKey::from_param(1.0 + i as f64 * 1e-3), 3)] += 1;
        }
        assert!(counts.iter().all(|&c| c > 500), "skewed: {:?}", counts);
    }

    #[test]
    fn test_parse_pod_index() {
        assert_eq!(parse_pod_index("pod-0"), Some(0));
        assert_eq!(parse_pod_index("pod-12"), Some(12));
        assert_eq!(parse_pod_index("seqcalc-statefulset-2"), Some(2));
        assert_eq!(parse_pod_index("pod"), None);
        assert_eq!(parse_pod_index("pod-x"), None);
        assert_eq!(parse_pod_index(""), None);
    }

    #[test]
    fn test_malformed_id_is_index_zero() {
        let partitioner = PodPartitioner::new("worker", 3);
        assert_eq!(partitioner.local_index(), 0);
        assert_eq!(partitioner.pod_id(), "worker");
    }

    #[test]
    fn test_single_pod_owns_everything() {
        let partitioner = PodPartitioner::new("pod-0", 1);
        for r in [0.5, 1.0, 2.0, 3.5, 4.0] {
            assert!(partitioner.is_local(SeriesKey::from_param(r)));
        }
    }

    #[test]
    fn test_ownership_is_consistent_across_pods() {
        let pods: Vec<_> = (0..3)
            .map(|i| PodPartitioner::new(format!("pod-{}", i), 3))
            .collect();

        for i in 0..200u64 {
            let key = SeriesKey::from_param(2.0 + i as f64 / 100.0);
            let owners: Vec<_> = pods.iter().filter(|p| p.is_local(key)).collect();
            assert_eq!(owners.len(), 1);

            let owner = owners[0].local_index();
            for pod in &pods {
                let expected = if pod.local_index() == owner {
                    Ownership::Local
                } else {
                    Ownership::Remote { owner }
                };
                assert_eq!(pod.ownership(key), expected);
            }
        }
    }
}
