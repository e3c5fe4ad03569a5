//! Operation latency and tier resource metrics.
//!
//! The recorder keeps every latency sample it is handed (no reservoir or
//! histogram downsampling; long-running instances would want one) and folds
//! tier-level counters alongside. `summary()` produces a serializable
//! snapshot with nearest-rank percentiles.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static CLOCK_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic nanoseconds since the first call in this process.
pub fn now_ns() -> u64 {
    CLOCK_EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Aggregated statistics for one operation name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpStats {
    pub count: u64,
    pub mean_ns: u64,
    pub median_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
}

/// Queryable snapshot of everything the recorder has seen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Per-operation latency statistics, keyed by operation name.
    pub ops: HashMap<String, OpStats>,
    /// Cumulative bytes accessed per tier.
    pub tier_utilization_bytes: HashMap<String, u64>,
    /// Cumulative bytes saved by compression per tier.
    pub compression_savings_bytes: HashMap<String, u64>,
    /// Total wall-clock time spent in migration scans that moved data.
    pub migration_overhead_ns: u64,
}

/// Collects operation latencies and tier-level counters.
///
/// All entry points are callable concurrently from any task or thread.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    latencies_ns: RwLock<HashMap<String, Vec<u64>>>,
    tier_utilization: RwLock<HashMap<String, u64>>,
    compression_savings: RwLock<HashMap<String, u64>>,
    migration_overhead_ns: AtomicU64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one latency sample for an operation.
    pub fn record(&self, op_name: &str, start_ns: u64, end_ns: u64) {
        let sample = end_ns.saturating_sub(start_ns);
        let mut latencies = self.latencies_ns.write();
        latencies.entry(op_name.to_string()).or_default().push(sample);
    }

    /// Adds accessed bytes to a tier's cumulative utilization counter.
    pub fn record_tier_access(&self, tier_name: &str, bytes: u64) {
        let mut utilization = self.tier_utilization.write();
        *utilization.entry(tier_name.to_string()).or_default() += bytes;
    }

    /// Adds the bytes a compressed placement saved over its raw size.
    pub fn record_compression_savings(&self, tier_name: &str, original: u64, compressed: u64) {
        let saved = original.saturating_sub(compressed);
        if saved == 0 {
            return;
        }
        let mut savings = self.compression_savings.write();
        *savings.entry(tier_name.to_string()).or_default() += saved;
    }

    /// Adds one migration scan's wall-clock duration.
    pub fn record_migration_overhead(&self, ns: u64) {
        self.migration_overhead_ns.fetch_add(ns, Ordering::Relaxed);
    }

    /// Builds a summary over everything recorded so far.
    pub fn summary(&self) -> MetricsSummary {
        let latencies = self.latencies_ns.read();
        let mut ops = HashMap::with_capacity(latencies.len());
        for (name, samples) in latencies.iter() {
            if samples.is_empty() {
                continue;
            }
            let mut sorted = samples.clone();
            sorted.sort_unstable();
            let count = sorted.len() as u64;
            let sum: u64 = sorted.iter().sum();
            ops.insert(
                name.clone(),
                OpStats {
                    count,
                    mean_ns: sum / count,
                    median_ns: nearest_rank(&sorted, 50.0),
                    p95_ns: nearest_rank(&sorted, 95.0),
                    p99_ns: nearest_rank(&sorted, 99.0),
                    min_ns: sorted[0],
                    max_ns: sorted[sorted.len() - 1],
                },
            );
        }
        drop(latencies);

        MetricsSummary {
            ops,
            tier_utilization_bytes: self.tier_utilization.read().clone(),
            compression_savings_bytes: self.compression_savings.read().clone(),
            migration_overhead_ns: self.migration_overhead_ns.load(Ordering::Relaxed),
        }
    }
}

/// Nearest-rank percentile over ascending-sorted samples.
///
/// Indexes via truncation: `floor(p/100 * (n-1))`. An empty slice yields 0.
fn nearest_rank(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64) as usize;
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_nearest_rank_known_values() {
        let samples = [1, 2, 3, 4, 5];
        assert_eq!(nearest_rank(&samples, 50.0), 3);
        assert_eq!(nearest_rank(&samples, 95.0), 4);
        assert_eq!(nearest_rank(&samples, 99.0), 4);
        assert_eq!(nearest_rank(&samples, 100.0), 5);
        assert_eq!(nearest_rank(&samples, 0.0), 1);
    }

    #[test]
    fn test_empty_samples_yield_zero() {
        assert_eq!(nearest_rank(&[], 50.0), 0);
        assert_eq!(nearest_rank(&[], 99.0), 0);
    }

    #[test]
    fn test_summary_op_stats() {
        let recorder = MetricsRecorder::new();
        for sample in [1u64, 2, 3, 4, 5] {
            recorder.record("get", 0, sample);
        }
        let summary = recorder.summary();
        let stats = summary.ops.get("get").unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.mean_ns, 3);
        assert_eq!(stats.median_ns, 3);
        assert_eq!(stats.min_ns, 1);
        assert_eq!(stats.max_ns, 5);
    }

    #[test]
    fn test_summary_skips_unknown_ops() {
        let recorder = MetricsRecorder::new();
        recorder.record("put", 10, 20);
        let summary = recorder.summary();
        assert!(summary.ops.contains_key("put"));
        assert!(!summary.ops.contains_key("get"));
    }

    #[test]
    fn test_counters_accumulate() {
        let recorder = MetricsRecorder::new();
        recorder.record_tier_access("DRAM", 100);
        recorder.record_tier_access("DRAM", 50);
        recorder.record_compression_savings("CXL", 1000, 500);
        recorder.record_compression_savings("CXL", 1000, 1000);
        recorder.record_migration_overhead(42);
        recorder.record_migration_overhead(8);

        let summary = recorder.summary();
        assert_eq!(summary.tier_utilization_bytes["DRAM"], 150);
        assert_eq!(summary.compression_savings_bytes["CXL"], 500);
        assert_eq!(summary.migration_overhead_ns, 50);
    }

    #[test]
    fn test_record_is_thread_safe() {
        let recorder = Arc::new(MetricsRecorder::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let recorder = Arc::clone(&recorder);
            handles.push(std::thread::spawn(move || {
                for i in 0..1000 {
                    recorder.record("op", 0, i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(recorder.summary().ops["op"].count, 4000);
    }

    #[test]
    fn test_now_ns_is_monotonic() {
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_summary_serializes() {
        let recorder = MetricsRecorder::new();
        recorder.record("put", 0, 10);
        let json = serde_json::to_string(&recorder.summary()).unwrap();
        assert!(json.contains("migration_overhead_ns"));
    }
}
