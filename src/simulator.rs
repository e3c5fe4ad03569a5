//! Simulation harness: wires tiers, store, migrator, and metrics together
//! and drives synthetic workloads against them.

use crate::config::SimConfig;
use crate::error::{Result, TierSimError};
use crate::lock::TierSet;
use crate::map::TieredMap;
use crate::metrics::{MetricsRecorder, MetricsSummary};
use crate::migrator::{Migrator, MigratorStats};
use crate::policy::{HotWarmCold, PlacementPolicy};
use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

/// What a workload run observed.
///
/// Failed puts are counted here rather than aborting the run; capacity
/// rejection is an expected outcome the driver needs to see.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WorkloadReport {
    /// Successful writes.
    pub puts: u64,
    /// Reads that found a value.
    pub gets: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Writes rejected for capacity.
    pub failed_puts: u64,
}

/// A tiered-storage simulation: shared store, background migrator, metrics.
pub struct Simulator {
    config: SimConfig,
    metrics: Arc<MetricsRecorder>,
    map: Arc<TieredMap>,
    migrator: Arc<Migrator>,
    migrator_task: Mutex<Option<JoinHandle<()>>>,
}

impl Simulator {
    /// Builds a simulator from a validated config.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(MetricsRecorder::new());
        let tiers = Arc::new(TierSet::new(config.tiers.clone(), &config.backoff));
        let policy: Arc<dyn PlacementPolicy> = Arc::new(HotWarmCold::from(&config.policy));
        let map = Arc::new(TieredMap::new(
            tiers,
            policy,
            Arc::clone(&metrics),
        ));
        let migrator = Arc::new(Migrator::new(Arc::clone(&map), config.migrator.clone()));

        Ok(Self {
            config,
            metrics,
            map,
            migrator,
            migrator_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn map(&self) -> &Arc<TieredMap> {
        &self.map
    }

    pub fn migrator(&self) -> &Arc<Migrator> {
        &self.migrator
    }

    pub fn migrator_stats(&self) -> MigratorStats {
        self.migrator.stats()
    }

    /// Current metrics snapshot.
    pub fn summary(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    /// Spawns the background migrator. Idempotent while running.
    pub fn start(&self) {
        let mut task = self.migrator_task.lock();
        if task.is_some() {
            return;
        }
        let migrator = Arc::clone(&self.migrator);
        *task = Some(tokio::spawn(async move { migrator.run().await }));
        info!("simulation started");
    }

    /// Stops the migrator, waiting at most the configured shutdown timeout.
    pub async fn stop(&self) {
        self.migrator.shutdown();
        let handle = self.migrator_task.lock().take();
        let Some(mut handle) = handle else {
            return;
        };

        match timeout(self.config.migrator.shutdown_timeout, &mut handle).await {
            Ok(_) => info!("simulation stopped"),
            Err(_) => {
                warn!(
                    timeout = ?self.config.migrator.shutdown_timeout,
                    "migrator did not stop in time, aborting task"
                );
                handle.abort();
            }
        }
    }

    /// Sequential pattern: writes walk the key space `k0, k1, ...` while
    /// reads pick a uniformly random already-written key.
    pub async fn workload_sequential(
        &self,
        n_ops: usize,
        payload_size: usize,
        read_ratio: f64,
        seed: u64,
    ) -> Result<WorkloadReport> {
        let mut rng = StdRng::seed_from_u64(seed);
        let payload = Bytes::from(vec![0u8; payload_size]);
        let mut report = WorkloadReport::default();

        for i in 0..n_ops {
            if i > 0 && rng.gen::<f64>() < read_ratio {
                let key = format!("k{}", rng.gen_range(0..i));
                self.driver_get(&key, &mut report).await?;
            } else {
                let key = format!("k{}", i);
                self.driver_put(&key, payload.clone(), &mut report).await?;
            }
        }

        info!(ops = n_ops, ?report, "sequential workload complete");
        Ok(report)
    }

    /// Uniformly random reads and writes over a fixed key space.
    pub async fn workload_random(
        &self,
        n_ops: usize,
        payload_size: usize,
        key_space: usize,
        read_ratio: f64,
        seed: u64,
    ) -> Result<WorkloadReport> {
        let mut rng = StdRng::seed_from_u64(seed);
        let payload = Bytes::from(vec![0u8; payload_size]);
        let mut report = WorkloadReport::default();

        for _ in 0..n_ops {
            let key = format!("k{}", rng.gen_range(0..key_space.max(1)));
            if rng.gen::<f64>() < read_ratio {
                self.driver_get(&key, &mut report).await?;
            } else {
                self.driver_put(&key, payload.clone(), &mut report).await?;
            }
        }

        info!(ops = n_ops, ?report, "random workload complete");
        Ok(report)
    }

    /// Skewed pattern: a small hot set of keys receives most of the traffic.
    ///
    /// `hotspot_fraction` is the share of the key space that is hot; the hot
    /// set receives the complementary share of accesses (0.2 means 20% of
    /// keys take 80% of operations).
    pub async fn workload_hotspot(
        &self,
        n_ops: usize,
        payload_size: usize,
        hotspot_fraction: f64,
        read_ratio: f64,
        seed: u64,
    ) -> Result<WorkloadReport> {
        let fraction = hotspot_fraction.clamp(0.01, 1.0);
        let total_keys = ((100.0 / fraction) as usize).max(1);
        let hot_keys = ((total_keys as f64 * fraction) as usize).max(1);

        let mut rng = StdRng::seed_from_u64(seed);
        let payload = Bytes::from(vec![0u8; payload_size]);
        let mut report = WorkloadReport::default();

        for _ in 0..n_ops {
            let key = if rng.gen::<f64>() < 1.0 - fraction {
                format!("k{}", rng.gen_range(0..hot_keys))
            } else {
                format!("k{}", rng.gen_range(hot_keys..total_keys))
            };
            if rng.gen::<f64>() < read_ratio {
                self.driver_get(&key, &mut report).await?;
            } else {
                self.driver_put(&key, payload.clone(), &mut report).await?;
            }
        }

        info!(ops = n_ops, ?report, "hotspot workload complete");
        Ok(report)
    }

    async fn driver_put(
        &self,
        key: &str,
        payload: Bytes,
        report: &mut WorkloadReport,
    ) -> Result<()> {
        match self.map.put(key, payload).await {
            Ok(()) => report.puts += 1,
            Err(e @ TierSimError::CapacityExceeded { .. }) => {
                warn!(key = %key, error = %e, "put rejected");
                report.failed_puts += 1;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn driver_get(&self, key: &str, report: &mut WorkloadReport) -> Result<()> {
        match self.map.get(key).await? {
            Some(_) => report.gets += 1,
            None => report.misses += 1,
        }
        Ok(())
    }
}
