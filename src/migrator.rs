//! Background re-placement of stored objects.
//!
//! The migrator periodically re-runs the placement policy over everything in
//! the map and relocates objects whose desired tier has diverged from where
//! they sit. It contends with foreground operations through the same per-key
//! and per-tier locks, so a migration is atomic from any observer's point of
//! view: the object is always reachable under exactly one tier label.

use crate::config::MigratorConfig;
use crate::map::TieredMap;
use crate::metrics::now_ns;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Cumulative migrator counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MigratorStats {
    /// Completed scan cycles.
    pub scans: u64,
    /// Objects whose placement was evaluated.
    pub evaluated: u64,
    /// Objects relocated.
    pub migrated: u64,
    /// Relocations onto a faster tier.
    pub promotions: u64,
    /// Relocations onto a slower tier.
    pub demotions: u64,
    /// Relocations skipped because the target tier was full.
    pub skipped_full: u64,
}

/// Outcome of a single scan cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanReport {
    pub evaluated: u64,
    pub migrated: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub skipped_full: u64,
}

/// The background rebalancer.
pub struct Migrator {
    map: Arc<TieredMap>,
    config: MigratorConfig,
    stats: RwLock<MigratorStats>,
    shutdown: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Migrator {
    pub fn new(map: Arc<TieredMap>, config: MigratorConfig) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        Self {
            map,
            config,
            stats: RwLock::new(MigratorStats::default()),
            shutdown,
            shutdown_rx,
        }
    }

    /// Runs scan cycles on the configured interval until shut down.
    pub async fn run(&self) {
        info!(interval = ?self.config.scan_interval, "starting migrator");

        let mut interval = tokio::time::interval(self.config.scan_interval);
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("migrator shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    let report = self.scan_once().await;
                    if report.migrated > 0 {
                        debug!(
                            evaluated = report.evaluated,
                            migrated = report.migrated,
                            skipped_full = report.skipped_full,
                            "scan cycle complete"
                        );
                    }
                }
            }
        }
    }

    /// Signals the run loop to stop after the current cycle.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn stats(&self) -> MigratorStats {
        *self.stats.read()
    }

    /// One full evaluation pass over the stored objects.
    ///
    /// Public so tests and drivers can force a deterministic scan instead of
    /// waiting out the interval.
    pub async fn scan_once(&self) -> ScanReport {
        let start = now_ns();
        let mut report = ScanReport::default();

        let snapshot = self.map.snapshot().await;
        let tiers = self.map.tiers();
        let policy = self.map.policy();

        for (key, slot) in snapshot {
            let mut obj = slot.lock().await;
            let Some(current) = obj.tier.clone() else {
                continue;
            };
            report.evaluated += 1;

            let desired = policy.choose_tier(&obj.stats).to_string();
            if desired == current {
                continue;
            }
            let size = obj.stats.size_bytes;

            let pair = match tiers.acquire_pair(&current, &desired).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(key = %key, error = %e, "migration aborted");
                    continue;
                }
            };
            let (mut old_tier, mut new_tier) = pair;

            // Place before removing so the object is accounted somewhere at
            // every instant; a full target leaves it where it was.
            let footprint = match new_tier.place(size) {
                Ok(footprint) => footprint,
                Err(e) => {
                    debug!(key = %key, tier = %desired, error = %e, "target full, retrying next cycle");
                    report.skipped_full += 1;
                    continue;
                }
            };
            old_tier.remove(size);

            let promotion = new_tier.config().base_latency_ns < old_tier.config().base_latency_ns;
            self.map
                .metrics()
                .record_compression_savings(&desired, size, footprint);
            drop(new_tier);
            drop(old_tier);

            obj.tier = Some(desired.clone());
            report.migrated += 1;
            if promotion {
                report.promotions += 1;
            } else {
                report.demotions += 1;
            }
            debug!(key = %key, from = %current, to = %desired, "migrated object");
        }

        if report.migrated > 0 {
            self.map
                .metrics()
                .record_migration_overhead(now_ns().saturating_sub(start));
        }

        let mut stats = self.stats.write();
        stats.scans += 1;
        stats.evaluated += report.evaluated;
        stats.migrated += report.migrated;
        stats.promotions += report.promotions;
        stats.demotions += report.demotions;
        stats.skipped_full += report.skipped_full;

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackoffConfig, TierConfig};
    use crate::lock::TierSet;
    use crate::metrics::MetricsRecorder;
    use crate::policy::{HotWarmCold, PlacementPolicy};
    use std::time::Duration;

    fn setup(hot: u64, warm: u64, dram_capacity: u64) -> (Arc<TieredMap>, Migrator) {
        let tiers = vec![
            TierConfig::new("DRAM", dram_capacity, 80, 50_000_000_000),
            TierConfig::new("SSD", 1024 * 1024 * 1024, 1_000, 2_000_000_000),
            TierConfig::new("HDD", 8 * 1024 * 1024 * 1024, 3_000, 200_000_000),
        ];
        let set = Arc::new(TierSet::new(tiers, &BackoffConfig::default()));
        let policy: Arc<dyn PlacementPolicy> = Arc::new(HotWarmCold::new(hot, warm));
        let map = Arc::new(TieredMap::new(set, policy, Arc::new(MetricsRecorder::new())));
        let migrator = Migrator::new(Arc::clone(&map), MigratorConfig::default());
        (map, migrator)
    }

    #[tokio::test]
    async fn test_hot_object_promotes_within_one_scan() {
        let (map, migrator) = setup(5, 2, 16 * 1024 * 1024);

        map.put("k", vec![0u8; 1024]).await.unwrap();
        for _ in 0..4 {
            map.get("k").await.unwrap();
        }
        // Five accesses total; the object is hot but still where its first
        // placement put it.
        assert_eq!(map.stats_of("k").await.unwrap().access_count, 5);
        assert_eq!(map.tier_of("k").await.unwrap(), "SSD");

        let report = migrator.scan_once().await;
        assert_eq!(report.migrated, 1);
        assert_eq!(report.promotions, 1);
        assert_eq!(map.tier_of("k").await.unwrap(), "DRAM");

        let usage = map.tiers().usage().await;
        assert_eq!(usage["DRAM"], 1024);
        assert_eq!(usage["SSD"], 0);
    }

    #[tokio::test]
    async fn test_settled_objects_are_left_alone() {
        let (map, migrator) = setup(100, 20, 16 * 1024 * 1024);
        map.put("k", vec![0u8; 1024]).await.unwrap();

        let report = migrator.scan_once().await;
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.migrated, 0);
        assert_eq!(map.tier_of("k").await.unwrap(), "SSD");

        // No migrations, no overhead charged.
        assert_eq!(map.metrics().summary().migration_overhead_ns, 0);
    }

    #[tokio::test]
    async fn test_full_target_skips_and_retries_later() {
        // DRAM too small for the object; promotion must be skipped.
        let (map, migrator) = setup(5, 2, 512);
        map.put("k", vec![0u8; 1024]).await.unwrap();
        for _ in 0..6 {
            map.get("k").await.unwrap();
        }

        let report = migrator.scan_once().await;
        assert_eq!(report.migrated, 0);
        assert_eq!(report.skipped_full, 1);
        assert_eq!(map.tier_of("k").await.unwrap(), "SSD");
        assert_eq!(map.tiers().usage().await["SSD"], 1024);

        // The verdict stands next cycle too while DRAM stays full.
        let report = migrator.scan_once().await;
        assert_eq!(report.skipped_full, 1);
        assert_eq!(migrator.stats().skipped_full, 2);
    }

    #[tokio::test]
    async fn test_migration_overhead_recorded_only_when_data_moved() {
        let (map, migrator) = setup(5, 2, 16 * 1024 * 1024);
        map.put("k", vec![0u8; 1024]).await.unwrap();

        migrator.scan_once().await;
        assert_eq!(map.metrics().summary().migration_overhead_ns, 0);

        for _ in 0..5 {
            map.get("k").await.unwrap();
        }
        migrator.scan_once().await;
        assert!(map.metrics().summary().migration_overhead_ns > 0);
    }

    #[tokio::test]
    async fn test_run_loop_shuts_down_cooperatively() {
        let (map, migrator) = setup(100, 20, 16 * 1024 * 1024);
        map.put("k", vec![0u8; 64]).await.unwrap();
        let migrator = Arc::new(migrator);

        let task = {
            let migrator = Arc::clone(&migrator);
            tokio::spawn(async move { migrator.run().await })
        };

        tokio::time::sleep(Duration::from_millis(250)).await;
        migrator.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("migrator failed to stop in time")
            .unwrap();

        // The interval fired at least once while the loop ran.
        assert!(migrator.stats().scans >= 1);
    }
}
