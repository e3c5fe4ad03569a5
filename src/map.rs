//! The concurrent tier-aware keyed store.
//!
//! [`TieredMap`] coordinates the placement policy, the per-tier locks, and
//! the metrics recorder. Each key owns a slot behind its own async mutex;
//! the slot's tier label can only change while that mutex is held, which
//! makes lookup and tier access atomic with respect to concurrent
//! migrations. Lock order is always key slot first, then tier lock(s) in
//! lexical name order; slot mutexes are never nested.

use crate::error::Result;
use crate::lock::TierSet;
use crate::metrics::{now_ns, MetricsRecorder};
use crate::policy::{ObjectStats, PlacementPolicy};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// A stored object: its value, current tier, and access statistics.
///
/// `tier` is `None` only while a first put is still in flight or has failed
/// on capacity; such slots hold no value and are invisible to readers and to
/// the migrator.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub tier: Option<String>,
    pub value: Bytes,
    pub stats: ObjectStats,
}

impl StoredObject {
    pub(crate) fn vacant() -> Self {
        Self {
            tier: None,
            value: Bytes::new(),
            stats: ObjectStats::new(0),
        }
    }
}

/// Shared handle to one key's slot.
pub type SlotRef = Arc<Mutex<StoredObject>>;

/// The concurrent keyed store spanning all tiers.
pub struct TieredMap {
    tiers: Arc<TierSet>,
    policy: Arc<dyn PlacementPolicy>,
    metrics: Arc<MetricsRecorder>,
    slots: RwLock<HashMap<String, SlotRef>>,
}

impl TieredMap {
    pub fn new(
        tiers: Arc<TierSet>,
        policy: Arc<dyn PlacementPolicy>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            tiers,
            policy,
            metrics,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn tiers(&self) -> &Arc<TierSet> {
        &self.tiers
    }

    pub fn policy(&self) -> &Arc<dyn PlacementPolicy> {
        &self.policy
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Stores a value under a key, placing it on the tier the policy picks
    /// for the object's current statistics.
    ///
    /// Fails with `CapacityExceeded` when the chosen tier cannot fit the
    /// object; there is no fallback tier, and a failed put leaves any prior
    /// placement of the key untouched.
    pub async fn put(&self, key: &str, value: impl Into<Bytes>) -> Result<()> {
        self.put_inner(key, value.into(), None).await
    }

    /// Like [`put`](Self::put), also recording how well the object's data is
    /// expected to compress (feeds the policy's compressed-tier choice).
    pub async fn put_with_hint(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        compression_ratio_hint: f64,
    ) -> Result<()> {
        self.put_inner(key, value.into(), Some(compression_ratio_hint))
            .await
    }

    async fn put_inner(&self, key: &str, value: Bytes, hint: Option<f64>) -> Result<()> {
        let start = now_ns();
        let slot = self.slot_or_insert(key).await;
        let mut obj = slot.lock().await;
        write_object(
            &self.tiers,
            self.policy.as_ref(),
            &self.metrics,
            &mut obj,
            value,
            hint,
        )
        .await?;
        drop(obj);
        self.metrics.record("put", start, now_ns());
        Ok(())
    }

    /// Fetches a value, charging a read access on the key's current tier.
    ///
    /// An absent key is a miss, not an error.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let start = now_ns();
        let slot = {
            let slots = self.slots.read().await;
            slots.get(key).cloned()
        };
        let Some(slot) = slot else {
            return Ok(None);
        };

        let mut obj = slot.lock().await;
        let value = read_object(&self.tiers, &self.metrics, &mut obj).await?;
        drop(obj);

        if value.is_some() {
            self.metrics.record("get", start, now_ns());
        }
        Ok(value)
    }

    /// The tier currently holding a key, if the key is stored.
    pub async fn tier_of(&self, key: &str) -> Option<String> {
        let slot = {
            let slots = self.slots.read().await;
            slots.get(key).cloned()
        }?;
        let obj = slot.lock().await;
        obj.tier.clone()
    }

    /// A copy of a key's access statistics, if the key is stored.
    pub async fn stats_of(&self, key: &str) -> Option<ObjectStats> {
        let slot = {
            let slots = self.slots.read().await;
            slots.get(key).cloned()
        }?;
        let obj = slot.lock().await;
        obj.tier.as_ref().map(|_| obj.stats.clone())
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.tier_of(key).await.is_some()
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    /// Point-in-time list of `(key, slot)` pairs for background scans.
    pub async fn snapshot(&self) -> Vec<(String, SlotRef)> {
        let slots = self.slots.read().await;
        slots
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect()
    }

    async fn slot_or_insert(&self, key: &str) -> SlotRef {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(key) {
                return Arc::clone(slot);
            }
        }
        let mut slots = self.slots.write().await;
        Arc::clone(
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(StoredObject::vacant()))),
        )
    }
}

/// Places a value into a slot, charging the write on the chosen tier.
///
/// Caller holds the slot's mutex. Capacity failures leave the slot and all
/// tier accounting exactly as they were.
pub(crate) async fn write_object(
    tiers: &TierSet,
    policy: &dyn PlacementPolicy,
    metrics: &MetricsRecorder,
    obj: &mut StoredObject,
    value: Bytes,
    hint: Option<f64>,
) -> Result<()> {
    let old_size = obj.stats.size_bytes;
    let mut stats = obj.stats.clone();
    stats.size_bytes = value.len() as u64;
    if let Some(hint) = hint {
        stats.compression_ratio_hint = hint;
    }
    let size = stats.size_bytes;
    let target = policy.choose_tier(&stats).to_string();

    let (footprint, latency) = match obj.tier.as_deref() {
        // First placement of this key.
        None => {
            let mut tier = tiers.get(&target)?.acquire().await;
            let footprint = tier.place(size)?;
            let latency = tier.access(size, true).await;
            (footprint, latency)
        }
        // Overwrite in place on the same tier.
        Some(current) if current == target => {
            let mut tier = tiers.get(&target)?.acquire().await;
            let footprint = tier.replace(old_size, size)?;
            let latency = tier.access(size, true).await;
            (footprint, latency)
        }
        // The rewrite moves the key; place on the new tier before releasing
        // the old footprint so the object is never unaccounted.
        Some(current) => {
            let current = current.to_string();
            let (mut old_tier, mut new_tier) = tiers.acquire_pair(&current, &target).await?;
            let footprint = new_tier.place(size)?;
            old_tier.remove(old_size);
            drop(old_tier);
            let latency = new_tier.access(size, true).await;
            debug!(from = %current, to = %target, "rewrite moved object");
            (footprint, latency)
        }
    };

    stats.access_count += 1;
    stats.last_latency_ns = latency;
    obj.stats = stats;
    obj.tier = Some(target.clone());
    obj.value = value;

    metrics.record_tier_access(&target, size);
    metrics.record_compression_savings(&target, size, footprint);
    Ok(())
}

/// Reads a slot's value, charging the read on its current tier.
///
/// Caller holds the slot's mutex. Returns `None` for slots that were never
/// successfully placed.
pub(crate) async fn read_object(
    tiers: &TierSet,
    metrics: &MetricsRecorder,
    obj: &mut StoredObject,
) -> Result<Option<Bytes>> {
    let Some(tier_name) = obj.tier.clone() else {
        return Ok(None);
    };
    let size = obj.stats.size_bytes;

    let tier = tiers.get(&tier_name)?.acquire().await;
    let latency = tier.access(size, false).await;
    drop(tier);

    obj.stats.access_count += 1;
    obj.stats.last_latency_ns = latency;
    metrics.record_tier_access(&tier_name, size);
    Ok(Some(obj.value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackoffConfig, TierConfig};
    use crate::error::TierSimError;
    use crate::policy::HotWarmCold;

    fn fast_tiers() -> Vec<TierConfig> {
        vec![
            TierConfig::new("DRAM", 16 * 1024 * 1024, 80, 50_000_000_000),
            TierConfig::new("CXL", 64 * 1024 * 1024, 200, 25_000_000_000)
                .with_compression(0.5, 800, 500),
            TierConfig::new("SSD", 1024 * 1024 * 1024, 1_000, 2_000_000_000),
            TierConfig::new("HDD", 8 * 1024 * 1024 * 1024, 3_000, 200_000_000),
        ]
    }

    fn map_with(tiers: Vec<TierConfig>, hot: u64, warm: u64) -> TieredMap {
        let set = Arc::new(TierSet::new(tiers, &BackoffConfig::default()));
        let policy: Arc<dyn PlacementPolicy> = Arc::new(HotWarmCold::new(hot, warm));
        TieredMap::new(set, policy, Arc::new(MetricsRecorder::new()))
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let map = map_with(fast_tiers(), 100, 20);
        map.put("a", vec![7u8; 1024]).await.unwrap();

        let value = map.get("a").await.unwrap().unwrap();
        assert_eq!(value.as_ref(), &[7u8; 1024][..]);
        // Small cold object lands on SSD.
        assert_eq!(map.tier_of("a").await.unwrap(), "SSD");
    }

    #[tokio::test]
    async fn test_get_absent_key_is_a_miss() {
        let map = map_with(fast_tiers(), 100, 20);
        assert!(map.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repeated_get_only_bumps_access_count() {
        let map = map_with(fast_tiers(), 100, 20);
        map.put("a", vec![1u8, 2, 3]).await.unwrap();

        for _ in 0..5 {
            let value = map.get("a").await.unwrap().unwrap();
            assert_eq!(value.as_ref(), &[1u8, 2, 3][..]);
        }
        let stats = map.stats_of("a").await.unwrap();
        // One put plus five gets.
        assert_eq!(stats.access_count, 6);
        assert_eq!(stats.size_bytes, 3);
    }

    #[tokio::test]
    async fn test_failed_put_is_observable_and_leaves_nothing() {
        let mut tiers = fast_tiers();
        tiers.retain(|t| t.name != "SSD");
        tiers.push(TierConfig::new("SSD", 512, 1_000, 2_000_000_000));
        let map = map_with(tiers, 100, 20);

        let err = map.put("big", vec![0u8; 1024]).await.unwrap_err();
        assert!(matches!(err, TierSimError::CapacityExceeded { .. }));
        assert!(map.get("big").await.unwrap().is_none());
        assert!(!map.contains_key("big").await);
        assert_eq!(map.tiers().usage().await["SSD"], 0);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_leak_capacity() {
        let map = map_with(fast_tiers(), 100, 20);
        for _ in 0..10 {
            map.put("a", vec![0u8; 1024]).await.unwrap();
        }
        assert_eq!(map.tiers().usage().await["SSD"], 1024);
    }

    #[tokio::test]
    async fn test_overwrite_can_move_tiers() {
        let map = map_with(fast_tiers(), 2, 1);
        // First put: cold, lands on SSD.
        map.put("a", vec![0u8; 1024]).await.unwrap();
        assert_eq!(map.tier_of("a").await.unwrap(), "SSD");

        // Second put sees access_count 1 (warm) and moves the object.
        map.put("a", vec![0u8; 2048]).await.unwrap();
        assert_eq!(map.tier_of("a").await.unwrap(), "DRAM");

        let usage = map.tiers().usage().await;
        assert_eq!(usage["SSD"], 0);
        assert_eq!(usage["DRAM"], 2048);
    }

    #[tokio::test]
    async fn test_compression_hint_routes_warm_objects_to_cxl() {
        let map = map_with(fast_tiers(), 100, 1);
        map.put_with_hint("a", vec![0u8; 1024], 0.5).await.unwrap();
        // access_count 1 on the second put: warm, compressible, so CXL.
        map.put_with_hint("a", vec![0u8; 1024], 0.5).await.unwrap();

        assert_eq!(map.tier_of("a").await.unwrap(), "CXL");
        let usage = map.tiers().usage().await;
        // CXL stores the compressed footprint.
        assert_eq!(usage["CXL"], 512);

        let summary = map.metrics().summary();
        assert_eq!(summary.compression_savings_bytes["CXL"], 512);
    }

    #[tokio::test]
    async fn test_metrics_record_puts_and_gets() {
        let map = map_with(fast_tiers(), 100, 20);
        map.put("a", vec![0u8; 64]).await.unwrap();
        map.get("a").await.unwrap();
        map.get("missing").await.unwrap();

        let summary = map.metrics().summary();
        assert_eq!(summary.ops["put"].count, 1);
        assert_eq!(summary.ops["get"].count, 1);
        assert_eq!(summary.tier_utilization_bytes["SSD"], 128);
    }

    #[tokio::test]
    async fn test_large_cold_objects_go_to_hdd() {
        let map = map_with(fast_tiers(), 100, 20);
        map.put("big", vec![0u8; 4 * 1024 * 1024]).await.unwrap();
        assert_eq!(map.tier_of("big").await.unwrap(), "HDD");
    }
}
