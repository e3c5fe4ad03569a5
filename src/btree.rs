//! Ordered tier-aware store.
//!
//! Same placement, locking, and cost model as [`TieredMap`](crate::map::TieredMap),
//! but keys are kept in order so ranges can be scanned. The background
//! migrator does not rebalance this structure; objects move only when
//! rewritten.

use crate::error::Result;
use crate::lock::TierSet;
use crate::map::{read_object, write_object, SlotRef, StoredObject};
use crate::metrics::{now_ns, MetricsRecorder};
use crate::policy::PlacementPolicy;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::ops::RangeBounds;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// An ordered keyed store spanning all tiers.
pub struct TieredBTree {
    tiers: Arc<TierSet>,
    policy: Arc<dyn PlacementPolicy>,
    metrics: Arc<MetricsRecorder>,
    entries: RwLock<BTreeMap<String, SlotRef>>,
}

impl TieredBTree {
    pub fn new(
        tiers: Arc<TierSet>,
        policy: Arc<dyn PlacementPolicy>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            tiers,
            policy,
            metrics,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn tiers(&self) -> &Arc<TierSet> {
        &self.tiers
    }

    /// Inserts a value, placing it on the tier the policy picks.
    pub async fn insert(&self, key: &str, value: impl Into<Bytes>) -> Result<()> {
        let start = now_ns();
        let slot = self.slot_or_insert(key).await;
        let mut obj = slot.lock().await;
        write_object(
            &self.tiers,
            self.policy.as_ref(),
            &self.metrics,
            &mut obj,
            value.into(),
            None,
        )
        .await?;
        drop(obj);
        self.metrics.record("btree_insert", start, now_ns());
        Ok(())
    }

    /// Point lookup, charging a read on the key's current tier.
    pub async fn search(&self, key: &str) -> Result<Option<Bytes>> {
        let start = now_ns();
        let slot = {
            let entries = self.entries.read().await;
            entries.get(key).cloned()
        };
        let Some(slot) = slot else {
            return Ok(None);
        };

        let mut obj = slot.lock().await;
        let value = read_object(&self.tiers, &self.metrics, &mut obj).await?;
        drop(obj);

        if value.is_some() {
            self.metrics.record("btree_search", start, now_ns());
        }
        Ok(value)
    }

    /// In-order scan of a key range, charging a read per visited object.
    pub async fn scan<R>(&self, range: R) -> Result<Vec<(String, Bytes)>>
    where
        R: RangeBounds<String>,
    {
        let start = now_ns();
        let snapshot: Vec<(String, SlotRef)> = {
            let entries = self.entries.read().await;
            entries
                .range(range)
                .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
                .collect()
        };

        let mut results = Vec::with_capacity(snapshot.len());
        for (key, slot) in snapshot {
            let mut obj = slot.lock().await;
            if let Some(value) = read_object(&self.tiers, &self.metrics, &mut obj).await? {
                results.push((key, value));
            }
        }

        self.metrics.record("btree_scan", start, now_ns());
        Ok(results)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn slot_or_insert(&self, key: &str) -> SlotRef {
        {
            let entries = self.entries.read().await;
            if let Some(slot) = entries.get(key) {
                return Arc::clone(slot);
            }
        }
        let mut entries = self.entries.write().await;
        Arc::clone(
            entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(StoredObject::vacant()))),
        )
    }
}
