//! Per-tier locking with media-weighted backoff.
//!
//! Every tier has exactly one long-lived [`TierAwareLock`], owned by the
//! shared [`TierSet`] registry. Callers fetch the lock, never construct one,
//! so exclusion is real across every task touching the tier. Acquisition
//! spins briefly with a backoff scaled to the media speed (slow media back
//! off longer, keeping waiters from hammering a lock that will be held for
//! milliseconds), then falls back to a fair blocking acquire. Exclusion rests
//! entirely on the underlying mutex, never on the backoff timing.

use crate::config::{BackoffConfig, TierConfig};
use crate::error::{Result, TierSimError};
use crate::tier::Tier;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Exclusive access to a tier's state.
pub type TierGuard<'a> = MutexGuard<'a, Tier>;

/// Relative backoff multiplier for a tier name.
fn backoff_weight(name: &str) -> f64 {
    match name {
        "L3Cache" => 0.5,
        "DRAM" => 1.0,
        "CXL" => 2.0,
        "SSD" => 5.0,
        "HDD" => 10.0,
        _ => 1.0,
    }
}

/// Contention counters for one tier lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockStats {
    /// Successful acquisitions.
    pub acquisitions: u64,
    /// Failed immediate attempts that went through a backoff pause.
    pub contended: u64,
}

/// Mutual exclusion for one tier, with tier-weighted backoff.
#[derive(Debug)]
pub struct TierAwareLock {
    name: String,
    spin: Duration,
    backoff: Duration,
    max_spins: u32,
    inner: Mutex<Tier>,
    acquisitions: AtomicU64,
    contended: AtomicU64,
}

impl TierAwareLock {
    pub fn new(tier: Tier, backoff: &BackoffConfig) -> Self {
        let weight = backoff_weight(tier.name());
        Self {
            name: tier.name().to_string(),
            spin: Duration::from_nanos(backoff.spin_ns),
            backoff: Duration::from_nanos(backoff.backoff_ns).mul_f64(weight),
            max_spins: backoff.max_spins,
            inner: Mutex::new(tier),
            acquisitions: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks until the caller holds exclusive ownership of the tier.
    ///
    /// Ownership is released by dropping the returned guard, so a release by
    /// a non-owner cannot be expressed.
    pub async fn acquire(&self) -> TierGuard<'_> {
        for _ in 0..self.max_spins {
            if let Ok(guard) = self.inner.try_lock() {
                self.acquisitions.fetch_add(1, Ordering::Relaxed);
                return guard;
            }
            self.contended.fetch_add(1, Ordering::Relaxed);
            trace!(tier = %self.name, "lock contended, backing off");
            tokio::time::sleep(self.spin).await;
            tokio::time::sleep(self.backoff).await;
        }

        let guard = self.inner.lock().await;
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        guard
    }

    pub fn stats(&self) -> LockStats {
        LockStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
        }
    }
}

/// The shared one-lock-per-tier registry.
///
/// Constructed once per simulation; everything that touches a tier goes
/// through the same lock instance fetched from here.
#[derive(Debug)]
pub struct TierSet {
    tiers: HashMap<String, Arc<TierAwareLock>>,
}

impl TierSet {
    pub fn new(configs: Vec<TierConfig>, backoff: &BackoffConfig) -> Self {
        let tiers = configs
            .into_iter()
            .map(|cfg| {
                let name = cfg.name.clone();
                (name, Arc::new(TierAwareLock::new(Tier::new(cfg), backoff)))
            })
            .collect();
        Self { tiers }
    }

    pub fn get(&self, name: &str) -> Result<&Arc<TierAwareLock>> {
        self.tiers
            .get(name)
            .ok_or_else(|| TierSimError::UnknownTier(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tiers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tiers.keys().map(String::as_str).collect()
    }

    /// Acquires two distinct tiers' locks without risking deadlock.
    ///
    /// Locks are always taken in lexical name order no matter the argument
    /// order, so two migrations crossing the same tier pair in opposite
    /// directions cannot wait on each other. Guards come back in argument
    /// order.
    pub async fn acquire_pair(
        &self,
        first: &str,
        second: &str,
    ) -> Result<(TierGuard<'_>, TierGuard<'_>)> {
        if first == second {
            return Err(TierSimError::InvalidOperation(format!(
                "acquire_pair called with one tier twice: {}",
                first
            )));
        }
        let first_lock = self.get(first)?;
        let second_lock = self.get(second)?;
        if first <= second {
            let first_guard = first_lock.acquire().await;
            let second_guard = second_lock.acquire().await;
            Ok((first_guard, second_guard))
        } else {
            let second_guard = second_lock.acquire().await;
            let first_guard = first_lock.acquire().await;
            Ok((first_guard, second_guard))
        }
    }

    /// Point-in-time used bytes per tier.
    pub async fn usage(&self) -> HashMap<String, u64> {
        let mut usage = HashMap::with_capacity(self.tiers.len());
        for (name, lock) in &self.tiers {
            let tier = lock.acquire().await;
            usage.insert(name.clone(), tier.used_bytes());
        }
        usage
    }

    /// Contention counters for every tier lock.
    pub fn lock_stats(&self) -> HashMap<String, LockStats> {
        self.tiers
            .iter()
            .map(|(name, lock)| (name.clone(), lock.stats()))
            .collect()
    }
}
