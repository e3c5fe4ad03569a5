//! Tier model: capacity accounting and per-access cost simulation.
//!
//! A [`Tier`] stands in for one storage medium. It never performs real I/O;
//! instead every access charges the latency the configured medium would cost
//! and blocks the caller for that long. A tier lives inside its
//! [`TierAwareLock`](crate::lock::TierAwareLock) and is only reachable through
//! an acquired guard, so `used_bytes` is always mutated under the tier's lock.

use crate::config::TierConfig;
use crate::error::{Result, TierSimError};
use std::time::{Duration, Instant};
use tracing::trace;

/// tokio's timer rounds short sleeps up to a full tick, which would turn a
/// 30 ns cache hit into a millisecond; waits below this spin instead.
const SLEEP_FLOOR: Duration = Duration::from_millis(1);

/// One simulated storage medium with capacity accounting.
#[derive(Debug)]
pub struct Tier {
    config: TierConfig,
    used_bytes: u64,
}

impl Tier {
    /// Creates an empty tier from its config.
    pub fn new(config: TierConfig) -> Self {
        Self {
            config,
            used_bytes: 0,
        }
    }

    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Bytes currently accounted against this tier's capacity.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.config.capacity_bytes.saturating_sub(self.used_bytes)
    }

    /// Fraction of capacity in use, in `[0.0, 1.0]`.
    pub fn utilization(&self) -> f64 {
        self.used_bytes as f64 / self.config.capacity_bytes as f64
    }

    /// Capacity an object of `bytes` consumes on this tier, after compression.
    pub fn footprint(&self, bytes: u64) -> u64 {
        if self.config.compression_ratio < 1.0 {
            (bytes as f64 * self.config.compression_ratio) as u64
        } else {
            bytes
        }
    }

    /// Whether an object of `bytes` would fit right now.
    pub fn can_place(&self, bytes: u64) -> bool {
        self.used_bytes + self.footprint(bytes) <= self.config.capacity_bytes
    }

    /// Accounts an object's footprint against this tier.
    ///
    /// Returns the footprint on success. Capacity is rechecked here because
    /// `can_place` answers may go stale between the check and the acquire.
    pub fn place(&mut self, bytes: u64) -> Result<u64> {
        let footprint = self.footprint(bytes);
        if self.used_bytes + footprint > self.config.capacity_bytes {
            return Err(TierSimError::CapacityExceeded {
                tier: self.config.name.clone(),
                requested: footprint,
                available: self.remaining_bytes(),
            });
        }
        self.used_bytes += footprint;
        Ok(footprint)
    }

    /// Releases an object's footprint, floored at zero.
    pub fn remove(&mut self, bytes: u64) {
        self.used_bytes = self.used_bytes.saturating_sub(self.footprint(bytes));
    }

    /// Swaps one object's footprint for another in a single step.
    ///
    /// Used when a key is overwritten in place: the old footprint is released
    /// and the new one accounted atomically, so a rewrite that does not fit
    /// leaves the original placement untouched.
    pub fn replace(&mut self, old_bytes: u64, new_bytes: u64) -> Result<u64> {
        let old_footprint = self.footprint(old_bytes).min(self.used_bytes);
        let new_footprint = self.footprint(new_bytes);
        let remaining = self.used_bytes - old_footprint;
        if remaining + new_footprint > self.config.capacity_bytes {
            return Err(TierSimError::CapacityExceeded {
                tier: self.config.name.clone(),
                requested: new_footprint,
                available: self.config.capacity_bytes - remaining,
            });
        }
        self.used_bytes = remaining + new_footprint;
        Ok(new_footprint)
    }

    /// Nanoseconds one access of `bytes` costs on this medium.
    pub fn access_cost_ns(&self, bytes: u64) -> u64 {
        let mut total = self.config.base_latency_ns;
        if self.config.compression_ratio < 1.0 {
            total += self.config.decompress_latency_ns;
        } else if self.config.compression_ratio > 1.0 {
            total += self.config.compress_latency_ns;
        }
        if self.config.bandwidth_bytes_per_s > 0 {
            total += ((bytes as f64 / self.config.bandwidth_bytes_per_s as f64) * 1e9) as u64;
        }
        total
    }

    /// Simulates one access, blocking the caller for the medium's latency.
    ///
    /// Runs while the tier's lock is held, so concurrent accesses to one tier
    /// serialize: each tier models a single shared channel. Returns the
    /// charged nanoseconds.
    pub async fn access(&self, bytes: u64, write: bool) -> u64 {
        let total_ns = self.access_cost_ns(bytes);
        trace!(
            tier = %self.config.name,
            bytes,
            write,
            latency_ns = total_ns,
            "tier access"
        );
        simulate_delay(Duration::from_nanos(total_ns)).await;
        total_ns
    }
}

/// Blocks the caller for the simulated duration.
async fn simulate_delay(total: Duration) {
    if total >= SLEEP_FLOOR {
        tokio::time::sleep(total).await;
    } else if !total.is_zero() {
        let deadline = Instant::now() + total;
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}
