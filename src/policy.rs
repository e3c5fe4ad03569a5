//! Placement policies: mapping access statistics to tier names.

use crate::config::PolicyConfig;
use serde::{Deserialize, Serialize};

/// Canonical tier names used by the built-in policies.
pub const L3_CACHE: &str = "L3Cache";
pub const DRAM: &str = "DRAM";
pub const CXL: &str = "CXL";
pub const SSD: &str = "SSD";
pub const HDD: &str = "HDD";

/// Objects below this size stay on SSD when cold; larger ones go to HDD.
const COLD_SIZE_CUTOFF: u64 = 4 * 1024 * 1024;

/// Warm objects compressing at least this well are worth the CXL tier.
const CXL_COMPRESSION_CUTOFF: f64 = 0.7;

/// Per-object access statistics driving placement decisions.
///
/// One record per key, created on first write and mutated on every access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStats {
    /// Current value size in bytes.
    pub size_bytes: u64,
    /// Lifetime access count (reads and writes).
    pub access_count: u64,
    /// Latency charged by the most recent access.
    pub last_latency_ns: u64,
    /// Expected compressed-size ratio for this object's data.
    pub compression_ratio_hint: f64,
}

impl ObjectStats {
    pub fn new(size_bytes: u64) -> Self {
        Self {
            size_bytes,
            access_count: 0,
            last_latency_ns: 0,
            compression_ratio_hint: 1.0,
        }
    }
}

/// Decides which tier should hold an object given its access statistics.
///
/// Implementations must be pure: identical stats always yield the same tier,
/// so the foreground path and the migrator can evaluate concurrently and
/// reach the same verdict.
pub trait PlacementPolicy: Send + Sync {
    fn choose_tier(&self, stats: &ObjectStats) -> &str;
}

/// The default access-frequency policy.
///
/// Hot objects go to DRAM; warm objects go to CXL when their data compresses
/// well enough to be worth the extra latency, otherwise DRAM; cold objects go
/// to SSD or, above [`COLD_SIZE_CUTOFF`], HDD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotWarmCold {
    pub hot_threshold: u64,
    pub warm_threshold: u64,
}

impl HotWarmCold {
    pub fn new(hot_threshold: u64, warm_threshold: u64) -> Self {
        Self {
            hot_threshold,
            warm_threshold,
        }
    }
}

impl Default for HotWarmCold {
    fn default() -> Self {
        Self {
            hot_threshold: 100,
            warm_threshold: 20,
        }
    }
}

impl From<&PolicyConfig> for HotWarmCold {
    fn from(config: &PolicyConfig) -> Self {
        Self {
            hot_threshold: config.hot_threshold,
            warm_threshold: config.warm_threshold,
        }
    }
}

impl PlacementPolicy for HotWarmCold {
    fn choose_tier(&self, stats: &ObjectStats) -> &str {
        if stats.access_count >= self.hot_threshold {
            return DRAM;
        }
        if stats.access_count >= self.warm_threshold {
            return if stats.compression_ratio_hint <= CXL_COMPRESSION_CUTOFF {
                CXL
            } else {
                DRAM
            };
        }
        if stats.size_bytes < COLD_SIZE_CUTOFF {
            SSD
        } else {
            HDD
        }
    }
}
