//! Configuration for the simulator.

use crate::error::{Result, TierSimError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Configuration for a single storage tier.
///
/// Immutable once the simulation is constructed. The compression fields model
/// tiers that transparently compress resident data (memory-side compression on
/// CXL expanders and the like): a ratio below 1.0 shrinks the capacity
/// footprint and charges the extra (de)compression latency on every access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Tier name, unique within a simulation.
    pub name: String,
    /// Usable capacity in bytes.
    pub capacity_bytes: u64,
    /// Fixed per-access latency in nanoseconds.
    pub base_latency_ns: u64,
    /// Sustained bandwidth in bytes per second.
    pub bandwidth_bytes_per_s: u64,
    /// Stored-footprint multiplier; values below 1.0 mean the tier compresses.
    #[serde(default = "default_compression_ratio")]
    pub compression_ratio: f64,
    /// Extra access latency on tiers that expand data (ratio above 1.0).
    #[serde(default)]
    pub compress_latency_ns: u64,
    /// Extra access latency on tiers that compress data (ratio below 1.0).
    #[serde(default)]
    pub decompress_latency_ns: u64,
}

fn default_compression_ratio() -> f64 {
    1.0
}

impl TierConfig {
    /// Creates a tier config with no compression.
    pub fn new(
        name: impl Into<String>,
        capacity_bytes: u64,
        base_latency_ns: u64,
        bandwidth_bytes_per_s: u64,
    ) -> Self {
        Self {
            name: name.into(),
            capacity_bytes,
            base_latency_ns,
            bandwidth_bytes_per_s,
            compression_ratio: 1.0,
            compress_latency_ns: 0,
            decompress_latency_ns: 0,
        }
    }

    /// Sets the compression ratio and the latencies it costs.
    pub fn with_compression(
        mut self,
        ratio: f64,
        compress_latency_ns: u64,
        decompress_latency_ns: u64,
    ) -> Self {
        self.compression_ratio = ratio;
        self.compress_latency_ns = compress_latency_ns;
        self.decompress_latency_ns = decompress_latency_ns;
        self
    }
}

/// Thresholds for the hot/warm/cold placement policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Access count at which an object counts as hot.
    pub hot_threshold: u64,
    /// Access count at which an object counts as warm.
    pub warm_threshold: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            hot_threshold: 100,
            warm_threshold: 20,
        }
    }
}

/// Background migration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigratorConfig {
    /// How often the migrator re-evaluates placement for stored objects.
    #[serde(with = "humantime_serde")]
    pub scan_interval: Duration,
    /// Upper bound on waiting for the migrator task to finish at shutdown.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

/// Spin/backoff behavior for tier lock acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Pause between immediate retry attempts, in nanoseconds.
    pub spin_ns: u64,
    /// Base backoff, scaled per tier by its media weight, in nanoseconds.
    pub backoff_ns: u64,
    /// Retry attempts before falling back to a fair blocking acquire.
    pub max_spins: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            spin_ns: 1_000,
            backoff_ns: 10_000,
            max_spins: 3,
        }
    }
}

/// Top-level simulator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// The storage tiers, fastest to slowest by convention.
    pub tiers: Vec<TierConfig>,
    /// Placement policy thresholds.
    pub policy: PolicyConfig,
    /// Background migration settings.
    pub migrator: MigratorConfig,
    /// Tier lock backoff settings.
    pub backoff: BackoffConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tiers: default_tier_catalog(),
            policy: PolicyConfig::default(),
            migrator: MigratorConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TierSimError::Config(format!("failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| TierSimError::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.tiers.is_empty() {
            return Err(TierSimError::InvalidConfig {
                field: "tiers".to_string(),
                reason: "at least one tier is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for tier in &self.tiers {
            if tier.name.is_empty() {
                return Err(TierSimError::InvalidConfig {
                    field: "tiers.name".to_string(),
                    reason: "tier names must be non-empty".to_string(),
                });
            }
            if !seen.insert(tier.name.as_str()) {
                return Err(TierSimError::InvalidConfig {
                    field: "tiers.name".to_string(),
                    reason: format!("duplicate tier name: {}", tier.name),
                });
            }
            if tier.capacity_bytes == 0 {
                return Err(TierSimError::InvalidConfig {
                    field: format!("tiers.{}.capacity_bytes", tier.name),
                    reason: "capacity must be non-zero".to_string(),
                });
            }
            if tier.bandwidth_bytes_per_s == 0 {
                return Err(TierSimError::InvalidConfig {
                    field: format!("tiers.{}.bandwidth_bytes_per_s", tier.name),
                    reason: "bandwidth must be non-zero".to_string(),
                });
            }
            if !(tier.compression_ratio.is_finite() && tier.compression_ratio > 0.0) {
                return Err(TierSimError::InvalidConfig {
                    field: format!("tiers.{}.compression_ratio", tier.name),
                    reason: "compression ratio must be a positive finite number".to_string(),
                });
            }
        }

        if self.policy.hot_threshold <= self.policy.warm_threshold {
            return Err(TierSimError::InvalidConfig {
                field: "policy.hot_threshold".to_string(),
                reason: "hot threshold must exceed warm threshold".to_string(),
            });
        }

        if self.migrator.scan_interval.is_zero() {
            return Err(TierSimError::InvalidConfig {
                field: "migrator.scan_interval".to_string(),
                reason: "scan interval must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}

/// The default five-tier memory/storage hierarchy.
///
/// Latencies are approximate for current hardware; the CXL tier models
/// memory-side compression with a 2:1 ratio.
pub fn default_tier_catalog() -> Vec<TierConfig> {
    vec![
        TierConfig::new("L3Cache", 256 * 1024 * 1024, 30, 200_000_000_000),
        TierConfig::new("DRAM", 16 * 1024 * 1024 * 1024, 80, 50_000_000_000),
        TierConfig::new("CXL", 64 * 1024 * 1024 * 1024, 200, 25_000_000_000)
            .with_compression(0.5, 800, 500),
        TierConfig::new("SSD", 1024u64.pow(4), 100_000, 2_000_000_000),
        TierConfig::new("HDD", 8 * 1024u64.pow(4), 3_000_000, 200_000_000),
    ]
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(us) = s.strip_suffix("us") {
            us.parse::<u64>()
                .map(Duration::from_micros)
                .map_err(|e| e.to_string())
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|v| Duration::from_secs(v * 60))
                .map_err(|e| e.to_string())
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }
}
