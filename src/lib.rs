//! tiersim - a concurrent tiered-storage simulator.
//!
//! tiersim models a keyed store spread across a hierarchy of storage tiers
//! (CPU cache through spinning disk). Objects are placed by an access-driven
//! policy, charged the latency/bandwidth/compression cost of whichever medium
//! holds them, and relocated by a background migrator as their access
//! patterns change. No real I/O happens; the point is to study placement
//! policies and tier contention with faithful cost accounting.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Simulator                          │
//! ├──────────────────────────────────────────────────────────┤
//! │  Workloads: sequential | random | hotspot                 │
//! ├──────────────────────────────────────────────────────────┤
//! │  Stores: TieredMap | TieredBTree     Migrator (background)│
//! ├──────────────────────────────────────────────────────────┤
//! │  PlacementPolicy | TierSet + TierAwareLock | Metrics      │
//! ├──────────────────────────────────────────────────────────┤
//! │  Tiers: L3Cache | DRAM | CXL | SSD | HDD                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use tiersim::config::SimConfig;
//! use tiersim::simulator::Simulator;
//!
//! #[tokio::main]
//! async fn main() -> tiersim::Result<()> {
//!     let sim = Simulator::new(SimConfig::default())?;
//!     sim.start();
//!
//!     sim.workload_hotspot(10_000, 4096, 0.2, 0.8, 42).await?;
//!
//!     sim.stop().await;
//!     println!("{:#?}", sim.summary());
//!     Ok(())
//! }
//! ```

pub mod btree;
pub mod config;
pub mod error;
pub mod lock;
pub mod map;
pub mod metrics;
pub mod migrator;
pub mod policy;
pub mod simulator;
pub mod tier;

pub use config::SimConfig;
pub use error::{Result, TierSimError};
pub use map::TieredMap;
pub use metrics::{MetricsRecorder, MetricsSummary};
pub use migrator::Migrator;
pub use policy::{HotWarmCold, ObjectStats, PlacementPolicy};
pub use simulator::Simulator;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with an env-filter, falling back to `default_filter`
/// when `RUST_LOG` is unset. Safe to call more than once; later calls are
/// no-ops.
pub fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
