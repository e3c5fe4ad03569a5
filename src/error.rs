//! Error types for the tiersim simulator.
//!
//! All fallible operations return [`Result`], built on the unified
//! [`TierSimError`] type.
//!
//! # Error Categories
//!
//! - **Capacity**: a tier cannot fit an object's footprint. Non-fatal; a failed
//!   `put` surfaces the error to the caller and a migration skips the key until
//!   the next scan.
//! - **Lookup**: unknown tier names and missing objects.
//! - **Configuration**: invalid settings supplied at construction.
//!
//! A `get` on an absent key is *not* an error; it yields `Ok(None)`.

use thiserror::Error;

/// Main error type for simulator operations.
#[derive(Error, Debug)]
pub enum TierSimError {
    /// A tier's capacity would be exceeded by a placement.
    #[error("tier {tier} out of capacity: need {requested} bytes, {available} available")]
    CapacityExceeded {
        tier: String,
        requested: u64,
        available: u64,
    },

    #[error("unknown tier: {0}")]
    UnknownTier(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TierSimError {
    /// Check if the error is transient and the operation may succeed later.
    ///
    /// Capacity pressure can clear once the migrator demotes colder objects,
    /// so `CapacityExceeded` is worth retrying on a later cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TierSimError::CapacityExceeded { .. })
    }
}

/// Result type alias for simulator operations.
pub type Result<T> = std::result::Result<T, TierSimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_retryable() {
        let err = TierSimError::CapacityExceeded {
            tier: "DRAM".to_string(),
            requested: 4096,
            available: 1024,
        };
        assert!(err.is_retryable());
        assert!(!TierSimError::UnknownTier("PMEM".to_string()).is_retryable());
    }

    #[test]
    fn test_display_includes_tier() {
        let err = TierSimError::CapacityExceeded {
            tier: "SSD".to_string(),
            requested: 10,
            available: 0,
        };
        assert!(err.to_string().contains("SSD"));
    }
}
