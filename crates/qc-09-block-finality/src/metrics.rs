//! # Finality Metrics
//!
//! Prometheus metrics for the finalization handoff.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! qc-09-block-finality = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `finality_shares_accepted_total` - Counter of verified, stored shares
//! - `finality_shares_rejected_total` - Counter of rejected shares (by reason)
//! - `finality_thresholds_met_total` - Counter of heights whose signature merged
//! - `finality_store_rotations_total` - Counter of rotating store piece rotations

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_counter_vec, register_int_counter, CounterVec, IntCounter};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Total shares accepted
    pub static ref SHARES_ACCEPTED: IntCounter = register_int_counter!(
        "finality_shares_accepted_total",
        "Total number of signature shares verified and stored"
    )
    .expect("Failed to create SHARES_ACCEPTED metric");

    /// Total shares rejected, labeled by reason
    pub static ref SHARES_REJECTED: CounterVec = register_counter_vec!(
        "finality_shares_rejected_total",
        "Total number of signature shares rejected",
        &["reason"]
    )
    .expect("Failed to create SHARES_REJECTED metric");

    /// Total heights whose threshold was met
    pub static ref THRESHOLDS_MET: IntCounter = register_int_counter!(
        "finality_thresholds_met_total",
        "Total number of heights whose signature shares merged"
    )
    .expect("Failed to create THRESHOLDS_MET metric");

    /// Total rotating store rotations
    pub static ref STORE_ROTATIONS: IntCounter = register_int_counter!(
        "finality_store_rotations_total",
        "Total number of rotating store piece rotations"
    )
    .expect("Failed to create STORE_ROTATIONS metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

#[cfg(feature = "metrics")]
pub fn record_share_accepted() {
    SHARES_ACCEPTED.inc();
}

/// Record share rejected with reason
#[cfg(feature = "metrics")]
pub fn record_share_rejected(reason: &str) {
    SHARES_REJECTED.with_label_values(&[reason]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_threshold_met() {
    THRESHOLDS_MET.inc();
}

#[cfg(feature = "metrics")]
pub fn record_store_rotation() {
    STORE_ROTATIONS.inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_share_accepted() {}

#[cfg(not(feature = "metrics"))]
pub fn record_share_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_threshold_met() {}

#[cfg(not(feature = "metrics"))]
pub fn record_store_rotation() {}
