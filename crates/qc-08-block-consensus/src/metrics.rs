//! # Consensus Metrics
//!
//! Prometheus metrics for monitoring block agreement.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! qc-08-block-consensus = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `consensus_blocks_decided_total` - Counter of decided heights (by kind)
//! - `consensus_child_decisions_total` - Counter of recorded child decisions (by value)
//! - `consensus_messages_dropped_total` - Counter of dropped messages (by reason)
//! - `consensus_fast_path_heights_total` - Counter of heights started on the fast path
//! - `consensus_blocks_finalized_total` - Counter of blocks handed to the chain

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_counter_vec, register_int_counter, CounterVec, IntCounter};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Total heights decided, labeled `winner` or `default`
    pub static ref BLOCKS_DECIDED: CounterVec = register_counter_vec!(
        "consensus_blocks_decided_total",
        "Total number of heights decided",
        &["kind"]
    )
    .expect("Failed to create BLOCKS_DECIDED metric");

    /// Total child decisions recorded, labeled by value
    pub static ref CHILD_DECISIONS: CounterVec = register_counter_vec!(
        "consensus_child_decisions_total",
        "Total number of child agreement decisions recorded",
        &["value"]
    )
    .expect("Failed to create CHILD_DECISIONS metric");

    /// Total messages dropped, labeled by reason
    pub static ref MESSAGES_DROPPED: CounterVec = register_counter_vec!(
        "consensus_messages_dropped_total",
        "Total number of consensus messages dropped",
        &["reason"]
    )
    .expect("Failed to create MESSAGES_DROPPED metric");

    /// Total heights started on the leader fast path
    pub static ref FAST_PATH_HEIGHTS: IntCounter = register_int_counter!(
        "consensus_fast_path_heights_total",
        "Total number of heights started on the fast path"
    )
    .expect("Failed to create FAST_PATH_HEIGHTS metric");

    /// Total blocks handed to the chain with a merged signature
    pub static ref BLOCKS_FINALIZED: IntCounter = register_int_counter!(
        "consensus_blocks_finalized_total",
        "Total number of blocks finalized"
    )
    .expect("Failed to create BLOCKS_FINALIZED metric");
}

/// Record a block decision
#[cfg(feature = "metrics")]
pub fn record_block_decided(default_block: bool) {
    let kind = if default_block { "default" } else { "winner" };
    BLOCKS_DECIDED.with_label_values(&[kind]).inc();
}

/// Record a child decision
#[cfg(feature = "metrics")]
pub fn record_child_decision(value: bool) {
    let value = if value { "true" } else { "false" };
    CHILD_DECISIONS.with_label_values(&[value]).inc();
}

/// Record a dropped message with reason
#[cfg(feature = "metrics")]
pub fn record_message_dropped(reason: &str) {
    MESSAGES_DROPPED.with_label_values(&[reason]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_fast_path_height() {
    FAST_PATH_HEIGHTS.inc();
}

#[cfg(feature = "metrics")]
pub fn record_block_finalized() {
    BLOCKS_FINALIZED.inc();
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_block_decided(_default_block: bool) {}

#[cfg(not(feature = "metrics"))]
pub fn record_child_decision(_value: bool) {}

#[cfg(not(feature = "metrics"))]
pub fn record_message_dropped(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_fast_path_height() {}

#[cfg(not(feature = "metrics"))]
pub fn record_block_finalized() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_noop_when_disabled() {
        // These should compile and run without panic even without metrics feature
        record_block_decided(true);
        record_block_decided(false);
        record_child_decision(true);
        record_message_dropped("test");
        record_fast_path_height();
        record_block_finalized();
    }
}
