//! Domain layer for the Block Consensus subsystem
//!
//! - binary_agreement: per-proposer binary Byzantine agreement
//! - decision: child decisions, decision sets, block decisions
//! - decision_rule: normal and optimized block decision rules
//! - history: LRU-bounded per-height state
//! - messages: closed message union routed by the coordinator

mod binary_agreement;
mod config;
mod decision;
mod decision_rule;
mod error;
mod history;
mod messages;
mod proposal;

pub use binary_agreement::*;
pub use config::*;
pub use decision::*;
pub use decision_rule::*;
pub use error::*;
pub use history::*;
pub use messages::*;
pub use proposal::*;
