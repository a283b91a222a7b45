//! Domain module for the Finality subsystem
//!
//! - sig_share: share and aggregate signature types, signing message
//! - sig_share_db: bounded in-memory share book with exactly-once merge flag

pub mod sig_share;
pub mod sig_share_db;

pub use sig_share::{block_signing_message, AggregateSignature, SigShare};
pub use sig_share_db::{InsertOutcome, ShareOutcome, SigShareDb};
