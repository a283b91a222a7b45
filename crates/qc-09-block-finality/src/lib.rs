//! # qc-09-block-finality
//!
//! Finalization handoff for decided blocks.
//!
//! ## Overview
//!
//! Once the block agreement decides a height, every node signs the decision
//! with its threshold key share and broadcasts the share. This subsystem:
//! - **Signs** the local share for a decided `(height, proposer)`
//! - **Verifies and stores** shares received from peers (memory + durable store)
//! - **Merges** shares into an aggregate signature once the threshold is met
//! - **Reports the threshold exactly once per height**, so the block is handed
//!   to the chain for commit a single time
//!
//! ## Architecture
//!
//! ```text
//! Block Consensus (8) ──sign_local_share──→ Finality (9) ──ThresholdMet──→ Chain commit
//!         │                                     ↑
//!         └──BlockSignBroadcast──→ peers ───────┘ check_and_save_share
//! ```
//!
//! ## Storage
//!
//! Shares and merged signatures are written through the [`KeyValueStore`] port.
//! The bundled [`RotatingKvStore`] bounds the size of any single backing piece:
//! writes go to the newest piece, reads search newest to oldest, and the oldest
//! piece is dropped when a new one is opened.
//!
//! ## Example
//!
//! ```rust,ignore
//! use qc_09_block_finality::{FinalizationService, FinalityConfig, RotatingMemoryStore};
//!
//! let service = FinalizationService::new(FinalityConfig::default(), store, signer);
//! if let ShareOutcome::ThresholdMet(signature) = service.check_and_save_share(share)? {
//!     chain.finalize_decided_and_signed_block(height, proposer, signature);
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod types;

pub use adapters::{
    HashThresholdSigner, MemoryPiece, MemoryPieceOpener, RotatingKvStore, RotatingMemoryStore,
};
pub use domain::{block_signing_message, AggregateSignature, ShareOutcome, SigShare, SigShareDb};
pub use error::{FinalityError, FinalityResult};
pub use ports::inbound::FinalizationApi;
pub use ports::outbound::{KeyValueStore, KvPiece, PieceOpener, ThresholdSigner};
pub use service::FinalizationService;
pub use types::{FinalityConfig, RotatingStoreConfig};
