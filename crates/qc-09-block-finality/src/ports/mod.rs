//! Ports module for the Finality subsystem

pub mod inbound;
pub mod outbound;

pub use inbound::FinalizationApi;
pub use outbound::{KeyValueStore, KvPiece, PieceOpener, ThresholdSigner};
