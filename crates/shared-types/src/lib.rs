//! # Shared Types Crate
//!
//! Identifiers and chain entities shared across the block agreement
//! subsystems.
//!
//! ## Design Principles
//!
//! - **Typed identities**: heights and proposer indices are newtypes, never raw
//!   integers, so an `AgreementKey` cannot be built with its fields swapped.
//! - **Index zero is reserved**: `ProposerIndex::DEFAULT_BLOCK` marks the empty
//!   block chosen when no proposer wins.
//! - **No ambient globals**: cancellation is an explicit `ShutdownSignal`
//!   handed to whoever needs it.

pub mod entities;
pub mod errors;
pub mod shutdown;

pub use entities::*;
pub use errors::*;
pub use shutdown::ShutdownSignal;
