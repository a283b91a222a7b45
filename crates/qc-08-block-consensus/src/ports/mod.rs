//! Ports layer (Hexagonal Architecture)

pub mod inbound;
pub mod outbound;

pub use inbound::BlockConsensusApi;
pub use outbound::{ChainAccessor, NetworkBroadcaster, SystemTimeSource, TimeSource};
