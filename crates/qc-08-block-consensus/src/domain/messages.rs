//! # Consensus Messages
//!
//! Closed set of messages handled by the block consensus router. The router
//! matches on [`ConsensusMessage`] exhaustively; there is no dynamic
//! type inspection anywhere in the dispatch path.

use super::{BooleanProposalVector, ChildDecision};
use qc_09_block_finality::SigShare;
use serde::{Deserialize, Serialize};
use shared_types::{AgreementKey, Height, ProposerIndex};

/// Binary agreement round message kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundMessageKind {
    /// Binary-value broadcast
    BVal,
    /// Auxiliary vote for a value already in `bin_values`
    Aux,
}

/// One round message of a per-proposer binary agreement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryAgreementMessage {
    pub height: Height,
    /// Proposer whose block the agreement is about
    pub proposer: ProposerIndex,
    /// Node that sent the message
    pub sender: ProposerIndex,
    pub round: u64,
    pub kind: RoundMessageKind,
    pub value: bool,
    /// Sender clock, for latency diagnostics only
    pub sent_at_ms: u64,
}

impl BinaryAgreementMessage {
    pub fn key(&self) -> AgreementKey {
        AgreementKey {
            height: self.height,
            proposer: self.proposer,
        }
    }
}

/// Every message the coordinator routes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMessage {
    /// Start the per-proposer agreements for a height
    StartProposal {
        height: Height,
        proposals: BooleanProposalVector,
    },
    /// Signature share over a decided block
    BlockSignBroadcast { share: SigShare },
    /// Terminal decision reported by a child agreement
    ChildDecided(ChildDecision),
    /// Round message for one child agreement
    Round(BinaryAgreementMessage),
}

impl ConsensusMessage {
    pub fn height(&self) -> Height {
        match self {
            ConsensusMessage::StartProposal { height, .. } => *height,
            ConsensusMessage::BlockSignBroadcast { share } => share.height,
            ConsensusMessage::ChildDecided(decision) => decision.height,
            ConsensusMessage::Round(message) => message.height,
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ConsensusMessage::StartProposal { .. } => "start_proposal",
            ConsensusMessage::BlockSignBroadcast { .. } => "block_sign",
            ConsensusMessage::ChildDecided(_) => "child_decided",
            ConsensusMessage::Round(_) => "round",
        }
    }
}

/// Where a routed message came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageOrigin {
    /// A peer, via the network
    Network,
    /// A child agreement of this coordinator
    Child,
    /// The coordinator itself; never routed back into it
    Parent,
}

/// A message plus its origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub origin: MessageOrigin,
    pub message: ConsensusMessage,
}

impl MessageEnvelope {
    pub fn network(message: ConsensusMessage) -> Self {
        Self {
            origin: MessageOrigin::Network,
            message,
        }
    }

    pub fn child(decision: ChildDecision) -> Self {
        Self {
            origin: MessageOrigin::Child,
            message: ConsensusMessage::ChildDecided(decision),
        }
    }
}
