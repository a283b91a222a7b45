//! # In-Process Network Hub
//!
//! Connects the committee's coordinators. Each node gets an unbounded inbox;
//! a broadcast from node `i` is queued in every inbox except `i`'s own.

use async_trait::async_trait;
use qc_08_block_consensus::{ConsensusError, ConsensusMessage, ConsensusResult, NetworkBroadcaster};
use shared_types::ProposerIndex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// Message plus the node that broadcast it
#[derive(Clone, Debug)]
pub struct Delivery {
    pub from: ProposerIndex,
    pub message: ConsensusMessage,
}

/// Per-node broadcaster handed to the coordinator
pub struct HubBroadcaster {
    local: ProposerIndex,
    peers: Vec<(ProposerIndex, UnboundedSender<Delivery>)>,
}

#[async_trait]
impl NetworkBroadcaster for HubBroadcaster {
    async fn broadcast(&self, message: ConsensusMessage) -> ConsensusResult<()> {
        trace!(from = %self.local, kind = message.kind(), height = %message.height(), "Broadcast");
        for (peer, inbox) in &self.peers {
            let delivery = Delivery {
                from: self.local,
                message: message.clone(),
            };
            inbox.send(delivery).map_err(|_| {
                ConsensusError::Broadcast(format!("inbox of node {peer} is closed"))
            })?;
        }
        Ok(())
    }
}

/// Build one broadcaster and one inbox per node, indexed by `slot()`.
pub fn connect(node_count: u64) -> (Vec<HubBroadcaster>, Vec<UnboundedReceiver<Delivery>>) {
    let (senders, inboxes): (Vec<_>, Vec<_>) = ProposerIndex::all(node_count)
        .map(|node| {
            let (tx, rx) = unbounded_channel();
            ((node, tx), rx)
        })
        .unzip();

    let broadcasters = ProposerIndex::all(node_count)
        .map(|local| HubBroadcaster {
            local,
            peers: senders
                .iter()
                .filter(|(peer, _)| *peer != local)
                .cloned()
                .collect(),
        })
        .collect();

    (broadcasters, inboxes)
}
