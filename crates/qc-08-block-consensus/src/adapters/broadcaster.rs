//! Network broadcaster adapter
//!
//! Implements the NetworkBroadcaster port by recording messages in memory

use crate::domain::{ConsensusMessage, ConsensusResult};
use crate::ports::NetworkBroadcaster;
use async_trait::async_trait;
use parking_lot::RwLock;

/// In-memory broadcaster for testing
///
/// Keeps every broadcast message in order; `drain` hands them to a test
/// harness that delivers them to the other coordinators.
pub struct InMemoryBroadcaster {
    messages: RwLock<Vec<ConsensusMessage>>,
}

impl InMemoryBroadcaster {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
        }
    }

    pub fn get_messages(&self) -> Vec<ConsensusMessage> {
        self.messages.read().clone()
    }

    pub fn message_count(&self) -> usize {
        self.messages.read().len()
    }

    /// Take every recorded message, oldest first
    pub fn drain(&self) -> Vec<ConsensusMessage> {
        std::mem::take(&mut *self.messages.write())
    }
}

impl Default for InMemoryBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkBroadcaster for InMemoryBroadcaster {
    async fn broadcast(&self, message: ConsensusMessage) -> ConsensusResult<()> {
        self.messages.write().push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BinaryAgreementMessage, RoundMessageKind};
    use shared_types::{Height, ProposerIndex};

    fn round(sender: u64) -> ConsensusMessage {
        ConsensusMessage::Round(BinaryAgreementMessage {
            height: Height(1),
            proposer: ProposerIndex(1),
            sender: ProposerIndex(sender),
            round: 0,
            kind: RoundMessageKind::BVal,
            value: true,
            sent_at_ms: 0,
        })
    }

    #[tokio::test]
    async fn test_in_memory_broadcaster() {
        let broadcaster = InMemoryBroadcaster::new();
        broadcaster.broadcast(round(1)).await.unwrap();
        broadcaster.broadcast(round(2)).await.unwrap();
        assert_eq!(broadcaster.message_count(), 2);

        let drained = broadcaster.drain();
        assert_eq!(drained, vec![round(1), round(2)]);
        assert_eq!(broadcaster.message_count(), 0);
    }
}
