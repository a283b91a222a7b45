//! # Decisions
//!
//! Child decisions recorded per height, and the block decision derived from
//! them.
//!
//! ## Partition invariant
//!
//! A proposer appears in at most one of the true/false maps of a
//! [`DecisionSet`]. The check happens before anything is written, so a
//! conflicting report leaves the set untouched.

use super::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};
use shared_types::{AgreementKey, Height, ProposerIndex};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Stats attached to a default block decision
pub const DEFAULT_BLOCK_STATS: &str = "DEFAULT_BLOCK";

/// Terminal output of one binary agreement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildDecision {
    pub height: Height,
    pub proposer: ProposerIndex,
    pub value: bool,
    /// Round in which the agreement decided
    pub round: u64,
    pub max_processing_time_ms: u64,
    pub max_latency_time_ms: u64,
}

impl ChildDecision {
    pub fn key(&self) -> AgreementKey {
        AgreementKey {
            height: self.height,
            proposer: self.proposer,
        }
    }
}

/// Result of recording a child decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// Same value already recorded; nothing changed
    Duplicate,
}

/// True and false child decisions of one height.
#[derive(Clone, Debug, Default)]
pub struct DecisionSet {
    true_decisions: BTreeMap<ProposerIndex, ChildDecision>,
    false_decisions: BTreeMap<ProposerIndex, ChildDecision>,
}

impl DecisionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, decision: ChildDecision) -> ConsensusResult<RecordOutcome> {
        let proposer = decision.proposer;
        if let Some(recorded) = self.value_of(proposer) {
            if recorded != decision.value {
                return Err(ConsensusError::ConflictingDecision {
                    height: decision.height,
                    proposer,
                    recorded,
                    reported: decision.value,
                });
            }
            return Ok(RecordOutcome::Duplicate);
        }

        if decision.value {
            self.true_decisions.insert(proposer, decision);
        } else {
            self.false_decisions.insert(proposer, decision);
        }
        Ok(RecordOutcome::Recorded)
    }

    pub fn value_of(&self, proposer: ProposerIndex) -> Option<bool> {
        if self.true_decisions.contains_key(&proposer) {
            Some(true)
        } else if self.false_decisions.contains_key(&proposer) {
            Some(false)
        } else {
            None
        }
    }

    pub fn get(&self, proposer: ProposerIndex) -> Option<&ChildDecision> {
        self.true_decisions
            .get(&proposer)
            .or_else(|| self.false_decisions.get(&proposer))
    }

    pub fn has_true(&self, proposer: ProposerIndex) -> bool {
        self.true_decisions.contains_key(&proposer)
    }

    pub fn has_false(&self, proposer: ProposerIndex) -> bool {
        self.false_decisions.contains_key(&proposer)
    }

    pub fn true_count(&self) -> usize {
        self.true_decisions.len()
    }

    pub fn false_count(&self) -> usize {
        self.false_decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.true_decisions.is_empty() && self.false_decisions.is_empty()
    }

    /// Per-proposer summary, `"{i}|D{v}R{round}P{proc}L{lat}|"` or `"{i}|*|"`.
    pub fn build_stats(&self, node_count: u64) -> String {
        let mut stats = String::new();
        for proposer in ProposerIndex::all(node_count) {
            let _ = write!(stats, "{proposer}|");
            match self.get(proposer) {
                Some(d) => {
                    let _ = write!(
                        stats,
                        "D{}R{}P{}L{}|",
                        u8::from(d.value),
                        d.round,
                        d.max_processing_time_ms,
                        d.max_latency_time_ms
                    );
                }
                None => stats.push_str("*|"),
            }
        }
        stats
    }
}

/// The block chosen for a height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDecision {
    pub height: Height,
    /// Winning proposer, or `DEFAULT_BLOCK`
    pub winner: ProposerIndex,
    pub stats: String,
}

impl BlockDecision {
    pub fn new(height: Height, winner: ProposerIndex, stats: String) -> ConsensusResult<Self> {
        if stats.is_empty() {
            return Err(ConsensusError::InvalidArgument(
                "empty decision stats".to_string(),
            ));
        }
        Ok(Self {
            height,
            winner,
            stats,
        })
    }

    pub fn default_block(height: Height) -> Self {
        Self {
            height,
            winner: ProposerIndex::DEFAULT_BLOCK,
            stats: DEFAULT_BLOCK_STATS.to_string(),
        }
    }

    pub fn is_default_block(&self) -> bool {
        self.winner.is_default()
    }
}

/// Result of feeding an input to the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// This input decided the height
    Decided(BlockDecision),
    /// Accepted; no block decision yet
    Pending,
    /// Height already committed or too old
    Stale,
    /// Duplicate, already decided, or filtered
    Ignored,
}

impl DecisionOutcome {
    pub fn decision(&self) -> Option<&BlockDecision> {
        match self {
            DecisionOutcome::Decided(decision) => Some(decision),
            _ => None,
        }
    }
}

/// Coordinator phase of one height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    NotStarted,
    Proposing,
    AwaitingChildren,
    Decided,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(proposer: u64, value: bool) -> ChildDecision {
        ChildDecision {
            height: Height(5),
            proposer: ProposerIndex(proposer),
            value,
            round: 1,
            max_processing_time_ms: 2,
            max_latency_time_ms: 3,
        }
    }

    #[test]
    fn test_duplicate_is_noop() {
        let mut set = DecisionSet::new();
        assert_eq!(set.record(decision(2, true)).unwrap(), RecordOutcome::Recorded);

        let mut retransmit = decision(2, true);
        retransmit.round = 7;
        assert_eq!(set.record(retransmit).unwrap(), RecordOutcome::Duplicate);

        // First report kept
        assert_eq!(set.get(ProposerIndex(2)).unwrap().round, 1);
        assert_eq!(set.true_count(), 1);
    }

    #[test]
    fn test_true_after_false_conflicts() {
        let mut set = DecisionSet::new();
        set.record(decision(3, false)).unwrap();

        let err = set.record(decision(3, true)).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::ConflictingDecision {
                recorded: false,
                reported: true,
                ..
            }
        ));
        assert!(!set.has_true(ProposerIndex(3)));
        assert!(set.has_false(ProposerIndex(3)));
    }

    #[test]
    fn test_false_after_true_conflicts() {
        let mut set = DecisionSet::new();
        set.record(decision(1, true)).unwrap();
        assert!(set.record(decision(1, false)).is_err());
        assert_eq!(set.false_count(), 0);
    }

    #[test]
    fn test_stats_format() {
        let mut set = DecisionSet::new();
        set.record(decision(1, true)).unwrap();
        set.record(decision(3, false)).unwrap();
        assert_eq!(set.build_stats(3), "1|D1R1P2L3|2|*|3|D0R1P2L3|");
    }

    #[test]
    fn test_empty_stats_rejected() {
        assert!(matches!(
            BlockDecision::new(Height(1), ProposerIndex(1), String::new()),
            Err(ConsensusError::InvalidArgument(_))
        ));
        assert_eq!(BlockDecision::default_block(Height(1)).stats, "DEFAULT_BLOCK");
    }
}
