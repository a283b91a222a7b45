//! # Block Decision Rules
//!
//! Pure functions deriving a block decision from a [`DecisionSet`]. Both are
//! idempotent: the same set always yields the same answer.
//!
//! ## Normal rule
//!
//! Walk the priority ring from the priority leader:
//! - first proposer with a true decision wins
//! - a proposer with no decision yet stops the walk (pending)
//! - a false decision moves on to the next proposer
//!
//! A full walk of false decisions selects the default block.
//!
//! ## Optimized rule
//!
//! Only the designated proposer counts: true wins, false selects the
//! default block.

use super::{ConsensusError, ConsensusResult, DecisionSet};
use shared_types::{ProposerIndex, ShutdownSignal};

/// Outcome of a decision rule
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleOutcome {
    Winner(ProposerIndex),
    DefaultBlock,
    Pending,
}

/// Proposers in priority order for one height.
///
/// `leader` is 0-based; the ring yields `leader + 1, leader + 2, ...`
/// wrapping at `node_count`.
#[derive(Clone, Debug)]
pub struct PriorityOrder {
    leader: u64,
    node_count: u64,
    offset: u64,
}

impl PriorityOrder {
    pub fn new(leader: u64, node_count: u64) -> Self {
        Self {
            leader,
            node_count,
            offset: 0,
        }
    }
}

impl Iterator for PriorityOrder {
    type Item = ProposerIndex;

    fn next(&mut self) -> Option<ProposerIndex> {
        if self.offset >= self.node_count {
            return None;
        }
        let slot = (self.leader + self.offset) % self.node_count;
        self.offset += 1;
        Some(ProposerIndex(slot + 1))
    }
}

/// Normal-path rule.
pub fn decide_normal(
    set: &DecisionSet,
    leader: u64,
    node_count: u64,
    shutdown: &ShutdownSignal,
) -> ConsensusResult<RuleOutcome> {
    for proposer in PriorityOrder::new(leader, node_count) {
        if shutdown.is_requested() {
            return Err(ConsensusError::ShutdownRequested);
        }
        match set.value_of(proposer) {
            Some(true) => return Ok(RuleOutcome::Winner(proposer)),
            Some(false) => continue,
            None => return Ok(RuleOutcome::Pending),
        }
    }

    if set.false_count() as u64 != node_count || set.true_count() != 0 {
        return Err(ConsensusError::InvalidState(format!(
            "default block without all false decisions: {} false, {} true, {} nodes",
            set.false_count(),
            set.true_count(),
            node_count
        )));
    }
    Ok(RuleOutcome::DefaultBlock)
}

/// Optimized-path rule for the designated proposer.
pub fn decide_optimized(set: &DecisionSet, designated: ProposerIndex) -> RuleOutcome {
    match set.value_of(designated) {
        Some(true) => RuleOutcome::Winner(designated),
        Some(false) => RuleOutcome::DefaultBlock,
        None => RuleOutcome::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChildDecision;
    use shared_types::Height;

    fn set_with(values: &[(u64, bool)]) -> DecisionSet {
        let mut set = DecisionSet::new();
        for (proposer, value) in values {
            set.record(ChildDecision {
                height: Height(9),
                proposer: ProposerIndex(*proposer),
                value: *value,
                round: 0,
                max_processing_time_ms: 0,
                max_latency_time_ms: 0,
            })
            .unwrap();
        }
        set
    }

    #[test]
    fn test_ring_wraps() {
        let order: Vec<u64> = PriorityOrder::new(2, 4).map(|p| p.as_u64()).collect();
        assert_eq!(order, vec![3, 4, 1, 2]);
    }

    #[test]
    fn test_first_true_in_ring_wins() {
        let shutdown = ShutdownSignal::new();
        // Ring from leader 1 (proposer 2): 2, 3, 4, 1
        let set = set_with(&[(1, true), (2, false), (3, true), (4, false)]);
        assert_eq!(
            decide_normal(&set, 1, 4, &shutdown).unwrap(),
            RuleOutcome::Winner(ProposerIndex(3))
        );
    }

    #[test]
    fn test_later_values_do_not_matter() {
        let shutdown = ShutdownSignal::new();
        let expected = RuleOutcome::Winner(ProposerIndex(2));
        for tail in [(true, true), (true, false), (false, true), (false, false)] {
            let set = set_with(&[(1, false), (2, true), (3, tail.0), (4, tail.1)]);
            assert_eq!(decide_normal(&set, 0, 4, &shutdown).unwrap(), expected);
        }
        // Tail undecided as well
        let set = set_with(&[(1, false), (2, true)]);
        assert_eq!(decide_normal(&set, 0, 4, &shutdown).unwrap(), expected);
    }

    #[test]
    fn test_gap_is_pending() {
        let shutdown = ShutdownSignal::new();
        let set = set_with(&[(1, false), (3, true)]);
        assert_eq!(
            decide_normal(&set, 0, 4, &shutdown).unwrap(),
            RuleOutcome::Pending
        );
    }

    #[test]
    fn test_all_false_is_default() {
        let shutdown = ShutdownSignal::new();
        let set = set_with(&[(1, false), (2, false), (3, false), (4, false)]);
        assert_eq!(
            decide_normal(&set, 3, 4, &shutdown).unwrap(),
            RuleOutcome::DefaultBlock
        );

        let set = set_with(&[(1, false), (2, false), (4, false)]);
        assert_eq!(
            decide_normal(&set, 3, 4, &shutdown).unwrap(),
            RuleOutcome::Pending
        );
    }

    #[test]
    fn test_rule_is_idempotent() {
        let shutdown = ShutdownSignal::new();
        let pending = set_with(&[(2, false)]);
        let first = decide_normal(&pending, 1, 4, &shutdown).unwrap();
        assert_eq!(first, decide_normal(&pending, 1, 4, &shutdown).unwrap());

        let decided = set_with(&[(2, false), (3, true)]);
        let first = decide_normal(&decided, 1, 4, &shutdown).unwrap();
        assert_eq!(first, decide_normal(&decided, 1, 4, &shutdown).unwrap());
        assert_eq!(first, RuleOutcome::Winner(ProposerIndex(3)));
    }

    #[test]
    fn test_shutdown_stops_walk() {
        let shutdown = ShutdownSignal::new();
        shutdown.request();
        let set = set_with(&[(1, true)]);
        assert!(matches!(
            decide_normal(&set, 0, 4, &shutdown),
            Err(ConsensusError::ShutdownRequested)
        ));
    }

    #[test]
    fn test_optimized_rule() {
        assert_eq!(
            decide_optimized(&set_with(&[(2, true)]), ProposerIndex(2)),
            RuleOutcome::Winner(ProposerIndex(2))
        );
        assert_eq!(
            decide_optimized(&set_with(&[(2, false)]), ProposerIndex(2)),
            RuleOutcome::DefaultBlock
        );
        assert_eq!(
            decide_optimized(&set_with(&[(1, true)]), ProposerIndex(2)),
            RuleOutcome::Pending
        );
    }
}
