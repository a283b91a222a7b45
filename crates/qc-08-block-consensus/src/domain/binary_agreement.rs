//! # Binary Agreement Instance
//!
//! One asynchronous binary Byzantine agreement: "does proposer P's block
//! enter height H?". Signature-free, common-coin based.
//!
//! ## Round `r`
//!
//! 1. Broadcast `BVal(r, est)`.
//! 2. Relay `BVal(r, v)` once `f + 1` distinct senders sent it.
//! 3. Add `v` to `bin_values` once `2f + 1` distinct senders sent it; on the
//!    first value, broadcast `Aux(r, v)`.
//! 4. Once `N - f` distinct `Aux` messages carry values in `bin_values`, take
//!    their value set `vals` and the coin `c` of round `r`:
//!    - `vals = {b}`: decide `b` if `b == c`; next estimate is `b`
//!    - otherwise: next estimate is `c`
//!
//! After deciding `b` the instance keeps participating until it completes a
//! later round whose coin is `b` (every honest node decides there), then halts.
//!
//! ## Delivery
//!
//! The instance is a pure state machine: [`propose`](BinaryAgreementInstance::propose)
//! and [`deliver`](BinaryAgreementInstance::deliver) return an
//! [`AgreementStep`] with messages to broadcast and at most one decision.
//! Own messages are applied through a local queue, not through the network.
//!
//! Messages for later rounds are buffered and replayed when the round
//! advances; next-round messages are applied early only once the instance
//! has decided. The buffer holds one copy per (round, sender, kind, value).
//! Next-round messages are always kept. Messages two or more rounds ahead
//! count against a per-sender quota, and anything past
//! [`MAX_FUTURE_ROUNDS`] is dropped on arrival.

use super::{BinaryAgreementMessage, ChildDecision, ConsensusError, ConsensusResult, RoundMessageKind};
use crate::ports::outbound::TimeSource;
use sha3::{Digest, Sha3_256};
use shared_types::{AgreementKey, ProposerIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::{debug, trace};

/// Rounds past the current one that may still be buffered
pub const MAX_FUTURE_ROUNDS: u64 = 16;

/// (round, sender, is_aux, value)
type BufferKey = (u64, ProposerIndex, bool, bool);

/// Output of one call into an instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgreementStep {
    /// Messages for the network
    pub outgoing: Vec<BinaryAgreementMessage>,
    /// Set exactly once per instance
    pub decision: Option<ChildDecision>,
}

impl AgreementStep {
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.decision.is_none()
    }
}

#[derive(Debug, Default)]
struct RoundState {
    /// Senders of BVal(false) / BVal(true)
    bval: [BTreeSet<ProposerIndex>; 2],
    bval_sent: [bool; 2],
    bin_values: BTreeSet<bool>,
    aux: BTreeMap<ProposerIndex, bool>,
    aux_sent: bool,
}

#[derive(Clone, Copy, Debug)]
struct Decided {
    value: bool,
    round: u64,
}

/// Common coin for `(key, round)`: low bit of a SHA3 digest.
///
/// Identical at every node, unknown before the round is reached in practice.
pub fn common_coin(key: AgreementKey, round: u64) -> bool {
    let mut hasher = Sha3_256::new();
    hasher.update(b"QC-COMMON-COIN");
    hasher.update(key.height.as_u64().to_le_bytes());
    hasher.update(key.proposer.as_u64().to_le_bytes());
    hasher.update(round.to_le_bytes());
    let digest = hasher.finalize();
    digest[0] & 1 == 1
}

/// Per-proposer binary agreement.
#[derive(Debug)]
pub struct BinaryAgreementInstance {
    key: AgreementKey,
    node_count: u64,
    local: ProposerIndex,
    max_buffered: usize,

    round: u64,
    proposed: bool,
    rounds: BTreeMap<u64, RoundState>,
    decided: Option<Decided>,
    reported: bool,
    halted: bool,

    buffered: BTreeMap<BufferKey, BinaryAgreementMessage>,
    /// Per-sender count of buffered messages two or more rounds ahead
    far_buffered: HashMap<ProposerIndex, usize>,
    local_queue: VecDeque<BinaryAgreementMessage>,

    max_processing_time_ms: u64,
    max_latency_time_ms: u64,
}

impl BinaryAgreementInstance {
    pub fn new(
        key: AgreementKey,
        node_count: u64,
        local: ProposerIndex,
        max_buffered: usize,
    ) -> Self {
        Self {
            key,
            node_count,
            local,
            max_buffered,
            round: 0,
            proposed: false,
            rounds: BTreeMap::new(),
            decided: None,
            reported: false,
            halted: false,
            buffered: BTreeMap::new(),
            far_buffered: HashMap::new(),
            local_queue: VecDeque::new(),
            max_processing_time_ms: 0,
            max_latency_time_ms: 0,
        }
    }

    pub fn key(&self) -> AgreementKey {
        self.key
    }

    pub fn current_round(&self) -> u64 {
        self.round
    }

    pub fn is_decided(&self) -> bool {
        self.decided.is_some()
    }

    pub fn decided_value(&self) -> Option<bool> {
        self.decided.map(|d| d.value)
    }

    pub fn has_proposed(&self) -> bool {
        self.proposed
    }

    /// Stopped emitting after the post-decision round.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// Buffered messages two or more rounds ahead allowed per sender
    fn far_quota(&self) -> usize {
        (self.max_buffered / self.node_count.max(1) as usize).max(1)
    }

    fn faults(&self) -> usize {
        (self.node_count.saturating_sub(1) / 3) as usize
    }

    fn relay_threshold(&self) -> usize {
        self.faults() + 1
    }

    fn bin_threshold(&self) -> usize {
        2 * self.faults() + 1
    }

    fn aux_threshold(&self) -> usize {
        self.node_count as usize - self.faults()
    }

    /// Seed round 0 with this node's input.
    pub fn propose(&mut self, value: bool, clock: &dyn TimeSource) -> ConsensusResult<AgreementStep> {
        if self.decided.is_some() {
            return Err(ConsensusError::InvalidState(format!(
                "propose on terminated agreement {}",
                self.key
            )));
        }
        if self.proposed {
            return Err(ConsensusError::InvalidState(format!(
                "agreement {} already proposed",
                self.key
            )));
        }
        self.proposed = true;

        let now = clock.now_ms();
        let mut step = AgreementStep::default();
        if self.round == 0 {
            self.send(0, RoundMessageKind::BVal, value, now, &mut step);
        }
        self.drain(now, &mut step);
        Ok(step)
    }

    /// Apply one message for this agreement.
    pub fn deliver(
        &mut self,
        message: BinaryAgreementMessage,
        clock: &dyn TimeSource,
    ) -> ConsensusResult<AgreementStep> {
        if message.key() != self.key {
            return Err(ConsensusError::InvalidArgument(format!(
                "message for {} delivered to {}",
                message.key(),
                self.key
            )));
        }
        message.sender.checked(self.node_count)?;

        let mut step = AgreementStep::default();
        if self.halted {
            return Ok(step);
        }

        let started = clock.now_ms();
        let latency = started.saturating_sub(message.sent_at_ms);
        self.max_latency_time_ms = self.max_latency_time_ms.max(latency);

        self.accept(message, started, &mut step);
        self.drain(started, &mut step);

        let elapsed = clock.now_ms().saturating_sub(started);
        self.max_processing_time_ms = self.max_processing_time_ms.max(elapsed);
        Ok(step)
    }

    fn drain(&mut self, now: u64, step: &mut AgreementStep) {
        while let Some(message) = self.local_queue.pop_front() {
            if self.halted {
                self.local_queue.clear();
                break;
            }
            self.accept(message, now, step);
        }
    }

    fn send(&mut self, round: u64, kind: RoundMessageKind, value: bool, now: u64, step: &mut AgreementStep) {
        let state = self.rounds.entry(round).or_default();
        match kind {
            RoundMessageKind::BVal => {
                if state.bval_sent[usize::from(value)] {
                    return;
                }
                state.bval_sent[usize::from(value)] = true;
            }
            RoundMessageKind::Aux => {
                if state.aux_sent {
                    return;
                }
                state.aux_sent = true;
            }
        }

        let message = BinaryAgreementMessage {
            height: self.key.height,
            proposer: self.key.proposer,
            sender: self.local,
            round,
            kind,
            value,
            sent_at_ms: now,
        };
        step.outgoing.push(message.clone());
        self.local_queue.push_back(message);
    }

    fn accept(&mut self, message: BinaryAgreementMessage, now: u64, step: &mut AgreementStep) {
        let ahead = message.round > self.round + 1
            || (message.round == self.round + 1 && self.decided.is_none());
        if ahead {
            self.buffer(message);
            return;
        }

        let round = message.round;
        let value = message.value;
        let relay_threshold = self.relay_threshold();
        let bin_threshold = self.bin_threshold();

        let state = self.rounds.entry(round).or_default();
        match message.kind {
            RoundMessageKind::BVal => {
                if !state.bval[usize::from(value)].insert(message.sender) {
                    return;
                }
                let count = state.bval[usize::from(value)].len();
                let relay = count >= relay_threshold && !state.bval_sent[usize::from(value)];
                let first_bin = count >= bin_threshold
                    && state.bin_values.insert(value)
                    && state.bin_values.len() == 1;

                if relay {
                    self.send(round, RoundMessageKind::BVal, value, now, step);
                }
                if first_bin {
                    self.send(round, RoundMessageKind::Aux, value, now, step);
                }
            }
            RoundMessageKind::Aux => {
                if state.aux.contains_key(&message.sender) {
                    return;
                }
                state.aux.insert(message.sender, value);
            }
        }

        if round == self.round {
            self.try_complete_round(now, step);
        }
    }

    fn buffer(&mut self, message: BinaryAgreementMessage) {
        if message.round > self.round + MAX_FUTURE_ROUNDS {
            debug!(
                key = %self.key,
                round = message.round,
                current = self.round,
                sender = %message.sender,
                "Dropping message past the round horizon"
            );
            crate::metrics::record_message_dropped("round_horizon");
            return;
        }

        let key = (
            message.round,
            message.sender,
            message.kind == RoundMessageKind::Aux,
            message.value,
        );
        if self.buffered.contains_key(&key) {
            return;
        }

        if message.round > self.round + 1 {
            let quota = self.far_quota();
            let held = self.far_buffered.entry(message.sender).or_default();
            if *held >= quota {
                debug!(
                    key = %self.key,
                    round = message.round,
                    current = self.round,
                    sender = %message.sender,
                    "Dropping future-round message, sender quota full"
                );
                crate::metrics::record_message_dropped("round_buffer_full");
                return;
            }
            *held += 1;
        }
        self.buffered.insert(key, message);
    }

    /// Queue every buffered message up to the next round; the rest stay
    /// buffered and are recounted against their senders' quotas.
    fn replay_buffered(&mut self) {
        let far = self
            .buffered
            .split_off(&(self.round + 2, ProposerIndex(0), false, false));
        let ready = std::mem::replace(&mut self.buffered, far);

        self.far_buffered.clear();
        for (_, sender, _, _) in self.buffered.keys() {
            *self.far_buffered.entry(*sender).or_default() += 1;
        }
        self.local_queue.extend(ready.into_values());
    }

    fn try_complete_round(&mut self, now: u64, step: &mut AgreementStep) {
        loop {
            let round = self.round;
            let Some(state) = self.rounds.get(&round) else {
                return;
            };
            if state.bin_values.is_empty() {
                return;
            }

            let accepted: BTreeSet<bool> = state
                .aux
                .values()
                .filter(|v| state.bin_values.contains(v))
                .copied()
                .collect();
            let accepted_count = state
                .aux
                .values()
                .filter(|v| state.bin_values.contains(v))
                .count();
            if accepted_count < self.aux_threshold() {
                return;
            }

            let coin = common_coin(self.key, round);
            let estimate = match (accepted.len(), accepted.first()) {
                (1, Some(&value)) => {
                    if value == coin && self.decided.is_none() {
                        self.decide(value, round, step);
                    }
                    value
                }
                _ => coin,
            };

            if let Some(decided) = self.decided {
                if round > decided.round && coin == decided.value {
                    trace!(key = %self.key, round, "Agreement halted");
                    self.halted = true;
                    return;
                }
            }

            self.round = round + 1;
            trace!(key = %self.key, round = self.round, estimate, "Advanced round");
            self.send(self.round, RoundMessageKind::BVal, estimate, now, step);

            self.replay_buffered();
        }
    }

    fn decide(&mut self, value: bool, round: u64, step: &mut AgreementStep) {
        self.decided = Some(Decided { value, round });
        if self.reported {
            return;
        }
        self.reported = true;

        debug!(key = %self.key, value, round, "Binary agreement decided");
        step.decision = Some(ChildDecision {
            height: self.key.height,
            proposer: self.key.proposer,
            value,
            round,
            max_processing_time_ms: self.max_processing_time_ms,
            max_latency_time_ms: self.max_latency_time_ms,
        });
    }
}
