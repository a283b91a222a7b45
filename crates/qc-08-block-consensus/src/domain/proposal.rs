use super::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};
use shared_types::ProposerIndex;

/// Which proposers' candidate blocks this node has received for a height.
///
/// Entry `i - 1` is the proposal bit for proposer `i`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanProposalVector {
    values: Vec<bool>,
}

impl BooleanProposalVector {
    pub fn new(values: Vec<bool>) -> ConsensusResult<Self> {
        if values.is_empty() {
            return Err(ConsensusError::InvalidArgument(
                "empty proposal vector".to_string(),
            ));
        }
        Ok(Self { values })
    }

    /// Vector with every proposal present
    pub fn all_present(node_count: u64) -> ConsensusResult<Self> {
        Self::new(vec![true; node_count as usize])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Proposal bit for a 1-based proposer. Unknown proposers vote `false`.
    pub fn proposal_value(&self, proposer: ProposerIndex) -> bool {
        if proposer.is_default() {
            return false;
        }
        self.values.get(proposer.slot()).copied().unwrap_or(false)
    }
}
