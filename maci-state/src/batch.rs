//! Per-batch snapshots handed to the proof pipeline.

use std::fmt;

use halo2curves_axiom::bn256::Fr;
use maci_common::{EncryptedMessage, StateLeaf};

use crate::{ballot::Ballot, quin_tree::MerkleProof};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeRoots {
    pub state: Fr,
    pub ballot: Fr,
    pub message: Fr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    DecryptionFailed,
    StateIndexOutOfRange,
    InvalidSignature,
    InvalidNonce,
    InsufficientVoiceCredits,
    VoteOptionOutOfRange,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::DecryptionFailed => "message failed to decrypt",
            RejectReason::StateIndexOutOfRange => "state index out of range",
            RejectReason::InvalidSignature => "signature does not match state leaf key",
            RejectReason::InvalidNonce => "nonce is not ballot nonce + 1",
            RejectReason::InsufficientVoiceCredits => "insufficient voice credits",
            RejectReason::VoteOptionOutOfRange => "vote option out of range",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    Applied,
    Rejected(RejectReason),
    Padding,
}

impl MessageOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MessageOutcome::Applied)
    }
}

/// Everything the circuit needs about one message slot. Leaves and proofs
/// are captured against the roots in force immediately before this
/// message's own transition.
#[derive(Clone, Debug)]
pub struct BatchEntry {
    pub message: EncryptedMessage,
    pub message_proof: MerkleProof,
    pub outcome: MessageOutcome,
    /// Index the transition touched: the command's state index when applied,
    /// 0 otherwise.
    pub state_index: u64,
    pub state_leaf: StateLeaf,
    pub state_proof: MerkleProof,
    pub ballot: Ballot,
    pub ballot_proof: MerkleProof,
    pub vote_option_index: u64,
    pub current_vote_weight: u64,
    pub current_vote_weight_proof: MerkleProof,
}

#[derive(Clone, Debug)]
pub struct ProcessedBatch {
    pub batch_num: usize,
    /// Lowest real message index covered, inclusive.
    pub batch_start_index: u64,
    /// One past the highest real message index covered.
    pub batch_end_index: u64,
    pub entries: Vec<BatchEntry>,
    pub pre_roots: TreeRoots,
    pub post_roots: TreeRoots,
}

impl ProcessedBatch {
    pub fn applied(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_applied()).count()
    }

    pub fn rejected(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, MessageOutcome::Rejected(_)))
            .count()
    }
}

pub struct BatchBuilder {
    batch_num: usize,
    batch_start_index: u64,
    batch_end_index: u64,
    pre_roots: TreeRoots,
    entries: Vec<BatchEntry>,
}

impl BatchBuilder {
    pub fn new(
        batch_num: usize,
        batch_start_index: u64,
        batch_end_index: u64,
        pre_roots: TreeRoots,
        capacity: usize,
    ) -> Self {
        Self {
            batch_num,
            batch_start_index,
            batch_end_index,
            pre_roots,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, entry: BatchEntry) {
        self.entries.push(entry);
    }

    pub fn finish(self, post_roots: TreeRoots) -> ProcessedBatch {
        ProcessedBatch {
            batch_num: self.batch_num,
            batch_start_index: self.batch_start_index,
            batch_end_index: self.batch_end_index,
            entries: self.entries,
            pre_roots: self.pre_roots,
            post_roots,
        }
    }
}
