//! Message processing state machine.
//!
//! The processor owns the state, ballot and message trees for one poll run.
//! Messages are consumed newest first in batches; each message either
//! applies its command to the sender's leaf and ballot, or performs the
//! canonical no-op of rewriting index 0 with its own value so that every
//! batch carries the same shape of witness.

use halo2curves_axiom::bn256::Fr;
use maci_common::{ecdh, Command, EncryptedMessage, Keypair, StateLeaf};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    ballot::Ballot,
    batch::{BatchBuilder, BatchEntry, MessageOutcome, ProcessedBatch, RejectReason, TreeRoots},
    error::ProcessorError,
    quin_tree::{capacity_for_depth, QuinTree},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessParams {
    pub state_tree_depth: usize,
    pub message_tree_depth: usize,
    pub vote_option_tree_depth: usize,
    pub max_vote_options: u64,
    pub batch_size: usize,
}

impl Default for ProcessParams {
    fn default() -> Self {
        Self {
            state_tree_depth: 10,
            message_tree_depth: 2,
            vote_option_tree_depth: 2,
            max_vote_options: 25,
            batch_size: 5,
        }
    }
}

/// A command that passed every guard, with the balance it leaves behind.
struct ValidCommand {
    command: Command,
    new_balance: u128,
}

pub struct MessageProcessor {
    params: ProcessParams,
    coordinator: Keypair,
    num_signups: u64,
    state_leaves: Vec<StateLeaf>,
    ballots: Vec<Ballot>,
    /// Ascending by `message_index`.
    messages: Vec<EncryptedMessage>,
    state_tree: QuinTree,
    ballot_tree: QuinTree,
    message_tree: QuinTree,
    processed: bool,
}

impl MessageProcessor {
    /// Seed the trees from signups (state indices `1..=N`) and messages.
    pub fn new(
        params: ProcessParams,
        coordinator: Keypair,
        signups: &[StateLeaf],
        messages: &[EncryptedMessage],
    ) -> Result<Self, ProcessorError> {
        if params.batch_size == 0 {
            return Err(ProcessorError::ZeroBatchSize);
        }

        let state_capacity = capacity_for_depth(params.state_tree_depth);
        let num_signups = signups.len() as u64 + 1;
        if num_signups > state_capacity {
            return Err(ProcessorError::TooManySignUps {
                count: signups.len() as u64,
                capacity: state_capacity,
            });
        }

        let vote_option_capacity = capacity_for_depth(params.vote_option_tree_depth);
        if params.max_vote_options > vote_option_capacity {
            return Err(ProcessorError::TooManyVoteOptions {
                max: params.max_vote_options,
                capacity: vote_option_capacity,
            });
        }

        let mut messages = messages.to_vec();
        messages.sort_by_key(|m| m.message_index);
        if let Some(pair) = messages
            .windows(2)
            .find(|pair| pair[0].message_index == pair[1].message_index)
        {
            return Err(ProcessorError::DuplicateMessageIndex(pair[0].message_index));
        }

        let message_capacity = capacity_for_depth(params.message_tree_depth);
        let padded = padded_message_span(&messages, params.batch_size);
        if padded > message_capacity {
            return Err(ProcessorError::TooManyMessages {
                count: padded,
                capacity: message_capacity,
            });
        }

        let mut state_leaves = Vec::with_capacity(num_signups as usize);
        state_leaves.push(StateLeaf::blank());
        state_leaves.extend_from_slice(signups);
        let state_hashes: Vec<Fr> = state_leaves.iter().map(StateLeaf::hash).collect();
        let state_tree = QuinTree::from_leaves(
            params.state_tree_depth,
            StateLeaf::blank().hash(),
            &state_hashes,
        )?;

        let empty_ballot = Ballot::empty(params.vote_option_tree_depth);
        let ballots = vec![empty_ballot.clone(); num_signups as usize];
        let ballot_hashes: Vec<Fr> = ballots.iter().map(Ballot::hash).collect();
        let ballot_tree =
            QuinTree::from_leaves(params.state_tree_depth, empty_ballot.hash(), &ballot_hashes)?;

        let mut message_tree =
            QuinTree::new(params.message_tree_depth, EncryptedMessage::padding().hash());
        for message in &messages {
            message_tree.insert(message.message_index, message.hash())?;
        }

        debug!(
            num_signups,
            num_messages = messages.len(),
            "initialised message processor"
        );

        Ok(Self {
            params,
            coordinator,
            num_signups,
            state_leaves,
            ballots,
            messages,
            state_tree,
            ballot_tree,
            message_tree,
            processed: false,
        })
    }

    pub fn params(&self) -> &ProcessParams {
        &self.params
    }

    pub fn coordinator(&self) -> &Keypair {
        &self.coordinator
    }

    /// Registered voters plus the blank leaf.
    pub fn num_signups(&self) -> u64 {
        self.num_signups
    }

    pub fn num_messages(&self) -> u64 {
        self.messages.len() as u64
    }

    pub fn num_batches(&self) -> usize {
        self.messages.len().div_ceil(self.params.batch_size)
    }

    pub fn state_leaves(&self) -> &[StateLeaf] {
        &self.state_leaves
    }

    pub fn ballots(&self) -> &[Ballot] {
        &self.ballots
    }

    pub fn ballot_tree(&self) -> &QuinTree {
        &self.ballot_tree
    }

    pub fn roots(&self) -> TreeRoots {
        TreeRoots {
            state: self.state_tree.root(),
            ballot: self.ballot_tree.root(),
            message: self.message_tree.root(),
        }
    }

    /// Process every message, newest first, and return one snapshot per
    /// batch. A processor runs once; later calls return no batches.
    pub fn process_all(&mut self) -> Result<Vec<ProcessedBatch>, ProcessorError> {
        if self.processed {
            return Ok(Vec::new());
        }
        self.processed = true;

        let batch_size = self.params.batch_size;
        let mut queue = self.messages.clone();
        queue.reverse();
        let mut next_padding_index = queue
            .first()
            .map(|m| m.message_index + 1)
            .unwrap_or(0);

        let mut batches = Vec::with_capacity(self.num_batches());
        for (batch_num, chunk) in queue.chunks(batch_size).enumerate() {
            let batch_start_index = chunk.iter().map(|m| m.message_index).min().unwrap_or(0);
            let batch_end_index = chunk
                .iter()
                .map(|m| m.message_index + 1)
                .max()
                .unwrap_or(0);

            let mut builder = BatchBuilder::new(
                batch_num,
                batch_start_index,
                batch_end_index,
                self.roots(),
                batch_size,
            );
            for message in chunk {
                let entry = self.process_message(message, false)?;
                builder.push(entry);
            }
            for _ in chunk.len()..batch_size {
                let mut padding = EncryptedMessage::padding();
                padding.message_index = next_padding_index;
                next_padding_index += 1;
                let entry = self.process_message(&padding, true)?;
                builder.push(entry);
            }

            let batch = builder.finish(self.roots());
            info!(
                batch_num,
                batch_start_index,
                batch_end_index,
                applied = batch.applied(),
                rejected = batch.rejected(),
                "processed message batch"
            );
            batches.push(batch);
        }

        Ok(batches)
    }

    fn process_message(
        &mut self,
        message: &EncryptedMessage,
        padding: bool,
    ) -> Result<BatchEntry, ProcessorError> {
        let message_proof = self.message_tree.proof(message.message_index)?;

        let verdict = if padding {
            Err(None)
        } else {
            self.validate(message).map_err(Some)
        };

        let (state_index, vote_option_index) = match &verdict {
            Ok(valid) => (valid.command.state_index, valid.command.vote_option_index),
            Err(_) => (0, 0),
        };

        let slot = state_index as usize;
        let state_leaf = self.state_leaves[slot];
        let state_proof = self.state_tree.proof(state_index)?;
        let ballot = self.ballots[slot].clone();
        let ballot_proof = self.ballot_tree.proof(state_index)?;
        let current_vote_weight = ballot.vote(vote_option_index).unwrap_or(0);
        let current_vote_weight_proof = ballot.vote_proof(vote_option_index)?;

        let outcome = match verdict {
            Ok(valid) => {
                self.apply(valid)?;
                MessageOutcome::Applied
            }
            Err(reason) => {
                self.apply_noop()?;
                match reason {
                    Some(reason) => {
                        info!(
                            message_index = message.message_index,
                            %reason,
                            "message rejected"
                        );
                        MessageOutcome::Rejected(reason)
                    }
                    None => MessageOutcome::Padding,
                }
            }
        };

        Ok(BatchEntry {
            message: *message,
            message_proof,
            outcome,
            state_index,
            state_leaf,
            state_proof,
            ballot,
            ballot_proof,
            vote_option_index,
            current_vote_weight,
            current_vote_weight_proof,
        })
    }

    fn validate(&self, message: &EncryptedMessage) -> Result<ValidCommand, RejectReason> {
        let shared_key = ecdh(&self.coordinator.private, &message.enc_pub_key)
            .ok_or(RejectReason::DecryptionFailed)?;
        let (command, signature) =
            Command::decrypt(&message.data, &shared_key).ok_or(RejectReason::DecryptionFailed)?;

        if command.state_index == 0 || command.state_index >= self.num_signups {
            return Err(RejectReason::StateIndexOutOfRange);
        }
        let slot = command.state_index as usize;

        let leaf = &self.state_leaves[slot];
        if !command.verify(&signature, &leaf.pub_key) {
            return Err(RejectReason::InvalidSignature);
        }

        let ballot = &self.ballots[slot];
        if ballot.nonce.checked_add(1) != Some(command.nonce) {
            return Err(RejectReason::InvalidNonce);
        }

        let old_weight = u128::from(ballot.vote(command.vote_option_index).unwrap_or(0));
        let new_weight = u128::from(command.new_vote_weight);
        let new_balance = leaf
            .voice_credit_balance
            .checked_add(old_weight * old_weight)
            .and_then(|credit| credit.checked_sub(new_weight * new_weight))
            .ok_or(RejectReason::InsufficientVoiceCredits)?;

        if command.vote_option_index >= self.params.max_vote_options {
            return Err(RejectReason::VoteOptionOutOfRange);
        }

        Ok(ValidCommand {
            command,
            new_balance,
        })
    }

    fn apply(&mut self, valid: ValidCommand) -> Result<(), ProcessorError> {
        let ValidCommand {
            command,
            new_balance,
        } = valid;
        let slot = command.state_index as usize;

        let leaf = &mut self.state_leaves[slot];
        leaf.pub_key = command.new_pub_key;
        leaf.voice_credit_balance = new_balance;
        let leaf_hash = leaf.hash();
        self.state_tree.update(command.state_index, leaf_hash)?;

        let ballot = &mut self.ballots[slot];
        ballot.set_vote(command.vote_option_index, command.new_vote_weight)?;
        ballot.nonce += 1;
        let ballot_hash = ballot.hash();
        self.ballot_tree.update(command.state_index, ballot_hash)?;

        debug!(
            state_index = command.state_index,
            vote_option_index = command.vote_option_index,
            new_vote_weight = command.new_vote_weight,
            "applied command"
        );
        Ok(())
    }

    fn apply_noop(&mut self) -> Result<(), ProcessorError> {
        let leaf_hash = self.state_leaves[0].hash();
        self.state_tree.update(0, leaf_hash)?;
        let ballot_hash = self.ballots[0].hash();
        self.ballot_tree.update(0, ballot_hash)?;
        Ok(())
    }
}

/// Number of message tree slots used once the last batch is padded.
fn padded_message_span(sorted: &[EncryptedMessage], batch_size: usize) -> u64 {
    let Some(last) = sorted.last() else {
        return 0;
    };
    let batches = sorted.len().div_ceil(batch_size) as u64;
    let padding = batches * batch_size as u64 - sorted.len() as u64;
    last.message_index + 1 + padding
}

/// `hash([stateRoot, ballotRoot, salt])`.
pub fn sb_commitment(state_root: Fr, ballot_root: Fr, salt: Fr) -> Fr {
    maci_common::hash(&[state_root, ballot_root, salt])
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo2curves_axiom::ff::Field;
    use maci_common::PubKey;

    fn params() -> ProcessParams {
        ProcessParams {
            state_tree_depth: 2,
            message_tree_depth: 1,
            vote_option_tree_depth: 1,
            max_vote_options: 3,
            batch_size: 2,
        }
    }

    fn coordinator() -> Keypair {
        Keypair::from_private(maci_common::PrivKey::from_decimal("1234567").unwrap())
    }

    #[test]
    fn capacity_checks_are_typed() {
        let leaf = StateLeaf::new(PubKey::padding(), 10, 0);
        let too_many = vec![leaf; 25];
        assert!(matches!(
            MessageProcessor::new(params(), coordinator(), &too_many, &[]),
            Err(ProcessorError::TooManySignUps { .. })
        ));

        let mut wide = params();
        wide.max_vote_options = 6;
        assert!(matches!(
            MessageProcessor::new(wide, coordinator(), &[], &[]),
            Err(ProcessorError::TooManyVoteOptions { .. })
        ));

        let messages: Vec<_> = (0..5)
            .map(|i| EncryptedMessage::new([Fr::ONE; 10], PubKey::padding(), i))
            .collect();
        assert!(matches!(
            MessageProcessor::new(params(), coordinator(), &[], &messages),
            Err(ProcessorError::TooManyMessages { count: 6, .. })
        ));
    }

    #[test]
    fn duplicate_message_indices_are_refused() {
        let msg = EncryptedMessage::new([Fr::ONE; 10], PubKey::padding(), 1);
        assert_eq!(
            MessageProcessor::new(params(), coordinator(), &[], &[msg, msg]).err(),
            Some(ProcessorError::DuplicateMessageIndex(1))
        );
    }

    #[test]
    fn garbage_message_is_a_no_op() {
        let voter = StateLeaf::new(PubKey::padding(), 100, 1);
        let garbage = EncryptedMessage::new([Fr::from(3u64); 10], PubKey::padding(), 0);
        let mut processor =
            MessageProcessor::new(params(), coordinator(), &[voter], &[garbage]).unwrap();
        let before = processor.roots();

        let batches = processor.process_all().unwrap();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(
            batch.entries[0].outcome,
            MessageOutcome::Rejected(RejectReason::DecryptionFailed)
        );
        assert_eq!(batch.entries[1].outcome, MessageOutcome::Padding);
        assert_eq!(batch.entries[1].message.message_index, 1);
        assert_eq!(batch.pre_roots, before);
        assert_eq!(batch.post_roots, before);
        assert!(processor.process_all().unwrap().is_empty());
    }

    #[test]
    fn no_messages_means_no_batches() {
        let mut processor = MessageProcessor::new(params(), coordinator(), &[], &[]).unwrap();
        assert_eq!(processor.num_batches(), 0);
        assert!(processor.process_all().unwrap().is_empty());
    }
}
