//! Voter state for one MACI poll.
//!
//! # State Model
//!
//! ```text
//! StateLeaf = { pubKey, voiceCreditBalance, timestamp }   leaf = hash(..)
//! Ballot    = { nonce, votes[5^voDepth] }                 leaf = hash(nonce, voteOptionRoot)
//!
//! sbCommitment = hash(stateRoot, ballotRoot, salt)
//! ```
//!
//! Index 0 of both trees is a blank sink that absorbs rejected messages.
//! [`MessageProcessor`] applies messages newest first in batches and records
//! a [`ProcessedBatch`] snapshot per batch; [`compute_tally`] then sums the
//! final ballots with quadratic cost accounting.

pub mod ballot;
pub mod batch;
pub mod error;
pub mod processor;
pub mod quin_tree;
pub mod tally;

pub use ballot::Ballot;
pub use batch::{
    BatchBuilder, BatchEntry, MessageOutcome, ProcessedBatch, RejectReason, TreeRoots,
};
pub use error::{ProcessorError, TreeError};
pub use processor::{sb_commitment, MessageProcessor, ProcessParams};
pub use quin_tree::{capacity_for_depth, MerkleProof, QuinTree, ARITY};
pub use tally::{compute_tally, tally_commitment, Tally, TallyBatch, TallySalts, TallyState};
