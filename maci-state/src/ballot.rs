use halo2curves_axiom::{bn256::Fr, ff::Field};
use maci_common::hash;

use crate::{
    error::TreeError,
    quin_tree::{capacity_for_depth, MerkleProof, QuinTree},
};

/// Per-voter vote record. `votes` has one slot per leaf of the vote option
/// tree and `vote_option_root` is kept in sync with it on every change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ballot {
    pub nonce: u64,
    votes: Vec<u64>,
    vote_option_root: Fr,
    vote_option_tree_depth: usize,
}

impl Ballot {
    pub fn empty(vote_option_tree_depth: usize) -> Self {
        let capacity = capacity_for_depth(vote_option_tree_depth) as usize;
        let root = QuinTree::new(vote_option_tree_depth, Fr::ZERO).root();
        Self {
            nonce: 0,
            votes: vec![0; capacity],
            vote_option_root: root,
            vote_option_tree_depth,
        }
    }

    pub fn votes(&self) -> &[u64] {
        &self.votes
    }

    pub fn vote(&self, option: u64) -> Option<u64> {
        self.votes.get(option as usize).copied()
    }

    pub fn vote_option_root(&self) -> Fr {
        self.vote_option_root
    }

    pub fn vote_option_tree_depth(&self) -> usize {
        self.vote_option_tree_depth
    }

    pub fn set_vote(&mut self, option: u64, weight: u64) -> Result<(), TreeError> {
        let capacity = self.votes.len() as u64;
        let slot = self
            .votes
            .get_mut(option as usize)
            .ok_or(TreeError::IndexOutOfRange {
                index: option,
                capacity,
            })?;
        *slot = weight;
        self.vote_option_root = self.vote_tree()?.root();
        Ok(())
    }

    pub fn vote_leaves(&self) -> Vec<Fr> {
        self.votes.iter().map(|&v| Fr::from(v)).collect()
    }

    pub fn vote_tree(&self) -> Result<QuinTree, TreeError> {
        QuinTree::from_leaves(self.vote_option_tree_depth, Fr::ZERO, &self.vote_leaves())
    }

    pub fn vote_proof(&self, option: u64) -> Result<MerkleProof, TreeError> {
        self.vote_tree()?.proof(option)
    }

    /// `hash([nonce, voteOptionRoot])`.
    pub fn hash(&self) -> Fr {
        hash(&[Fr::from(self.nonce), self.vote_option_root])
    }
}
