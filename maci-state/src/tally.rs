//! Quadratic vote tally over the final ballots.
//!
//! Ballots are tallied in fixed-size batches aligned to subtrees of the
//! ballot tree, so each batch can be proven against the ballot root with a
//! single subtree path.

use halo2curves_axiom::{bn256::Fr, ff::Field};
use maci_common::{fr_from_u128, hash};
use serde::Serialize;

use crate::{
    ballot::Ballot,
    error::{ProcessorError, TreeError},
    processor::MessageProcessor,
    quin_tree::{capacity_for_depth, MerkleProof, QuinTree},
};

/// Option indices published as for/against/abstain.
pub const FOR_OPTION: usize = 0;
pub const AGAINST_OPTION: usize = 1;
pub const ABSTAIN_OPTION: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyState {
    pub results: Vec<u128>,
    pub per_vo_spent: Vec<u128>,
    pub total_spent: u128,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TallySalts {
    pub results: Fr,
    pub spent: Fr,
    pub per_vo_spent: Fr,
}

impl TallyState {
    pub fn empty(vote_option_tree_depth: usize) -> Self {
        let capacity = capacity_for_depth(vote_option_tree_depth) as usize;
        Self {
            results: vec![0; capacity],
            per_vo_spent: vec![0; capacity],
            total_spent: 0,
        }
    }

    fn add_ballot(&mut self, ballot: &Ballot) {
        for (option, &weight) in ballot.votes().iter().enumerate() {
            let weight = u128::from(weight);
            let spent = weight * weight;
            self.results[option] += weight;
            self.per_vo_spent[option] += spent;
            self.total_spent += spent;
        }
    }

    pub fn result(&self, option: usize) -> u128 {
        self.results.get(option).copied().unwrap_or(0)
    }

    pub fn results_root(&self, depth: usize) -> Result<Fr, TreeError> {
        root_of(depth, &self.results)
    }

    pub fn per_vo_spent_root(&self, depth: usize) -> Result<Fr, TreeError> {
        root_of(depth, &self.per_vo_spent)
    }

    pub fn commitment(&self, depth: usize, salts: &TallySalts) -> Result<Fr, TreeError> {
        Ok(tally_commitment(
            self.results_root(depth)?,
            fr_from_u128(self.total_spent),
            self.per_vo_spent_root(depth)?,
            salts,
        ))
    }
}

fn root_of(depth: usize, values: &[u128]) -> Result<Fr, TreeError> {
    let leaves: Vec<Fr> = values.iter().map(|&v| fr_from_u128(v)).collect();
    QuinTree::compute_root(depth, Fr::ZERO, &leaves)
}

/// `hash([hash([resultsRoot, s1]), hash([totalSpent, s2]), hash([perVORoot, s3])])`.
pub fn tally_commitment(
    results_root: Fr,
    total_spent: Fr,
    per_vo_spent_root: Fr,
    salts: &TallySalts,
) -> Fr {
    hash(&[
        hash(&[results_root, salts.results]),
        hash(&[total_spent, salts.spent]),
        hash(&[per_vo_spent_root, salts.per_vo_spent]),
    ])
}

#[derive(Clone, Debug)]
pub struct TallyBatch {
    pub batch_num: usize,
    pub batch_start_index: u64,
    pub ballots: Vec<Ballot>,
    pub ballot_subroot: Fr,
    pub ballot_subroot_proof: MerkleProof,
    pub current: TallyState,
    pub new: TallyState,
}

#[derive(Clone, Debug)]
pub struct Tally {
    pub batches: Vec<TallyBatch>,
    pub result: TallyState,
    /// Ballots that accepted at least one command.
    pub total_voters: u64,
}

impl Tally {
    pub fn for_votes(&self) -> u128 {
        self.result.result(FOR_OPTION)
    }

    pub fn against_votes(&self) -> u128 {
        self.result.result(AGAINST_OPTION)
    }

    pub fn abstain_votes(&self) -> u128 {
        self.result.result(ABSTAIN_OPTION)
    }
}

/// Tally the processor's final ballots in batches of `batch_size`, which
/// must be a power of five no larger than the ballot tree.
pub fn compute_tally(
    processor: &MessageProcessor,
    batch_size: usize,
) -> Result<Tally, ProcessorError> {
    let params = processor.params();
    let ballot_tree = processor.ballot_tree();
    let batch_level = batch_level(batch_size, ballot_tree.depth())
        .ok_or(ProcessorError::InvalidTallyBatchSize(batch_size))?;

    let ballots = processor.ballots();
    let empty = Ballot::empty(params.vote_option_tree_depth);
    let mut running = TallyState::empty(params.vote_option_tree_depth);
    let mut batches = Vec::new();

    for (batch_num, start) in (0..ballots.len()).step_by(batch_size).enumerate() {
        let batch_ballots: Vec<Ballot> = (start..start + batch_size)
            .map(|i| ballots.get(i).cloned().unwrap_or_else(|| empty.clone()))
            .collect();

        let current = running.clone();
        for ballot in &batch_ballots {
            running.add_ballot(ballot);
        }

        batches.push(TallyBatch {
            batch_num,
            batch_start_index: start as u64,
            ballot_subroot: ballot_tree.subroot(batch_level, batch_num as u64)?,
            ballot_subroot_proof: ballot_tree.subtree_proof(batch_level, batch_num as u64)?,
            ballots: batch_ballots,
            current,
            new: running.clone(),
        });
    }

    let total_voters = ballots.iter().filter(|b| b.nonce > 0).count() as u64;
    Ok(Tally {
        batches,
        result: running,
        total_voters,
    })
}

/// `log5(batch_size)` when it is a power of five within the tree.
fn batch_level(batch_size: usize, depth: usize) -> Option<usize> {
    (0..=depth).find(|&level| capacity_for_depth(level) == batch_size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_spend_accumulates() {
        let mut ballot = Ballot::empty(1);
        ballot.set_vote(0, 5).unwrap();
        ballot.set_vote(2, 3).unwrap();

        let mut state = TallyState::empty(1);
        state.add_ballot(&ballot);
        assert_eq!(state.result(0), 5);
        assert_eq!(state.result(2), 3);
        assert_eq!(state.per_vo_spent[0], 25);
        assert_eq!(state.total_spent, 34);
    }

    #[test]
    fn commitment_depends_on_salts() {
        let state = TallyState::empty(1);
        let zero = state.commitment(1, &TallySalts::default()).unwrap();
        let salted = state
            .commitment(
                1,
                &TallySalts {
                    results: Fr::ONE,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_ne!(zero, salted);
    }

    #[test]
    fn batch_level_accepts_powers_of_five_only() {
        assert_eq!(batch_level(1, 2), Some(0));
        assert_eq!(batch_level(5, 2), Some(1));
        assert_eq!(batch_level(25, 2), Some(2));
        assert_eq!(batch_level(4, 2), None);
        assert_eq!(batch_level(125, 2), None);
    }
}
