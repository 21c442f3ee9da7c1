//! Circuit input assembly.
//!
//! Field names and nesting follow the circuits' signal names exactly; every
//! scalar is rendered as a decimal string.

use std::{mem, str::FromStr};

use halo2curves_axiom::{bn256::Fr, ff::Field};
use maci_common::{fr_from_u128, fr_to_decimal, Keypair, StateLeaf};
use maci_state::{
    sb_commitment, Ballot, MerkleProof, ProcessParams, ProcessedBatch, Tally, TallyBatch,
    TallySalts, TallyState,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
    error::ProverError,
    hash::{compute_public_input_hash, process_packed_vals, tally_packed_vals},
};

/// How the tally circuit's running commitments are fed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TallyCommitmentMode {
    /// Use the real state commitment and the previous batch's tally
    /// commitment.
    #[default]
    Derived,
    /// Feed zero for both the state commitment and the current tally
    /// commitment.
    Zeroed,
}

impl FromStr for TallyCommitmentMode {
    type Err = ProverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "derived" => Ok(TallyCommitmentMode::Derived),
            "zeroed" => Ok(TallyCommitmentMode::Zeroed),
            other => Err(ProverError::InvalidInput(format!(
                "unknown tally commitment mode {other:?}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMessagesInput {
    pub input_hash: String,
    pub packed_vals: String,
    pub poll_end_timestamp: String,
    pub num_sign_ups: String,
    pub num_messages: String,
    pub batch_start_index: String,
    pub batch_end_index: String,
    pub max_vote_options: String,
    pub current_state_commitment: String,
    pub current_state_commitment_salt: String,
    pub new_state_commitment: String,
    pub new_state_commitment_salt: String,
    pub input_state_root: String,
    pub output_state_root: String,
    pub input_ballot_root: String,
    pub output_ballot_root: String,
    pub input_message_root: String,
    pub coordinator_sk: String,
    pub coordinator_pub_key: [String; 2],
    pub coord_pub_key_hash: String,
    pub messages: Vec<Vec<String>>,
    pub msg_path_elements: Vec<Vec<[String; 4]>>,
    pub msg_path_indices: Vec<Vec<String>>,
    pub enc_pub_keys: Vec<[String; 2]>,
    pub state_indices: Vec<String>,
    pub state_leaves: Vec<[String; 4]>,
    pub state_proofs: Vec<Vec<[String; 4]>>,
    pub state_path_indices: Vec<Vec<String>>,
    pub ballots: Vec<[String; 2]>,
    pub ballot_proofs: Vec<Vec<[String; 4]>>,
    pub ballot_path_indices: Vec<Vec<String>>,
    pub current_vote_weights: Vec<String>,
    pub current_vote_weights_proofs: Vec<Vec<[String; 4]>>,
    pub current_vote_weights_path_indices: Vec<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyVotesInput {
    pub input_hash: String,
    pub packed_vals: String,
    pub batch_num: String,
    pub num_sign_ups: String,
    pub state_root: String,
    pub ballot_root: String,
    pub sb_salt: String,
    pub sb_commitment: String,
    pub current_tally_commitment: String,
    pub new_tally_commitment: String,
    pub ballots: Vec<[String; 2]>,
    pub ballot_path_elements: Vec<[String; 4]>,
    pub ballot_path_indices: Vec<String>,
    pub votes: Vec<Vec<String>>,
    pub current_results: Vec<String>,
    pub current_results_root_salt: String,
    pub current_spent_voice_credit_subtotal: String,
    pub current_spent_voice_credit_subtotal_salt: String,
    #[serde(rename = "currentPerVOSpentVoiceCredits")]
    pub current_per_vo_spent_voice_credits: Vec<String>,
    #[serde(rename = "currentPerVOSpentVoiceCreditsRootSalt")]
    pub current_per_vo_spent_voice_credits_root_salt: String,
    pub new_results_root_salt: String,
    pub new_spent_voice_credit_subtotal_salt: String,
    #[serde(rename = "newPerVOSpentVoiceCreditsRootSalt")]
    pub new_per_vo_spent_voice_credits_root_salt: String,
}

/// Poll-wide values every process batch shares.
pub struct ProcessContext<'a> {
    pub coordinator: &'a Keypair,
    pub params: &'a ProcessParams,
    pub num_signups: u64,
    pub num_messages: u64,
    pub poll_end_timestamp: u64,
}

pub struct ProcessBatchInputs {
    pub input: ProcessMessagesInput,
    pub input_hash: Fr,
    pub current_state_commitment: Fr,
    pub new_state_commitment: Fr,
}

pub fn build_process_inputs(
    batch: &ProcessedBatch,
    ctx: &ProcessContext<'_>,
    current_salt: Fr,
    new_salt: Fr,
) -> Result<ProcessBatchInputs, ProverError> {
    if batch.entries.len() != ctx.params.batch_size {
        return Err(ProverError::InvalidInput(format!(
            "batch {} has {} entries, expected {}",
            batch.batch_num,
            batch.entries.len(),
            ctx.params.batch_size
        )));
    }

    let current_state_commitment =
        sb_commitment(batch.pre_roots.state, batch.pre_roots.ballot, current_salt);
    let new_state_commitment =
        sb_commitment(batch.post_roots.state, batch.post_roots.ballot, new_salt);
    let coord_pub_key_hash = ctx.coordinator.public.hash();
    let packed_vals = process_packed_vals(
        ctx.params.max_vote_options,
        ctx.num_signups,
        batch.batch_start_index,
        batch.batch_end_index,
    );
    let input_hash = compute_public_input_hash(&[
        packed_vals,
        coord_pub_key_hash,
        batch.pre_roots.message,
        current_state_commitment,
        new_state_commitment,
        Fr::from(ctx.poll_end_timestamp),
    ]);

    let entries = &batch.entries;
    let input = ProcessMessagesInput {
        input_hash: fr_to_decimal(&input_hash),
        packed_vals: fr_to_decimal(&packed_vals),
        poll_end_timestamp: ctx.poll_end_timestamp.to_string(),
        num_sign_ups: ctx.num_signups.to_string(),
        num_messages: ctx.num_messages.to_string(),
        batch_start_index: batch.batch_start_index.to_string(),
        batch_end_index: batch.batch_end_index.to_string(),
        max_vote_options: ctx.params.max_vote_options.to_string(),
        current_state_commitment: fr_to_decimal(&current_state_commitment),
        current_state_commitment_salt: fr_to_decimal(&current_salt),
        new_state_commitment: fr_to_decimal(&new_state_commitment),
        new_state_commitment_salt: fr_to_decimal(&new_salt),
        input_state_root: fr_to_decimal(&batch.pre_roots.state),
        output_state_root: fr_to_decimal(&batch.post_roots.state),
        input_ballot_root: fr_to_decimal(&batch.pre_roots.ballot),
        output_ballot_root: fr_to_decimal(&batch.post_roots.ballot),
        input_message_root: fr_to_decimal(&batch.pre_roots.message),
        coordinator_sk: fr_to_decimal(&ctx.coordinator.private.as_fr()),
        coordinator_pub_key: decimal_pair(ctx.coordinator.public.as_array()),
        coord_pub_key_hash: fr_to_decimal(&coord_pub_key_hash),
        messages: entries
            .iter()
            .map(|e| decimals(&e.message.data))
            .collect(),
        msg_path_elements: entries.iter().map(|e| path_elements(&e.message_proof)).collect(),
        msg_path_indices: entries.iter().map(|e| path_indices(&e.message_proof)).collect(),
        enc_pub_keys: entries
            .iter()
            .map(|e| decimal_pair(e.message.enc_pub_key.as_array()))
            .collect(),
        state_indices: entries.iter().map(|e| e.state_index.to_string()).collect(),
        state_leaves: entries.iter().map(|e| state_leaf_fields(&e.state_leaf)).collect(),
        state_proofs: entries.iter().map(|e| path_elements(&e.state_proof)).collect(),
        state_path_indices: entries.iter().map(|e| path_indices(&e.state_proof)).collect(),
        ballots: entries.iter().map(|e| ballot_fields(&e.ballot)).collect(),
        ballot_proofs: entries.iter().map(|e| path_elements(&e.ballot_proof)).collect(),
        ballot_path_indices: entries.iter().map(|e| path_indices(&e.ballot_proof)).collect(),
        current_vote_weights: entries
            .iter()
            .map(|e| e.current_vote_weight.to_string())
            .collect(),
        current_vote_weights_proofs: entries
            .iter()
            .map(|e| path_elements(&e.current_vote_weight_proof))
            .collect(),
        current_vote_weights_path_indices: entries
            .iter()
            .map(|e| path_indices(&e.current_vote_weight_proof))
            .collect(),
    };

    Ok(ProcessBatchInputs {
        input,
        input_hash,
        current_state_commitment,
        new_state_commitment,
    })
}

/// Poll-wide values every tally batch shares.
pub struct TallyContext<'a> {
    pub params: &'a ProcessParams,
    pub num_signups: u64,
    pub state_root: Fr,
    pub ballot_root: Fr,
    /// Salt of the final state commitment from message processing.
    pub sb_salt: Fr,
    pub mode: TallyCommitmentMode,
}

pub struct TallyBatchInputs {
    pub input: TallyVotesInput,
    pub input_hash: Fr,
    pub current_tally_commitment: Fr,
    pub new_tally_commitment: Fr,
}

pub fn build_tally_inputs(
    batch: &TallyBatch,
    ctx: &TallyContext<'_>,
    current_salts: &TallySalts,
    new_salts: &TallySalts,
) -> Result<TallyBatchInputs, ProverError> {
    let depth = ctx.params.vote_option_tree_depth;
    let real_sb_commitment = sb_commitment(ctx.state_root, ctx.ballot_root, ctx.sb_salt);
    let real_current_commitment = if batch.batch_num == 0 {
        Fr::ZERO
    } else {
        batch.current.commitment(depth, current_salts)?
    };
    let (sb_commitment_value, current_tally_commitment) = match ctx.mode {
        TallyCommitmentMode::Derived => (real_sb_commitment, real_current_commitment),
        TallyCommitmentMode::Zeroed => (Fr::ZERO, Fr::ZERO),
    };
    let new_tally_commitment = batch.new.commitment(depth, new_salts)?;

    let packed_vals = tally_packed_vals(ctx.num_signups, batch.batch_start_index);
    let input_hash = compute_public_input_hash(&[
        packed_vals,
        sb_commitment_value,
        current_tally_commitment,
        new_tally_commitment,
    ]);

    let current: &TallyState = &batch.current;
    let input = TallyVotesInput {
        input_hash: fr_to_decimal(&input_hash),
        packed_vals: fr_to_decimal(&packed_vals),
        batch_num: batch.batch_num.to_string(),
        num_sign_ups: ctx.num_signups.to_string(),
        state_root: fr_to_decimal(&ctx.state_root),
        ballot_root: fr_to_decimal(&ctx.ballot_root),
        sb_salt: fr_to_decimal(&ctx.sb_salt),
        sb_commitment: fr_to_decimal(&sb_commitment_value),
        current_tally_commitment: fr_to_decimal(&current_tally_commitment),
        new_tally_commitment: fr_to_decimal(&new_tally_commitment),
        ballots: batch.ballots.iter().map(ballot_fields).collect(),
        ballot_path_elements: path_elements(&batch.ballot_subroot_proof),
        ballot_path_indices: path_indices(&batch.ballot_subroot_proof),
        votes: batch
            .ballots
            .iter()
            .map(|b| b.votes().iter().map(u64::to_string).collect())
            .collect(),
        current_results: current.results.iter().map(u128::to_string).collect(),
        current_results_root_salt: fr_to_decimal(&current_salts.results),
        current_spent_voice_credit_subtotal: current.total_spent.to_string(),
        current_spent_voice_credit_subtotal_salt: fr_to_decimal(&current_salts.spent),
        current_per_vo_spent_voice_credits: current
            .per_vo_spent
            .iter()
            .map(u128::to_string)
            .collect(),
        current_per_vo_spent_voice_credits_root_salt: fr_to_decimal(&current_salts.per_vo_spent),
        new_results_root_salt: fr_to_decimal(&new_salts.results),
        new_spent_voice_credit_subtotal_salt: fr_to_decimal(&new_salts.spent),
        new_per_vo_spent_voice_credits_root_salt: fr_to_decimal(&new_salts.per_vo_spent),
    };

    Ok(TallyBatchInputs {
        input,
        input_hash,
        current_tally_commitment,
        new_tally_commitment,
    })
}

/// Running state-commitment salt: each batch's current salt is the previous
/// batch's new salt, starting from zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct SaltChain {
    current: Fr,
}

impl SaltChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Fr {
        self.current
    }

    /// Draw the next salt and return `(current, new)`.
    pub fn advance<R: RngCore>(&mut self, rng: &mut R) -> (Fr, Fr) {
        let new = random_salt(rng);
        let current = mem::replace(&mut self.current, new);
        (current, new)
    }
}

pub fn random_salt<R: RngCore>(rng: &mut R) -> Fr {
    Fr::random(rng)
}

pub fn random_tally_salts<R: RngCore>(rng: &mut R) -> TallySalts {
    TallySalts {
        results: random_salt(rng),
        spent: random_salt(rng),
        per_vo_spent: random_salt(rng),
    }
}

/// Inputs for every process batch with the state-commitment salt chained
/// through them. Also returns the final salt, which the tally needs.
pub fn chain_process_inputs<R: RngCore>(
    batches: &[ProcessedBatch],
    ctx: &ProcessContext<'_>,
    rng: &mut R,
) -> Result<(Vec<ProcessBatchInputs>, Fr), ProverError> {
    let mut chain = SaltChain::new();
    let mut inputs = Vec::with_capacity(batches.len());
    for batch in batches {
        let (current, new) = chain.advance(rng);
        inputs.push(build_process_inputs(batch, ctx, current, new)?);
    }
    Ok((inputs, chain.current()))
}

/// Inputs for every tally batch. Each batch's current salts are the previous
/// batch's new salts; the first batch starts from zero salts. Returns the
/// salts behind the final commitment.
pub fn chain_tally_inputs<R: RngCore>(
    tally: &Tally,
    ctx: &TallyContext<'_>,
    rng: &mut R,
) -> Result<(Vec<TallyBatchInputs>, TallySalts), ProverError> {
    let mut current = TallySalts::default();
    let mut inputs = Vec::with_capacity(tally.batches.len());
    for batch in &tally.batches {
        let new = random_tally_salts(rng);
        inputs.push(build_tally_inputs(batch, ctx, &current, &new)?);
        current = new;
    }
    Ok((inputs, current))
}

fn decimals(values: &[Fr]) -> Vec<String> {
    values.iter().map(fr_to_decimal).collect()
}

fn decimal_pair(values: [Fr; 2]) -> [String; 2] {
    [fr_to_decimal(&values[0]), fr_to_decimal(&values[1])]
}

fn path_elements(proof: &MerkleProof) -> Vec<[String; 4]> {
    proof
        .path_elements
        .iter()
        .map(|level| {
            [
                fr_to_decimal(&level[0]),
                fr_to_decimal(&level[1]),
                fr_to_decimal(&level[2]),
                fr_to_decimal(&level[3]),
            ]
        })
        .collect()
}

fn path_indices(proof: &MerkleProof) -> Vec<String> {
    proof.path_indices.iter().map(usize::to_string).collect()
}

fn state_leaf_fields(leaf: &StateLeaf) -> [String; 4] {
    [
        fr_to_decimal(&leaf.pub_key.x()),
        fr_to_decimal(&leaf.pub_key.y()),
        fr_to_decimal(&fr_from_u128(leaf.voice_credit_balance)),
        leaf.timestamp.to_string(),
    ]
}

fn ballot_fields(ballot: &Ballot) -> [String; 2] {
    [
        ballot.nonce.to_string(),
        fr_to_decimal(&ballot.vote_option_root()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn salt_chain_starts_at_zero_and_links() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let mut chain = SaltChain::new();
        let (first_current, first_new) = chain.advance(&mut rng);
        assert_eq!(first_current, Fr::ZERO);
        let (second_current, second_new) = chain.advance(&mut rng);
        assert_eq!(second_current, first_new);
        assert_eq!(chain.current(), second_new);
        assert_ne!(first_new, second_new);
    }

    #[test]
    fn tally_mode_parses_case_insensitively() {
        assert_eq!(
            "Zeroed".parse::<TallyCommitmentMode>().unwrap(),
            TallyCommitmentMode::Zeroed
        );
        assert_eq!(
            "derived".parse::<TallyCommitmentMode>().unwrap(),
            TallyCommitmentMode::Derived
        );
        assert!("maybe".parse::<TallyCommitmentMode>().is_err());
    }
}
