//! Per-poll coordinator pipeline.
//!
//! Every on-chain step is gated by the flag the contracts expose for it, so
//! re-running the pipeline on a poll that is partly or fully finished only
//! performs the steps that are still outstanding. State is always rebuilt
//! from events; nothing is carried between runs.

use halo2curves_axiom::bn256::Fr;
use maci_common::{fr_to_bytes, Keypair};
use maci_prover::{
    chain_process_inputs, chain_tally_inputs, prove_checked, Circuit, ProcessContext,
    ProofGenerator, TallyBatchInputs, TallyCommitmentMode, TallyContext,
};
use maci_state::{compute_tally, MessageProcessor, ProcessParams, Tally};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::{
    error::CoordinatorError,
    ingest::{fetch_messages, fetch_signups, from_fr},
    ledger::{Ledger, PollAddresses, PollResults},
};

const SALT_DOMAIN: &[u8] = b"maci-coordinator/commitment-salts/v1";

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub params: ProcessParams,
    pub tally_batch_size: usize,
    pub tally_mode: TallyCommitmentMode,
    /// First block scanned for events.
    pub start_block: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// No messages were published; empty results are on chain.
    NoMessages,
    /// Results were published by this run.
    Published(PollResults),
    /// The tally was already verified before this run reached it.
    AlreadyFinalized,
}

/// Tally batches ready to prove, plus what gets published.
struct TallyPlan {
    tally: Tally,
    batches: Vec<TallyBatchInputs>,
    results_hash: Fr,
}

pub struct PollPipeline<'a> {
    ledger: &'a dyn Ledger,
    prover: &'a dyn ProofGenerator,
    coordinator: &'a Keypair,
    settings: &'a PipelineSettings,
}

impl<'a> PollPipeline<'a> {
    pub fn new(
        ledger: &'a dyn Ledger,
        prover: &'a dyn ProofGenerator,
        coordinator: &'a Keypair,
        settings: &'a PipelineSettings,
    ) -> Self {
        Self {
            ledger,
            prover,
            coordinator,
            settings,
        }
    }

    pub async fn run(&self, poll: &PollAddresses) -> Result<PollOutcome, CoordinatorError> {
        let poll_id = poll.poll_id;
        self.merge(poll).await?;

        let to_block = self.ledger.latest_block().await?;
        let from_block = self.settings.start_block;
        let signups = fetch_signups(self.ledger, from_block, to_block).await?;
        let messages = fetch_messages(self.ledger, poll, from_block, to_block).await?;
        info!(
            poll_id,
            signups = signups.len(),
            messages = messages.len(),
            to_block,
            "rebuilt poll inputs from events"
        );

        if messages.is_empty() {
            if !self.ledger.tally_verified(poll).await? {
                info!(poll_id, "no messages, publishing empty results");
                self.ledger
                    .publish_results(poll, &PollResults::default())
                    .await?;
            }
            return Ok(PollOutcome::NoMessages);
        }

        let mut rng = salt_rng(self.coordinator, poll_id);
        let mut processor = MessageProcessor::new(
            self.settings.params,
            self.coordinator.clone(),
            &signups,
            &messages,
        )?;
        let batches = processor.process_all()?;

        let (deploy_time, duration) = self.ledger.deploy_time_and_duration(poll).await?;
        let ctx = ProcessContext {
            coordinator: self.coordinator,
            params: &self.settings.params,
            num_signups: processor.num_signups(),
            num_messages: processor.num_messages(),
            poll_end_timestamp: deploy_time.saturating_add(duration),
        };
        let (process_inputs, sb_salt) = chain_process_inputs(&batches, &ctx, &mut rng)?;

        if !self.ledger.processing_complete(poll).await? {
            for (batch, inputs) in batches.iter().zip(&process_inputs) {
                let input = serde_json::to_value(&inputs.input)?;
                let proof =
                    prove_checked(self.prover, Circuit::ProcessMessages, &input, inputs.input_hash)
                        .await?;
                let calldata = proof.proof.to_calldata()?;
                self.ledger
                    .process_messages(poll, from_fr(&inputs.new_state_commitment), &calldata)
                    .await?;
                info!(
                    poll_id,
                    batch = batch.batch_num,
                    applied = batch.applied(),
                    rejected = batch.rejected(),
                    "message batch proven and submitted"
                );
            }
            self.ledger.complete_processing(poll).await?;
            info!(poll_id, batches = batches.len(), "processing complete");
        }

        if self.ledger.tally_verified(poll).await? {
            return Ok(PollOutcome::AlreadyFinalized);
        }

        let roots = processor.roots();
        let tally_ctx = TallyContext {
            params: &self.settings.params,
            num_signups: processor.num_signups(),
            state_root: roots.state,
            ballot_root: roots.ballot,
            sb_salt,
            mode: self.settings.tally_mode,
        };
        let plan = self.plan_tally(&processor, &tally_ctx, &mut rng)?;
        if let Err(err) = self.submit_tally(poll, &plan).await {
            warn!(poll_id, error = %err, "tally submission failed, publishing results anyway");
        }

        if self.ledger.tally_verified(poll).await? {
            return Ok(PollOutcome::AlreadyFinalized);
        }
        let results = PollResults {
            for_votes: plan.tally.for_votes().into(),
            against_votes: plan.tally.against_votes().into(),
            abstain_votes: plan.tally.abstain_votes().into(),
            total_voters: plan.tally.total_voters.into(),
            tally_results_hash: from_fr(&plan.results_hash),
        };
        self.ledger.publish_results(poll, &results).await?;
        info!(
            poll_id,
            for_votes = %plan.tally.for_votes(),
            against_votes = %plan.tally.against_votes(),
            abstain_votes = %plan.tally.abstain_votes(),
            total_voters = plan.tally.total_voters,
            "results published"
        );
        Ok(PollOutcome::Published(results))
    }

    async fn merge(&self, poll: &PollAddresses) -> Result<(), CoordinatorError> {
        if !self.ledger.state_aq_merged(poll).await? {
            info!(poll_id = poll.poll_id, "merging state queue");
            self.ledger.merge_maci_state_aq_sub_roots(poll, 0).await?;
            self.ledger.merge_maci_state_aq(poll).await?;
        }
        if !self.ledger.message_aq_merged(poll).await? {
            info!(poll_id = poll.poll_id, "merging message queue");
            self.ledger.merge_message_aq_sub_roots(poll, 0).await?;
            self.ledger.merge_message_aq(poll).await?;
        }
        Ok(())
    }

    fn plan_tally(
        &self,
        processor: &MessageProcessor,
        ctx: &TallyContext<'_>,
        rng: &mut ChaCha20Rng,
    ) -> Result<TallyPlan, CoordinatorError> {
        let tally = compute_tally(processor, self.settings.tally_batch_size)?;
        let (batches, _) = chain_tally_inputs(&tally, ctx, rng)?;
        let results_hash = batches
            .last()
            .map(|batch| batch.new_tally_commitment)
            .unwrap_or(Fr::from(0u64));
        Ok(TallyPlan {
            tally,
            batches,
            results_hash,
        })
    }

    async fn submit_tally(
        &self,
        poll: &PollAddresses,
        plan: &TallyPlan,
    ) -> Result<(), CoordinatorError> {
        for (index, inputs) in plan.batches.iter().enumerate() {
            let input = serde_json::to_value(&inputs.input)?;
            let proof =
                prove_checked(self.prover, Circuit::TallyVotes, &input, inputs.input_hash).await?;
            let calldata = proof.proof.to_calldata()?;
            self.ledger
                .tally_votes(poll, from_fr(&inputs.new_tally_commitment), &calldata)
                .await?;
            info!(poll_id = poll.poll_id, batch = index, "tally batch proven and submitted");
        }
        Ok(())
    }
}

/// Salts are drawn from a generator keyed by the coordinator secret and the
/// poll id, so a re-run reproduces the commitments an earlier run submitted.
pub fn salt_rng(coordinator: &Keypair, poll_id: u64) -> ChaCha20Rng {
    let mut hasher = Sha256::new();
    hasher.update(SALT_DOMAIN);
    hasher.update(fr_to_bytes(&coordinator.private.as_fr()));
    hasher.update(poll_id.to_le_bytes());
    ChaCha20Rng::from_seed(hasher.finalize().into())
}
