//! Poll scan loop.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use maci_common::Keypair;
use maci_prover::ProofGenerator;
use tracing::{debug, error, info};

use crate::{
    error::CoordinatorError,
    ledger::Ledger,
    pipeline::{PipelineSettings, PollOutcome, PollPipeline},
    redact::redact_address,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    VotingOpen,
    Finalized,
    AlreadyCompleted,
}

/// What one pass over the registry did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub completed: Vec<u64>,
    pub skipped: Vec<(u64, SkipReason)>,
    pub failed: Vec<u64>,
}

pub struct Coordinator {
    ledger: Arc<dyn Ledger>,
    prover: Arc<dyn ProofGenerator>,
    keypair: Keypair,
    settings: PipelineSettings,
    poll_interval: Duration,
    only_poll: Option<u64>,
    completed: BTreeSet<u64>,
}

impl Coordinator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        prover: Arc<dyn ProofGenerator>,
        keypair: Keypair,
        settings: PipelineSettings,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ledger,
            prover,
            keypair,
            settings,
            poll_interval,
            only_poll: None,
            completed: BTreeSet::new(),
        }
    }

    /// Restrict scanning to one poll id.
    pub fn with_poll_filter(mut self, poll_id: Option<u64>) -> Self {
        self.only_poll = poll_id;
        self
    }

    pub fn completed(&self) -> &BTreeSet<u64> {
        &self.completed
    }

    /// One pass over every poll id, ascending. A failing poll is logged and
    /// the pass moves on; only errors reading the registry itself abort it.
    pub async fn scan_once(&mut self) -> Result<ScanReport, CoordinatorError> {
        let next_poll_id = self.ledger.next_poll_id().await?;
        let mut report = ScanReport::default();
        debug!(next_poll_id, "scanning polls");

        for poll_id in 0..next_poll_id {
            if self.only_poll.is_some_and(|only| only != poll_id) {
                continue;
            }
            if self.completed.contains(&poll_id) {
                report.skipped.push((poll_id, SkipReason::AlreadyCompleted));
                continue;
            }
            match self.visit(poll_id).await {
                Ok(Some(reason)) => {
                    debug!(poll_id, ?reason, "skipping poll");
                    report.skipped.push((poll_id, reason));
                }
                Ok(None) => {
                    self.completed.insert(poll_id);
                    report.completed.push(poll_id);
                }
                Err(err) => {
                    error!(poll_id, error = %err, "poll pipeline failed, will retry next pass");
                    report.failed.push(poll_id);
                }
            }
        }

        Ok(report)
    }

    async fn visit(&self, poll_id: u64) -> Result<Option<SkipReason>, CoordinatorError> {
        let poll = self
            .ledger
            .poll_addresses(poll_id, self.settings.start_block)
            .await?;
        if self.ledger.is_voting_open(&poll).await? {
            return Ok(Some(SkipReason::VotingOpen));
        }
        if self.ledger.tally_verified(&poll).await? {
            return Ok(Some(SkipReason::Finalized));
        }

        info!(poll_id, poll = %redact_address(&poll.poll), "running poll pipeline");
        let pipeline = PollPipeline::new(
            self.ledger.as_ref(),
            self.prover.as_ref(),
            &self.keypair,
            &self.settings,
        );
        match pipeline.run(&poll).await? {
            PollOutcome::NoMessages => info!(poll_id, "poll closed without messages"),
            PollOutcome::Published(_) => info!(poll_id, "poll finalized"),
            PollOutcome::AlreadyFinalized => info!(poll_id, "poll was finalized concurrently"),
        }
        Ok(None)
    }

    /// Scan every `poll_interval` until ctrl-c.
    pub async fn run_daemon(&mut self) -> Result<(), CoordinatorError> {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "coordinator daemon started"
        );
        loop {
            match self.scan_once().await {
                Ok(report) => info!(
                    completed = report.completed.len(),
                    skipped = report.skipped.len(),
                    failed = report.failed.len(),
                    "scan finished"
                ),
                Err(err) => error!(error = %err, "scan failed"),
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
