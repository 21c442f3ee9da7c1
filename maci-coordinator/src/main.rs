use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use maci_coordinator::{
    Coordinator, CoordinatorConfig, EvmLedger, Ledger, PipelineSettings,
};
use maci_prover::{load_artifacts, ProofGenerator, RapidsnarkProver};

#[derive(Parser)]
#[command(about = "Process, prove and tally finished MACI polls")]
struct Args {
    /// TOML file layered under `MACI_*` environment variables.
    #[arg(long, env = "MACI_CONFIG")]
    config: Option<PathBuf>,
    /// Single pass over the registry, then exit.
    #[arg(long)]
    once: bool,
    /// Only handle this poll id.
    #[arg(long)]
    poll_id: Option<u64>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "maci_coordinator=info,maci_state=info,maci_prover=info".into()
    });
    let json = std::env::var("MACI_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = CoordinatorConfig::load(args.config.as_deref())
        .context("failed to load coordinator configuration")?;
    let keypair = config.coordinator_keypair()?;

    // Missing or corrupt artifacts stop us before anything touches the chain.
    let artifacts = load_artifacts(&config.artifacts_manifest).with_context(|| {
        format!("failed to load proving artifacts {}", config.artifacts_manifest)
    })?;
    let prover: Arc<dyn ProofGenerator> = Arc::new(RapidsnarkProver::new(artifacts));

    let ledger: Arc<dyn Ledger> = Arc::new(
        EvmLedger::connect(
            &config.rpc_url,
            &config.registry_address,
            &config.eth_private_key,
            config.retry_policy(),
        )
        .await
        .context("failed to connect to ledger")?,
    );

    info!(?config, once = args.once, poll_id = ?args.poll_id, "starting maci-coordinator");

    let settings = PipelineSettings {
        params: config.process_params(),
        tally_batch_size: config.tally_batch_size,
        tally_mode: config.tally_commitment_mode,
        start_block: config.start_block,
    };
    let mut coordinator = Coordinator::new(ledger, prover, keypair, settings, config.poll_interval())
        .with_poll_filter(args.poll_id);

    if args.once {
        let report = coordinator.scan_once().await?;
        info!(
            completed = ?report.completed,
            skipped = report.skipped.len(),
            failed = ?report.failed,
            "single pass finished"
        );
        anyhow::ensure!(report.failed.is_empty(), "polls failed: {:?}", report.failed);
    } else {
        coordinator.run_daemon().await?;
    }

    Ok(())
}
