use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use maci_prover::{load_artifacts, Circuit, ProofGenerator, RapidsnarkProver};

#[derive(Parser)]
#[command(about = "Prove a single MACI circuit input with the configured artifacts")]
struct Args {
    #[arg(long, default_value = "artifacts/manifest.json")]
    manifest: PathBuf,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Generate a proof for an input JSON file.
    Prove {
        #[arg(long)]
        circuit: Circuit,
        #[arg(long)]
        input: PathBuf,
        /// Where to write `{proof, public_signals}`.
        #[arg(long)]
        output: PathBuf,
        /// Also write the verifier calldata next to the proof.
        #[arg(long)]
        calldata: Option<PathBuf>,
    },
    /// Hash every artifact in the manifest and report mismatches.
    CheckArtifacts,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let artifacts = load_artifacts(&args.manifest)
        .with_context(|| format!("failed to load manifest {}", args.manifest.display()))?;

    match args.command {
        Cmd::CheckArtifacts => {
            tracing::info!(manifest = %args.manifest.display(), "all artifacts verified");
        }
        Cmd::Prove {
            circuit,
            input,
            output,
            calldata,
        } => {
            let json = fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let value: serde_json::Value =
                serde_json::from_str(&json).context("failed to parse circuit input json")?;

            let prover = RapidsnarkProver::new(artifacts);
            let proof = prover.generate(circuit, &value).await?;

            let bytes = serde_json::to_vec_pretty(&proof).context("failed to serialize proof")?;
            fs::write(&output, bytes)
                .with_context(|| format!("failed to write {}", output.display()))?;

            if let Some(path) = calldata {
                let calldata = proof.proof.to_calldata()?;
                let bytes = serde_json::to_vec_pretty(&calldata)?;
                fs::write(&path, bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
        }
    }

    Ok(())
}
