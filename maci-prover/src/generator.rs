//! External Groth16 proof generation.
//!
//! Proving runs two child processes per circuit: the circuit's compiled
//! witness generator turns `input.json` into `witness.wtns`, then the prover
//! binary turns the witness and zkey into `proof.json` and `public.json`.
//! Every call works in its own temporary directory.

use std::{path::Path, process::Output};

use async_trait::async_trait;
use halo2curves_axiom::bn256::Fr;
use maci_common::{fr_from_decimal, fr_to_decimal};
use tokio::process::Command;
use tracing::{debug, info};

use crate::{
    artifacts::{Circuit, VerifiedArtifacts},
    error::ProverError,
    proof::{GeneratedProof, Groth16Proof},
};

const INPUT_FILE: &str = "input.json";
const WITNESS_FILE: &str = "witness.wtns";
const PROOF_FILE: &str = "proof.json";
const PUBLIC_FILE: &str = "public.json";

#[async_trait]
pub trait ProofGenerator: Send + Sync {
    async fn generate(
        &self,
        circuit: Circuit,
        input: &serde_json::Value,
    ) -> Result<GeneratedProof, ProverError>;
}

/// Shells out to a compiled witness generator and a rapidsnark-compatible
/// prover described by a verified manifest.
#[derive(Clone, Debug)]
pub struct RapidsnarkProver {
    artifacts: VerifiedArtifacts,
}

impl RapidsnarkProver {
    pub fn new(artifacts: VerifiedArtifacts) -> Self {
        Self { artifacts }
    }

    pub fn artifacts(&self) -> &VerifiedArtifacts {
        &self.artifacts
    }
}

#[async_trait]
impl ProofGenerator for RapidsnarkProver {
    async fn generate(
        &self,
        circuit: Circuit,
        input: &serde_json::Value,
    ) -> Result<GeneratedProof, ProverError> {
        let workdir = tempfile::tempdir()?;
        let dir = workdir.path();
        tokio::fs::write(dir.join(INPUT_FILE), serde_json::to_vec(input)?).await?;

        let witness_generator = self.artifacts.witness_generator(circuit);
        debug!(%circuit, generator = %witness_generator.display(), "generating witness");
        let output = Command::new(&witness_generator)
            .arg(dir.join(INPUT_FILE))
            .arg(dir.join(WITNESS_FILE))
            .output()
            .await?;
        check_status(circuit, "witness generation", &output)?;

        let prover = self.artifacts.prover_binary();
        debug!(%circuit, prover = %prover.display(), "proving");
        let output = Command::new(&prover)
            .arg(self.artifacts.zkey(circuit))
            .arg(dir.join(WITNESS_FILE))
            .arg(dir.join(PROOF_FILE))
            .arg(dir.join(PUBLIC_FILE))
            .output()
            .await?;
        check_status(circuit, "proving", &output)?;

        let generated = read_outputs(dir).await?;
        info!(%circuit, public_signals = generated.public_signals.len(), "proof generated");
        Ok(generated)
    }
}

async fn read_outputs(dir: &Path) -> Result<GeneratedProof, ProverError> {
    let proof_bytes = tokio::fs::read(dir.join(PROOF_FILE)).await?;
    let proof: Groth16Proof = serde_json::from_slice(&proof_bytes)
        .map_err(|err| ProverError::MalformedProof(format!("proof.json: {err}")))?;
    let public_bytes = tokio::fs::read(dir.join(PUBLIC_FILE)).await?;
    let public_signals: Vec<String> = serde_json::from_slice(&public_bytes)
        .map_err(|err| ProverError::MalformedProof(format!("public.json: {err}")))?;
    Ok(GeneratedProof {
        proof,
        public_signals,
    })
}

fn check_status(circuit: Circuit, stage: &'static str, output: &Output) -> Result<(), ProverError> {
    if output.status.success() {
        return Ok(());
    }
    Err(ProverError::ExternalTool {
        circuit: circuit.name(),
        stage,
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// The circuits expose a single public signal, the input digest. Refuse to
/// hand a proof on when it disagrees with the digest computed locally.
pub fn ensure_public_signal(proof: &GeneratedProof, expected: Fr) -> Result<(), ProverError> {
    let reported = proof
        .public_signals
        .first()
        .ok_or_else(|| ProverError::MalformedProof("no public signals".into()))?;
    let parsed = fr_from_decimal(reported)
        .map_err(|err| ProverError::MalformedProof(format!("public signal {reported:?}: {err}")))?;
    if parsed != expected {
        return Err(ProverError::PublicSignalMismatch {
            reported: reported.clone(),
            expected: fr_to_decimal(&expected),
        });
    }
    Ok(())
}

/// Generate a proof and check its public signal in one step.
pub async fn prove_checked<P: ProofGenerator + ?Sized>(
    prover: &P,
    circuit: Circuit,
    input: &serde_json::Value,
    expected_input_hash: Fr,
) -> Result<GeneratedProof, ProverError> {
    let proof = prover.generate(circuit, input).await?;
    ensure_public_signal(&proof, expected_input_hash)?;
    Ok(proof)
}
