//! Turns processed MACI batches into circuit inputs and Groth16 proofs.
//!
//! Proving itself is delegated to external binaries through
//! [`ProofGenerator`]; this crate owns the input layout, the salt chains,
//! the public input digest and the artifact manifest.

pub mod artifacts;
pub mod error;
pub mod generator;
pub mod hash;
pub mod inputs;
pub mod proof;

pub use artifacts::{
    load_artifacts, read_manifest, write_manifest, ArtifactFile, ArtifactManifest, Circuit,
    CircuitArtifacts, VerifiedArtifacts, MANIFEST_FILE, MANIFEST_VERSION,
};
pub use error::ProverError;
pub use generator::{ensure_public_signal, prove_checked, ProofGenerator, RapidsnarkProver};
pub use hash::{compute_public_input_hash, pack_values, process_packed_vals, tally_packed_vals};
pub use inputs::{
    build_process_inputs, build_tally_inputs, chain_process_inputs, chain_tally_inputs,
    random_salt, random_tally_salts, ProcessBatchInputs, ProcessContext, ProcessMessagesInput,
    SaltChain, TallyBatchInputs, TallyCommitmentMode, TallyContext, TallyVotesInput,
};
pub use proof::{GeneratedProof, Groth16Proof, ProofCalldata};
