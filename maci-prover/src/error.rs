use std::path::PathBuf;

use maci_state::{ProcessorError, TreeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProverError {
    /// Missing or corrupt proving artifact. Fatal at startup.
    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("failed to read {path}: {source}")]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} for {circuit} exited with {status}: {stderr}")]
    ExternalTool {
        circuit: &'static str,
        stage: &'static str,
        status: String,
        stderr: String,
    },

    #[error("malformed proof output: {0}")]
    MalformedProof(String),

    #[error("public signal mismatch: circuit reported {reported}, expected {expected}")]
    PublicSignalMismatch { reported: String, expected: String },

    #[error("invalid circuit input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
