use maci_common::CryptoError;
use maci_prover::ProverError;
use maci_state::{ProcessorError, TreeError};
use thiserror::Error;

/// Failures talking to the ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Transport or node error. Retried when the message looks transient.
    #[error("rpc error during {call}: {message}")]
    Rpc { call: &'static str, message: String },

    #[error("timed out during {call}: {message}")]
    Timeout { call: &'static str, message: String },

    /// The contract rejected the call. Never retried.
    #[error("{call} reverted: {message}")]
    Reverted { call: &'static str, message: String },

    #[error("{call} was dropped before a receipt was available")]
    MissingReceipt { call: &'static str },

    #[error("no DeployPoll event for poll {0}")]
    UnknownPoll(u64),

    #[error("malformed ledger data: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Wrap a transport error, separating timeouts from other failures.
    pub fn from_transport(call: &'static str, err: impl std::fmt::Display) -> Self {
        let message = err.to_string();
        let lower = message.to_ascii_lowercase();
        if lower.contains("timed out") || lower.contains("timeout") {
            LedgerError::Timeout { call, message }
        } else {
            LedgerError::Rpc { call, message }
        }
    }

    /// Text the retry classifier inspects. Reverts and decode failures are
    /// never transient, whatever their text says.
    pub fn transient_text(&self) -> Option<&str> {
        match self {
            LedgerError::Rpc { message, .. } | LedgerError::Timeout { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigSource(#[from] config::ConfigError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Prover(#[from] ProverError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
