//! Coordinator configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `MACI_*` environment variables (`MACI_RPC_URL`, `MACI_ETH_PRIVATE_KEY`,
//! ...). `.env` is loaded by the binary before this runs.

use std::{fmt, path::Path, time::Duration};

use config::{Config, Environment, File};
use maci_common::{Keypair, PrivKey};
use maci_prover::TallyCommitmentMode;
use maci_state::ProcessParams;
use serde::Deserialize;

use crate::{error::CoordinatorError, retry::RetryPolicy};

pub const ENV_PREFIX: &str = "MACI";

#[derive(Clone, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default)]
    pub registry_address: String,
    /// Ledger signing key, hex.
    #[serde(default)]
    pub eth_private_key: String,
    /// BabyJubJub private key used for message decryption, decimal.
    #[serde(default)]
    pub coordinator_private_key: String,
    #[serde(default)]
    pub artifacts_manifest: String,
    #[serde(default)]
    pub start_block: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_state_tree_depth")]
    pub state_tree_depth: usize,
    #[serde(default = "default_message_tree_depth")]
    pub message_tree_depth: usize,
    #[serde(default = "default_vote_option_tree_depth")]
    pub vote_option_tree_depth: usize,
    #[serde(default = "default_max_vote_options")]
    pub max_vote_options: u64,
    #[serde(default = "default_message_batch_size")]
    pub message_batch_size: usize,
    #[serde(default = "default_tally_batch_size")]
    pub tally_batch_size: usize,
    #[serde(default)]
    pub tally_commitment_mode: TallyCommitmentMode,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_state_tree_depth() -> usize {
    ProcessParams::default().state_tree_depth
}

fn default_message_tree_depth() -> usize {
    ProcessParams::default().message_tree_depth
}

fn default_vote_option_tree_depth() -> usize {
    ProcessParams::default().vote_option_tree_depth
}

fn default_max_vote_options() -> u64 {
    ProcessParams::default().max_vote_options
}

fn default_message_batch_size() -> usize {
    ProcessParams::default().batch_size
}

fn default_tally_batch_size() -> usize {
    5
}

impl CoordinatorConfig {
    /// Load from an optional TOML file overlaid with `MACI_*` variables and
    /// check that every required value is present.
    pub fn load(path: Option<&Path>) -> Result<Self, CoordinatorError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoordinatorError> {
        for (name, value) in [
            ("registry_address", &self.registry_address),
            ("eth_private_key", &self.eth_private_key),
            ("coordinator_private_key", &self.coordinator_private_key),
            ("artifacts_manifest", &self.artifacts_manifest),
        ] {
            if value.trim().is_empty() {
                return Err(CoordinatorError::Config(format!(
                    "{name} must be set (env {ENV_PREFIX}_{})",
                    name.to_ascii_uppercase()
                )));
            }
        }
        if self.max_retries == 0 {
            return Err(CoordinatorError::Config(
                "max_retries must be at least 1".into(),
            ));
        }
        if self.message_batch_size == 0 {
            return Err(CoordinatorError::Config(
                "message_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn coordinator_keypair(&self) -> Result<Keypair, CoordinatorError> {
        let private = PrivKey::from_decimal(&self.coordinator_private_key).map_err(|_| {
            CoordinatorError::Config("coordinator_private_key is not a valid scalar".into())
        })?;
        Ok(Keypair::from_private(private))
    }

    pub fn process_params(&self) -> ProcessParams {
        ProcessParams {
            state_tree_depth: self.state_tree_depth,
            message_tree_depth: self.message_tree_depth,
            vote_option_tree_depth: self.vote_option_tree_depth,
            max_vote_options: self.max_vote_options,
            batch_size: self.message_batch_size,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl fmt::Debug for CoordinatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorConfig")
            .field("rpc_url", &self.rpc_url)
            .field("registry_address", &self.registry_address)
            .field("eth_private_key", &"<redacted>")
            .field("coordinator_private_key", &"<redacted>")
            .field("artifacts_manifest", &self.artifacts_manifest)
            .field("start_block", &self.start_block)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("max_retries", &self.max_retries)
            .field("params", &self.process_params())
            .field("tally_batch_size", &self.tally_batch_size)
            .field("tally_commitment_mode", &self.tally_commitment_mode)
            .finish()
    }
}
