//! Ledger access.
//!
//! The coordinator only ever talks to the chain through [`Ledger`]: view
//! calls, writes that wait for their receipt, and event queries over a block
//! range. [`EvmLedger`] is the ethers implementation.

mod confirm;
mod evm;

pub use confirm::{submit_and_confirm, ReceiptWait};

pub use evm::EvmLedger;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use maci_prover::ProofCalldata;

use crate::error::LedgerError;

/// Contracts deployed for one poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollAddresses {
    pub poll_id: u64,
    pub poll: Address,
    pub message_processor: Address,
    pub tally: Address,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignUpEvent {
    pub state_index: U256,
    pub pub_key_x: U256,
    pub pub_key_y: U256,
    pub voice_credit_balance: U256,
    pub timestamp: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagePublishedEvent {
    pub message_index: U256,
    pub enc_message: [U256; 10],
    pub enc_pub_key_x: U256,
    pub enc_pub_key_y: U256,
}

/// Arguments to `publishResults`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollResults {
    pub for_votes: U256,
    pub against_votes: U256,
    pub abstain_votes: U256,
    pub total_voters: U256,
    pub tally_results_hash: U256,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn latest_block(&self) -> Result<u64, LedgerError>;

    // Registry.
    async fn next_poll_id(&self) -> Result<u64, LedgerError>;
    async fn num_sign_ups(&self) -> Result<u64, LedgerError>;
    async fn poll_addresses(
        &self,
        poll_id: u64,
        from_block: u64,
    ) -> Result<PollAddresses, LedgerError>;
    async fn sign_up_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SignUpEvent>, LedgerError>;

    // Poll.
    async fn is_voting_open(&self, poll: &PollAddresses) -> Result<bool, LedgerError>;
    async fn deploy_time_and_duration(
        &self,
        poll: &PollAddresses,
    ) -> Result<(u64, u64), LedgerError>;
    async fn state_aq_merged(&self, poll: &PollAddresses) -> Result<bool, LedgerError>;
    async fn message_aq_merged(&self, poll: &PollAddresses) -> Result<bool, LedgerError>;
    async fn merge_maci_state_aq_sub_roots(
        &self,
        poll: &PollAddresses,
        num_queue_ops: u64,
    ) -> Result<H256, LedgerError>;
    async fn merge_maci_state_aq(&self, poll: &PollAddresses) -> Result<H256, LedgerError>;
    async fn merge_message_aq_sub_roots(
        &self,
        poll: &PollAddresses,
        num_queue_ops: u64,
    ) -> Result<H256, LedgerError>;
    async fn merge_message_aq(&self, poll: &PollAddresses) -> Result<H256, LedgerError>;
    async fn message_events(
        &self,
        poll: &PollAddresses,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<MessagePublishedEvent>, LedgerError>;

    // MessageProcessor.
    async fn processing_complete(&self, poll: &PollAddresses) -> Result<bool, LedgerError>;
    async fn process_messages(
        &self,
        poll: &PollAddresses,
        new_state_commitment: U256,
        proof: &ProofCalldata,
    ) -> Result<H256, LedgerError>;
    async fn complete_processing(&self, poll: &PollAddresses) -> Result<H256, LedgerError>;

    // Tally.
    async fn tally_verified(&self, poll: &PollAddresses) -> Result<bool, LedgerError>;
    async fn tally_votes(
        &self,
        poll: &PollAddresses,
        new_tally_commitment: U256,
        proof: &ProofCalldata,
    ) -> Result<H256, LedgerError>;
    async fn publish_results(
        &self,
        poll: &PollAddresses,
        results: &PollResults,
    ) -> Result<H256, LedgerError>;
}

/// Calldata strings back to the verifier's `uint256` arrays.
pub fn proof_words(proof: &ProofCalldata) -> Result<([U256; 2], [[U256; 2]; 2], [U256; 2]), LedgerError> {
    let word = |value: &String| {
        U256::from_dec_str(value)
            .map_err(|err| LedgerError::Decode(format!("proof coordinate {value:?}: {err}")))
    };
    Ok((
        [word(&proof.p_a[0])?, word(&proof.p_a[1])?],
        [
            [word(&proof.p_b[0][0])?, word(&proof.p_b[0][1])?],
            [word(&proof.p_b[1][0])?, word(&proof.p_b[1][1])?],
        ],
        [word(&proof.p_c[0])?, word(&proof.p_c[1])?],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_words_parse_decimal_coordinates() {
        let calldata = ProofCalldata {
            p_a: ["1".into(), "2".into()],
            p_b: [["3".into(), "4".into()], ["5".into(), "6".into()]],
            p_c: ["7".into(), "8".into()],
        };
        let (a, b, c) = proof_words(&calldata).unwrap();
        assert_eq!(a, [U256::from(1), U256::from(2)]);
        assert_eq!(b[1], [U256::from(5), U256::from(6)]);
        assert_eq!(c, [U256::from(7), U256::from(8)]);

        let bad = ProofCalldata {
            p_a: ["0x1".into(), "2".into()],
            ..calldata
        };
        assert!(matches!(proof_words(&bad), Err(LedgerError::Decode(_))));
    }
}
