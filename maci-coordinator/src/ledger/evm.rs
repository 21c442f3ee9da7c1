//! ethers-backed ledger client.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    abi::Detokenize,
    contract::{ContractCall, ContractError},
    prelude::*,
    types::{Address, BlockNumber, H256, U256, U64},
};
use tracing::info;

use super::{
    confirm::{submit_and_confirm, ReceiptWait},
    proof_words, Ledger, MessagePublishedEvent, PollAddresses, PollResults, SignUpEvent,
};
use crate::{
    error::{CoordinatorError, LedgerError},
    redact::{redact_address, redact_tx},
    retry::RetryPolicy,
};
use maci_prover::ProofCalldata;

abigen!(
    MaciRegistry,
    r#"[
        function nextPollId() external view returns (uint256)
        function numSignUps() external view returns (uint256)
        function polls(uint256 pollId) external view returns (address)
        event SignUp(uint256 stateIndex, uint256 pubKeyX, uint256 pubKeyY, uint256 voiceCreditBalance, uint256 timestamp)
        event DeployPoll(uint256 pollId, address pollAddr, address messageProcessorAddr, address tallyAddr)
    ]"#
);

abigen!(
    MaciPoll,
    r#"[
        function isVotingOpen() external view returns (bool)
        function getDeployTimeAndDuration() external view returns (uint256, uint256)
        function stateAqMerged() external view returns (bool)
        function messageAqMerged() external view returns (bool)
        function mergeMaciStateAqSubRoots(uint256 numSrQueueOps) external
        function mergeMaciStateAq() external
        function mergeMessageAqSubRoots(uint256 numSrQueueOps) external
        function mergeMessageAq() external
        event MessagePublished(uint256 messageIndex, uint256[10] encMessage, uint256 encPubKeyX, uint256 encPubKeyY)
    ]"#
);

abigen!(
    MaciMessageProcessor,
    r#"[
        function processMessages(uint256 newStateCommitment, uint256[2] pA, uint256[2][2] pB, uint256[2] pC) external
        function processingComplete() external view returns (bool)
        function completeProcessing() external
    ]"#
);

abigen!(
    MaciTally,
    r#"[
        function tallyVotes(uint256 newTallyCommitment, uint256[2] pA, uint256[2][2] pB, uint256[2] pC) external
        function publishResults(uint256 forVotes, uint256 againstVotes, uint256 abstainVotes, uint256 totalVoters, uint256 tallyResultsHash) external
        function tallyVerified() external view returns (bool)
    ]"#
);

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

pub struct EvmLedger {
    client: Arc<Client>,
    registry: MaciRegistry<Client>,
    retry: RetryPolicy,
    receipt_wait: ReceiptWait,
}

impl EvmLedger {
    /// Connect to `rpc_url`, reading the chain id from the node.
    pub async fn connect(
        rpc_url: &str,
        registry_address: &str,
        eth_private_key: &str,
        retry: RetryPolicy,
    ) -> Result<Self, CoordinatorError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|err| CoordinatorError::Config(format!("invalid rpc url: {err}")))?;
        // Never echo the key back in the error.
        let wallet: LocalWallet = eth_private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .map_err(|_| CoordinatorError::Config("invalid ledger signing key".into()))?;
        let registry_address: Address = registry_address.parse().map_err(|err| {
            CoordinatorError::Config(format!("invalid registry address: {err}"))
        })?;

        let chain_id = retry
            .run("eth_chainId", || async {
                provider
                    .get_chainid()
                    .await
                    .map_err(|err| LedgerError::from_transport("eth_chainId", err))
            })
            .await?;
        let wallet = wallet.with_chain_id(chain_id.as_u64());
        info!(
            chain_id = chain_id.as_u64(),
            signer = %redact_address(&wallet.address()),
            registry = %redact_address(&registry_address),
            "connected to ledger"
        );

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let registry = MaciRegistry::new(registry_address, client.clone());
        Ok(Self {
            client,
            registry,
            retry,
            receipt_wait: ReceiptWait::default(),
        })
    }

    fn poll(&self, poll: &PollAddresses) -> MaciPoll<Client> {
        MaciPoll::new(poll.poll, self.client.clone())
    }

    fn message_processor(&self, poll: &PollAddresses) -> MaciMessageProcessor<Client> {
        MaciMessageProcessor::new(poll.message_processor, self.client.clone())
    }

    fn tally(&self, poll: &PollAddresses) -> MaciTally<Client> {
        MaciTally::new(poll.tally, self.client.clone())
    }

    async fn view<T, F>(&self, call: &'static str, build: F) -> Result<T, LedgerError>
    where
        T: Detokenize + Send,
        F: Fn() -> ContractCall<Client, T> + Send + Sync,
    {
        self.retry
            .run(call, || async {
                build()
                    .call()
                    .await
                    .map_err(|err| contract_error(call, err))
            })
            .await
    }

    /// Send a write and wait for its receipt. The transaction is broadcast
    /// at most once; a failed wait polls the same hash again.
    async fn send<F>(&self, call: &'static str, build: F) -> Result<H256, LedgerError>
    where
        F: Fn() -> ContractCall<Client, ()> + Send + Sync,
    {
        let receipt = submit_and_confirm(
            &self.retry,
            &self.receipt_wait,
            call,
            || async {
                let tx = build();
                let pending = tx.send().await.map_err(|err| contract_error(call, err))?;
                Ok(pending.tx_hash())
            },
            |tx_hash| async move {
                self.client
                    .get_transaction_receipt(tx_hash)
                    .await
                    .map_err(|err| LedgerError::from_transport(call, err))
            },
        )
        .await?;
        if receipt.status == Some(U64::zero()) {
            return Err(LedgerError::Reverted {
                call,
                message: format!(
                    "transaction {} failed",
                    redact_tx(&receipt.transaction_hash)
                ),
            });
        }
        info!(call, tx = %redact_tx(&receipt.transaction_hash), "confirmed");
        Ok(receipt.transaction_hash)
    }
}

fn contract_error(call: &'static str, err: ContractError<Client>) -> LedgerError {
    if err.is_revert() {
        LedgerError::Reverted {
            call,
            message: err.to_string(),
        }
    } else {
        LedgerError::from_transport(call, err)
    }
}

fn to_u64(what: &str, value: U256) -> Result<u64, LedgerError> {
    if value > U256::from(u64::MAX) {
        return Err(LedgerError::Decode(format!("{what} {value} does not fit in u64")));
    }
    Ok(value.as_u64())
}

#[async_trait]
impl Ledger for EvmLedger {
    async fn latest_block(&self) -> Result<u64, LedgerError> {
        let block = self
            .retry
            .run("eth_blockNumber", || async {
                self.client
                    .get_block_number()
                    .await
                    .map_err(|err| LedgerError::from_transport("eth_blockNumber", err))
            })
            .await?;
        Ok(block.as_u64())
    }

    async fn next_poll_id(&self) -> Result<u64, LedgerError> {
        let id = self.view("nextPollId", || self.registry.next_poll_id()).await?;
        to_u64("nextPollId", id)
    }

    async fn num_sign_ups(&self) -> Result<u64, LedgerError> {
        let count = self.view("numSignUps", || self.registry.num_sign_ups()).await?;
        to_u64("numSignUps", count)
    }

    async fn poll_addresses(
        &self,
        poll_id: u64,
        from_block: u64,
    ) -> Result<PollAddresses, LedgerError> {
        let registered = self
            .view("polls", || self.registry.polls(U256::from(poll_id)))
            .await?;
        if registered == Address::zero() {
            return Err(LedgerError::UnknownPoll(poll_id));
        }

        let events = self
            .retry
            .run("DeployPoll", || async {
                self.registry
                    .deploy_poll_filter()
                    .from_block(from_block)
                    .to_block(BlockNumber::Latest)
                    .query()
                    .await
                    .map_err(|err| contract_error("DeployPoll", err))
            })
            .await?;
        let deployed = events
            .into_iter()
            .find(|event| event.poll_id == U256::from(poll_id))
            .ok_or(LedgerError::UnknownPoll(poll_id))?;
        if deployed.poll_addr != registered {
            return Err(LedgerError::Decode(format!(
                "poll {poll_id} registered at {} but deployed at {}",
                redact_address(&registered),
                redact_address(&deployed.poll_addr)
            )));
        }

        Ok(PollAddresses {
            poll_id,
            poll: deployed.poll_addr,
            message_processor: deployed.message_processor_addr,
            tally: deployed.tally_addr,
        })
    }

    async fn sign_up_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SignUpEvent>, LedgerError> {
        let events = self
            .retry
            .run("SignUp", || async {
                self.registry
                    .sign_up_filter()
                    .from_block(from_block)
                    .to_block(to_block)
                    .query()
                    .await
                    .map_err(|err| contract_error("SignUp", err))
            })
            .await?;
        Ok(events
            .into_iter()
            .map(|event| SignUpEvent {
                state_index: event.state_index,
                pub_key_x: event.pub_key_x,
                pub_key_y: event.pub_key_y,
                voice_credit_balance: event.voice_credit_balance,
                timestamp: event.timestamp,
            })
            .collect())
    }

    async fn is_voting_open(&self, poll: &PollAddresses) -> Result<bool, LedgerError> {
        let contract = self.poll(poll);
        self.view("isVotingOpen", || contract.is_voting_open()).await
    }

    async fn deploy_time_and_duration(
        &self,
        poll: &PollAddresses,
    ) -> Result<(u64, u64), LedgerError> {
        let contract = self.poll(poll);
        let (deploy_time, duration) = self
            .view("getDeployTimeAndDuration", || {
                contract.get_deploy_time_and_duration()
            })
            .await?;
        Ok((
            to_u64("deployTime", deploy_time)?,
            to_u64("duration", duration)?,
        ))
    }

    async fn state_aq_merged(&self, poll: &PollAddresses) -> Result<bool, LedgerError> {
        let contract = self.poll(poll);
        self.view("stateAqMerged", || contract.state_aq_merged()).await
    }

    async fn message_aq_merged(&self, poll: &PollAddresses) -> Result<bool, LedgerError> {
        let contract = self.poll(poll);
        self.view("messageAqMerged", || contract.message_aq_merged()).await
    }

    async fn merge_maci_state_aq_sub_roots(
        &self,
        poll: &PollAddresses,
        num_queue_ops: u64,
    ) -> Result<H256, LedgerError> {
        let contract = self.poll(poll);
        self.send("mergeMaciStateAqSubRoots", || {
            contract.merge_maci_state_aq_sub_roots(U256::from(num_queue_ops))
        })
        .await
    }

    async fn merge_maci_state_aq(&self, poll: &PollAddresses) -> Result<H256, LedgerError> {
        let contract = self.poll(poll);
        self.send("mergeMaciStateAq", || contract.merge_maci_state_aq())
            .await
    }

    async fn merge_message_aq_sub_roots(
        &self,
        poll: &PollAddresses,
        num_queue_ops: u64,
    ) -> Result<H256, LedgerError> {
        let contract = self.poll(poll);
        self.send("mergeMessageAqSubRoots", || {
            contract.merge_message_aq_sub_roots(U256::from(num_queue_ops))
        })
        .await
    }

    async fn merge_message_aq(&self, poll: &PollAddresses) -> Result<H256, LedgerError> {
        let contract = self.poll(poll);
        self.send("mergeMessageAq", || contract.merge_message_aq()).await
    }

    async fn message_events(
        &self,
        poll: &PollAddresses,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<MessagePublishedEvent>, LedgerError> {
        let contract = self.poll(poll);
        let events = self
            .retry
            .run("MessagePublished", || async {
                contract
                    .message_published_filter()
                    .from_block(from_block)
                    .to_block(to_block)
                    .query()
                    .await
                    .map_err(|err| contract_error("MessagePublished", err))
            })
            .await?;
        Ok(events
            .into_iter()
            .map(|event| MessagePublishedEvent {
                message_index: event.message_index,
                enc_message: event.enc_message,
                enc_pub_key_x: event.enc_pub_key_x,
                enc_pub_key_y: event.enc_pub_key_y,
            })
            .collect())
    }

    async fn processing_complete(&self, poll: &PollAddresses) -> Result<bool, LedgerError> {
        let contract = self.message_processor(poll);
        self.view("processingComplete", || contract.processing_complete())
            .await
    }

    async fn process_messages(
        &self,
        poll: &PollAddresses,
        new_state_commitment: U256,
        proof: &ProofCalldata,
    ) -> Result<H256, LedgerError> {
        let (p_a, p_b, p_c) = proof_words(proof)?;
        let contract = self.message_processor(poll);
        self.send("processMessages", || {
            contract.process_messages(new_state_commitment, p_a, p_b, p_c)
        })
        .await
    }

    async fn complete_processing(&self, poll: &PollAddresses) -> Result<H256, LedgerError> {
        let contract = self.message_processor(poll);
        self.send("completeProcessing", || contract.complete_processing())
            .await
    }

    async fn tally_verified(&self, poll: &PollAddresses) -> Result<bool, LedgerError> {
        let contract = self.tally(poll);
        self.view("tallyVerified", || contract.tally_verified()).await
    }

    async fn tally_votes(
        &self,
        poll: &PollAddresses,
        new_tally_commitment: U256,
        proof: &ProofCalldata,
    ) -> Result<H256, LedgerError> {
        let (p_a, p_b, p_c) = proof_words(proof)?;
        let contract = self.tally(poll);
        self.send("tallyVotes", || {
            contract.tally_votes(new_tally_commitment, p_a, p_b, p_c)
        })
        .await
    }

    async fn publish_results(
        &self,
        poll: &PollAddresses,
        results: &PollResults,
    ) -> Result<H256, LedgerError> {
        let contract = self.tally(poll);
        self.send("publishResults", || {
            contract.publish_results(
                results.for_votes,
                results.against_votes,
                results.abstain_votes,
                results.total_voters,
                results.tally_results_hash,
            )
        })
        .await
    }
}
