//! Deterministic poll fixtures shared by the workspace's test suites.
//!
//! Every key is drawn from a seeded ChaCha20 stream so roots, commitments and
//! ciphertexts are reproducible across runs and crates.

use anyhow::{ensure, Result};
use halo2curves_axiom::bn256::Fr;
use maci_common::{
    ecdh, Command, EncryptedMessage, Keypair, PrivKey, PubKey, StateLeaf, MESSAGE_DATA_LEN,
};
use once_cell::sync::Lazy;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

pub const COORDINATOR_SEED: u64 = 0x00c0_0d1a;
pub const VOTER_SEED: u64 = 0x5eed;
pub const DEFAULT_VOICE_CREDITS: u128 = 100;
pub const SIGNUP_TIMESTAMP: u64 = 1_700_000_000;
pub const POLL_ID: u64 = 0;

static COORDINATOR: Lazy<Keypair> =
    Lazy::new(|| Keypair::random(&mut ChaCha20Rng::seed_from_u64(COORDINATOR_SEED)));

/// The coordinator keypair every fixture encrypts to.
pub fn coordinator_keypair() -> Keypair {
    COORDINATOR.clone()
}

#[derive(Clone, Debug)]
pub struct Voter {
    pub state_index: u64,
    pub keypair: Keypair,
    pub balance: u128,
}

impl Voter {
    pub fn state_leaf(&self) -> StateLeaf {
        StateLeaf::new(
            self.keypair.public,
            self.balance,
            SIGNUP_TIMESTAMP + self.state_index,
        )
    }
}

/// A poll with registered voters and a growing list of published messages.
pub struct PollFixture {
    pub coordinator: Keypair,
    pub voters: Vec<Voter>,
    pub poll_id: u64,
    rng: ChaCha20Rng,
    messages: Vec<EncryptedMessage>,
}

impl PollFixture {
    pub fn new(num_voters: usize) -> Self {
        Self::with_credits(num_voters, DEFAULT_VOICE_CREDITS)
    }

    pub fn with_credits(num_voters: usize, credits: u128) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(VOTER_SEED);
        let voters = (0..num_voters)
            .map(|i| Voter {
                state_index: i as u64 + 1,
                keypair: Keypair::random(&mut rng),
                balance: credits,
            })
            .collect();
        Self {
            coordinator: coordinator_keypair(),
            voters,
            poll_id: POLL_ID,
            rng,
            messages: Vec::new(),
        }
    }

    pub fn signups(&self) -> Vec<StateLeaf> {
        self.voters.iter().map(Voter::state_leaf).collect()
    }

    /// Voter registered at `state_index` (1-based).
    pub fn voter(&self, state_index: u64) -> Result<&Voter> {
        ensure!(state_index >= 1, "state index 0 is the blank leaf");
        self.voters
            .get(state_index as usize - 1)
            .ok_or_else(|| anyhow::anyhow!("no voter at state index {state_index}"))
    }

    pub fn messages(&self) -> &[EncryptedMessage] {
        &self.messages
    }

    /// Publish a vote signed by the voter's own key that keeps that key.
    pub fn vote(
        &mut self,
        state_index: u64,
        vote_option_index: u64,
        new_vote_weight: u64,
        nonce: u64,
    ) -> Result<EncryptedMessage> {
        let voter = self.voter(state_index)?.clone();
        let command = Command {
            state_index,
            new_pub_key: voter.keypair.public,
            vote_option_index,
            new_vote_weight,
            nonce,
            poll_id: self.poll_id,
            salt: self.random_salt(),
        };
        Ok(self.publish_command(&command, &voter.keypair.private))
    }

    /// Sign `command` with `signer` and publish it, whatever its contents.
    pub fn publish_command(&mut self, command: &Command, signer: &PrivKey) -> EncryptedMessage {
        let signature = command.sign(signer);
        let ephemeral = Keypair::random(&mut self.rng);
        let data = ecdh(&ephemeral.private, &self.coordinator.public)
            .map(|key| command.encrypt(&signature, &key))
            .unwrap_or_default();
        let mut body = [Fr::from(0u64); MESSAGE_DATA_LEN];
        for (slot, value) in body.iter_mut().zip(data) {
            *slot = value;
        }
        self.publish_raw(body, ephemeral.public)
    }

    /// Publish arbitrary ciphertext under `enc_pub_key`.
    pub fn publish_raw(
        &mut self,
        data: [Fr; MESSAGE_DATA_LEN],
        enc_pub_key: PubKey,
    ) -> EncryptedMessage {
        let message = EncryptedMessage::new(data, enc_pub_key, self.messages.len() as u64);
        self.messages.push(message);
        message
    }

    pub fn random_salt(&mut self) -> Fr {
        Fr::from(self.rng.next_u64())
    }

    pub fn random_keypair(&mut self) -> Keypair {
        Keypair::random(&mut self.rng)
    }
}

/// One voter who spends 25 of 100 credits on five votes for option 0.
pub fn single_vote_poll() -> Result<PollFixture> {
    let mut poll = PollFixture::new(1);
    poll.vote(1, 0, 5, 1)?;
    Ok(poll)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_are_deterministic() {
        let a = single_vote_poll().unwrap();
        let b = single_vote_poll().unwrap();
        assert_eq!(a.messages(), b.messages());
        assert_eq!(a.signups(), b.signups());
        assert_eq!(a.coordinator.public, b.coordinator.public);
    }

    #[test]
    fn published_vote_decrypts_for_coordinator() {
        let poll = single_vote_poll().unwrap();
        let message = poll.messages()[0];
        let key = ecdh(&poll.coordinator.private, &message.enc_pub_key).unwrap();
        let (command, signature) = Command::decrypt(&message.data, &key).unwrap();
        assert_eq!(command.new_vote_weight, 5);
        assert!(command.verify(&signature, &poll.voters[0].keypair.public));
    }

    #[test]
    fn blank_index_has_no_voter() {
        let poll = PollFixture::new(2);
        assert!(poll.voter(0).is_err());
        assert!(poll.voter(3).is_err());
        assert_eq!(poll.voter(2).unwrap().state_index, 2);
    }
}
