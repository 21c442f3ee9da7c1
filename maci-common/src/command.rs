//! The signed vote command carried inside every encrypted message.

use halo2curves_axiom::{bn256::Fr, ff::Field};
use num_bigint::BigUint;

use crate::{
    cipher,
    keys::{sign, verify_signature, PrivKey, PubKey, SharedKey, Signature},
    poseidon::hash,
    types::MESSAGE_NONCE,
    fr_to_biguint,
};

pub const PACKED_FIELD_BITS: usize = 50;
const PACKED_FIELD_MASK: u64 = (1 << PACKED_FIELD_BITS) - 1;

/// `[packed, newPubKeyX, newPubKeyY, salt, R8x, R8y, S]`.
pub const COMMAND_PLAINTEXT_LEN: usize = 7;

/// The five integer fields of a command, packed 50 bits apart into one field
/// element: `nonce | stateIndex<<50 | voteOptionIndex<<100 |
/// newVoteWeight<<150 | pollId<<200`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackedCommand {
    pub nonce: u64,
    pub state_index: u64,
    pub vote_option_index: u64,
    pub new_vote_weight: u64,
    pub poll_id: u64,
}

impl PackedCommand {
    /// Each field is masked to 50 bits before packing.
    pub fn pack(&self) -> Fr {
        let shift = Fr::from(1u64 << PACKED_FIELD_BITS);
        [
            self.poll_id,
            self.new_vote_weight,
            self.vote_option_index,
            self.state_index,
            self.nonce,
        ]
        .iter()
        .fold(Fr::ZERO, |acc, field| {
            acc * shift + Fr::from(field & PACKED_FIELD_MASK)
        })
    }

    pub fn unpack(packed: &Fr) -> Self {
        let value = fr_to_biguint(packed);
        let field = |slot: usize| -> u64 {
            let shifted: BigUint = &value >> (slot * PACKED_FIELD_BITS);
            shifted.iter_u64_digits().next().unwrap_or(0) & PACKED_FIELD_MASK
        };
        Self {
            nonce: field(0),
            state_index: field(1),
            vote_option_index: field(2),
            new_vote_weight: field(3),
            poll_id: field(4),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub state_index: u64,
    pub new_pub_key: PubKey,
    pub vote_option_index: u64,
    pub new_vote_weight: u64,
    pub nonce: u64,
    pub poll_id: u64,
    pub salt: Fr,
}

impl Command {
    pub fn packed(&self) -> PackedCommand {
        PackedCommand {
            nonce: self.nonce,
            state_index: self.state_index,
            vote_option_index: self.vote_option_index,
            new_vote_weight: self.new_vote_weight,
            poll_id: self.poll_id,
        }
    }

    pub fn from_parts(packed: PackedCommand, new_pub_key: PubKey, salt: Fr) -> Self {
        Self {
            state_index: packed.state_index,
            new_pub_key,
            vote_option_index: packed.vote_option_index,
            new_vote_weight: packed.new_vote_weight,
            nonce: packed.nonce,
            poll_id: packed.poll_id,
            salt,
        }
    }

    /// `hash([packed, newPubKeyX, newPubKeyY, salt])`, the signed digest.
    pub fn hash(&self) -> Fr {
        hash(&[
            self.packed().pack(),
            self.new_pub_key.x(),
            self.new_pub_key.y(),
            self.salt,
        ])
    }

    pub fn sign(&self, private: &PrivKey) -> Signature {
        sign(private, self.hash())
    }

    pub fn verify(&self, signature: &Signature, public: &PubKey) -> bool {
        verify_signature(self.hash(), signature, public)
    }

    pub fn to_plaintext(&self, signature: &Signature) -> [Fr; COMMAND_PLAINTEXT_LEN] {
        let [r8x, r8y, s] = signature.to_fields();
        [
            self.packed().pack(),
            self.new_pub_key.x(),
            self.new_pub_key.y(),
            self.salt,
            r8x,
            r8y,
            s,
        ]
    }

    pub fn from_plaintext(plaintext: &[Fr]) -> Option<(Self, Signature)> {
        if plaintext.len() != COMMAND_PLAINTEXT_LEN {
            return None;
        }
        let command = Self::from_parts(
            PackedCommand::unpack(&plaintext[0]),
            PubKey::new(plaintext[1], plaintext[2]),
            plaintext[3],
        );
        let signature = Signature::from_fields(plaintext[4], plaintext[5], plaintext[6]);
        Some((command, signature))
    }

    pub fn encrypt(&self, signature: &Signature, key: &SharedKey) -> Vec<Fr> {
        cipher::encrypt(&self.to_plaintext(signature), key, Fr::from(MESSAGE_NONCE))
    }

    pub fn decrypt(ciphertext: &[Fr], key: &SharedKey) -> Option<(Self, Signature)> {
        let plaintext = cipher::decrypt(
            ciphertext,
            key,
            Fr::from(MESSAGE_NONCE),
            COMMAND_PLAINTEXT_LEN,
        )?;
        Self::from_plaintext(&plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{ecdh, Keypair};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn packing_inverts_with_fifty_bit_fields() {
        let max = (1u64 << PACKED_FIELD_BITS) - 1;
        let cases = [
            PackedCommand::default(),
            PackedCommand {
                nonce: 1,
                state_index: 2,
                vote_option_index: 3,
                new_vote_weight: 4,
                poll_id: 5,
            },
            PackedCommand {
                nonce: max,
                state_index: max,
                vote_option_index: max,
                new_vote_weight: max,
                poll_id: max,
            },
        ];
        for case in cases {
            assert_eq!(PackedCommand::unpack(&case.pack()), case);
        }
    }

    #[test]
    fn packing_matches_shift_layout() {
        let packed = PackedCommand {
            nonce: 1,
            state_index: 1,
            ..Default::default()
        }
        .pack();
        assert_eq!(packed, Fr::from(1u64 + (1u64 << 50)));
    }

    #[test]
    fn encrypted_command_decrypts_and_verifies() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let voter = Keypair::random(&mut rng);
        let coordinator = Keypair::random(&mut rng);
        let ephemeral = Keypair::random(&mut rng);

        let command = Command {
            state_index: 1,
            new_pub_key: voter.public,
            vote_option_index: 0,
            new_vote_weight: 5,
            nonce: 1,
            poll_id: 0,
            salt: Fr::from(777u64),
        };
        let signature = command.sign(&voter.private);
        let shared = ecdh(&ephemeral.private, &coordinator.public).unwrap();
        let ciphertext = command.encrypt(&signature, &shared);
        assert_eq!(ciphertext.len(), 10);

        let recovered = ecdh(&coordinator.private, &ephemeral.public).unwrap();
        let (decoded, decoded_sig) = Command::decrypt(&ciphertext, &recovered).unwrap();
        assert_eq!(decoded, command);
        assert!(decoded.verify(&decoded_sig, &voter.public));
    }
}
