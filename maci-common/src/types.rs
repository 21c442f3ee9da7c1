use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};

use crate::{fr_from_u128, keys::PubKey, poseidon::hash};

/// Voice credits held by the blank leaf at state index 0.
pub const BLANK_STATE_LEAF_BALANCE: u128 = 1 << 32;

/// Field elements in an encrypted message body.
pub const MESSAGE_DATA_LEN: usize = 10;

/// Sponge nonce used for every vote message.
pub const MESSAGE_NONCE: u64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateLeaf {
    pub pub_key: PubKey,
    pub voice_credit_balance: u128,
    pub timestamp: u64,
}

impl StateLeaf {
    pub fn new(pub_key: PubKey, voice_credit_balance: u128, timestamp: u64) -> Self {
        Self {
            pub_key,
            voice_credit_balance,
            timestamp,
        }
    }

    /// Sink leaf at index 0; rejected messages rewrite it with itself.
    pub fn blank() -> Self {
        Self::new(PubKey::padding(), BLANK_STATE_LEAF_BALANCE, 0)
    }

    pub fn to_fields(&self) -> [Fr; 4] {
        [
            self.pub_key.x(),
            self.pub_key.y(),
            fr_from_u128(self.voice_credit_balance),
            Fr::from(self.timestamp),
        ]
    }

    pub fn hash(&self) -> Fr {
        hash(&self.to_fields())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    #[serde(with = "crate::serde_fr::seq")]
    pub data: [Fr; MESSAGE_DATA_LEN],
    pub enc_pub_key: PubKey,
    pub message_index: u64,
}

impl EncryptedMessage {
    pub fn new(data: [Fr; MESSAGE_DATA_LEN], enc_pub_key: PubKey, message_index: u64) -> Self {
        Self {
            data,
            enc_pub_key,
            message_index,
        }
    }

    /// Filler for partial batches. Its hash is the message tree's zero leaf.
    pub fn padding() -> Self {
        Self::new([Fr::from(0u64); MESSAGE_DATA_LEN], PubKey::padding(), 0)
    }

    pub fn is_padding(&self) -> bool {
        self.data == Self::padding().data && self.enc_pub_key == PubKey::padding()
    }

    /// `hash([data[0..10], encPubKeyX, encPubKeyY])`.
    pub fn hash(&self) -> Fr {
        let mut inputs = Vec::with_capacity(MESSAGE_DATA_LEN + 2);
        inputs.extend_from_slice(&self.data);
        inputs.push(self.enc_pub_key.x());
        inputs.push(self.enc_pub_key.y());
        hash(&inputs)
    }

    /// Message fields as the circuit consumes them: data followed by the
    /// encryption key.
    pub fn to_circuit_fields(&self) -> Vec<Fr> {
        let mut fields = self.data.to_vec();
        fields.extend(self.enc_pub_key.as_array());
        fields
    }
}
