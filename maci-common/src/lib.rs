//! maci-common
//!
//! Stateless cryptographic toolkit for the MACI coordinator: every function in
//! this crate is pure, owns no mutable state and works over the BN254 scalar
//! field `Fr`.
//!
//! - [`poseidon`]: circomlib Poseidon hash and the width-4 permutation used
//!   by the sponge cipher.
//! - [`babyjub`]: BabyJubJub twisted Edwards arithmetic.
//! - [`keys`]: key pairs, ECDH and EdDSA-Poseidon signatures.
//! - [`cipher`]: authenticated Poseidon sponge encryption.
//! - [`command`]: the signed vote command and its 50-bit field packing.
//! - [`types`]: state leaves and encrypted messages as published on-chain.

pub mod babyjub;
pub mod cipher;
pub mod command;
pub mod error;
pub mod keys;
pub mod poseidon;
pub mod serde_fr;
pub mod types;

use halo2curves_axiom::ff::{Field, PrimeField};
use num_bigint::BigUint;
use once_cell::sync::Lazy;

pub use halo2curves_axiom::bn256::Fr;

pub use babyjub::{Point, BASE8, SUBORDER};
pub use cipher::{ciphertext_len, decrypt, encrypt};
pub use command::{Command, PackedCommand, COMMAND_PLAINTEXT_LEN, PACKED_FIELD_BITS};
pub use error::CryptoError;
pub use keys::{ecdh, sign, verify_signature, Keypair, PrivKey, PubKey, SharedKey, Signature};
pub use poseidon::{hash, hash_left_right};
pub use types::{
    EncryptedMessage, StateLeaf, BLANK_STATE_LEAF_BALANCE, MESSAGE_DATA_LEN, MESSAGE_NONCE,
};

/// BN254 scalar field modulus.
pub static FIELD_MODULUS: Lazy<BigUint> = Lazy::new(|| {
    BigUint::parse_bytes(
        b"21888242871839275222246405745257275088548364400416034343698204186575808495617",
        10,
    )
    .unwrap_or_default()
});

pub fn fr_from_bytes(bytes: &[u8; 32]) -> Result<Fr, CryptoError> {
    Fr::from_repr(*bytes)
        .into_option()
        .ok_or_else(|| CryptoError::InvalidField("non-canonical bn256 scalar encoding".into()))
}

/// Little-endian canonical encoding, matching `Fr::to_repr`.
pub fn fr_to_bytes(fr: &Fr) -> [u8; 32] {
    let repr = fr.to_repr();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(repr.as_ref());
    bytes
}

pub fn fr_to_be_bytes(fr: &Fr) -> [u8; 32] {
    let mut be = fr_to_bytes(fr);
    be.reverse();
    be
}

/// Interpret 32 big-endian bytes as an integer and reduce it into the field.
pub fn reduce_be_bytes_to_fr(bytes: &[u8; 32]) -> Fr {
    let mut acc = Fr::ZERO;
    let base = Fr::from(256);
    for byte in bytes.iter() {
        acc = acc * base + Fr::from(*byte as u64);
    }
    acc
}

pub fn fr_to_biguint(fr: &Fr) -> BigUint {
    BigUint::from_bytes_le(&fr_to_bytes(fr))
}

pub fn fr_from_biguint(value: &BigUint) -> Result<Fr, CryptoError> {
    let le = value.to_bytes_le();
    if le.len() > 32 {
        return Err(CryptoError::InvalidField(format!(
            "integer of {} bits exceeds the field",
            value.bits()
        )));
    }
    let mut bytes = [0u8; 32];
    bytes[..le.len()].copy_from_slice(&le);
    fr_from_bytes(&bytes)
}

pub fn fr_to_decimal(fr: &Fr) -> String {
    fr_to_biguint(fr).to_str_radix(10)
}

pub fn fr_from_decimal(value: &str) -> Result<Fr, CryptoError> {
    let parsed = BigUint::parse_bytes(value.trim().as_bytes(), 10)
        .ok_or_else(|| CryptoError::InvalidField(format!("not a decimal integer: {value:?}")))?;
    fr_from_biguint(&parsed)
}

pub fn fr_from_u128(value: u128) -> Fr {
    Fr::from_u128(value)
}

/// Read a field element that must fit in a `u64`.
pub fn fr_to_u64(fr: &Fr) -> Result<u64, CryptoError> {
    let bytes = fr_to_bytes(fr);
    if bytes[8..].iter().any(|&b| b != 0) {
        return Err(CryptoError::InvalidField("field element does not fit in u64".into()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    Ok(u64::from_le_bytes(buf))
}
