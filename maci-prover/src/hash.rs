//! Public input digest shared with the on-chain verifier.
//!
//! Each value is written as a 32-byte big-endian integer, the concatenation
//! is hashed with SHA-256 and the digest is truncated to its low 253 bits so
//! it always fits in the scalar field.

use halo2curves_axiom::{bn256::Fr, ff::Field};
use maci_common::{fr_to_be_bytes, reduce_be_bytes_to_fr};
use sha2::{Digest, Sha256};

/// Bits shifted between packed sub-fields.
pub const PACKED_VALUE_BITS: u64 = 50;

pub fn compute_public_input_hash(values: &[Fr]) -> Fr {
    let mut hasher = Sha256::new();
    for value in values {
        hasher.update(fr_to_be_bytes(value));
    }
    let mut digest: [u8; 32] = hasher.finalize().into();
    digest[0] &= 0x1f;
    reduce_be_bytes_to_fr(&digest)
}

/// `values[0] | values[1]<<50 | values[2]<<100 | ...`.
pub fn pack_values(values: &[u64]) -> Fr {
    let shift = Fr::from(1u64 << PACKED_VALUE_BITS);
    values
        .iter()
        .rev()
        .fold(Fr::ZERO, |acc, value| acc * shift + Fr::from(*value))
}

pub fn process_packed_vals(
    max_vote_options: u64,
    num_signups: u64,
    batch_start_index: u64,
    batch_end_index: u64,
) -> Fr {
    pack_values(&[
        max_vote_options,
        num_signups,
        batch_start_index,
        batch_end_index,
    ])
}

pub fn tally_packed_vals(num_signups: u64, batch_start_index: u64) -> Fr {
    pack_values(&[num_signups, batch_start_index])
}
