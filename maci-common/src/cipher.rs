//! Authenticated encryption with the width-4 Poseidon sponge.
//!
//! The sponge is seeded with `[key0, key1, nonce, 0]`. Each block of three
//! plaintext elements is added to the rate lanes, the resulting ciphertext
//! replaces those lanes, and the state is permuted. After the last block the
//! first lane is appended as an authentication tag.

use halo2curves_axiom::{bn256::Fr, ff::Field};

use crate::{
    keys::SharedKey,
    poseidon::{permute, SPONGE_RATE, SPONGE_T},
};

/// Length of the ciphertext produced for a plaintext of `plain_len` elements.
pub fn ciphertext_len(plain_len: usize) -> usize {
    plain_len.div_ceil(SPONGE_RATE) * SPONGE_RATE + 1
}

fn seeded_state(key: &SharedKey, nonce: Fr) -> [Fr; SPONGE_T] {
    let mut state = [key.0[0], key.0[1], nonce, Fr::ZERO];
    permute(&mut state);
    state
}

pub fn encrypt(plaintext: &[Fr], key: &SharedKey, nonce: Fr) -> Vec<Fr> {
    let mut padded = plaintext.to_vec();
    padded.resize(ciphertext_len(plaintext.len()) - 1, Fr::ZERO);

    let mut state = seeded_state(key, nonce);
    let mut ciphertext = Vec::with_capacity(padded.len() + 1);
    for block in padded.chunks(SPONGE_RATE) {
        for (lane, value) in block.iter().enumerate() {
            state[lane] += value;
            ciphertext.push(state[lane]);
        }
        permute(&mut state);
    }
    ciphertext.push(state[0]);
    ciphertext
}

/// Decrypt and authenticate. `None` when the length does not match
/// `plain_len`, the tag does not verify, or the padding is not zero.
pub fn decrypt(
    ciphertext: &[Fr],
    key: &SharedKey,
    nonce: Fr,
    plain_len: usize,
) -> Option<Vec<Fr>> {
    if ciphertext.len() != ciphertext_len(plain_len) {
        return None;
    }
    let (body, tag) = ciphertext.split_at(ciphertext.len() - 1);

    let mut state = seeded_state(key, nonce);
    let mut plaintext = Vec::with_capacity(body.len());
    for block in body.chunks(SPONGE_RATE) {
        for (lane, cipher) in block.iter().enumerate() {
            plaintext.push(*cipher - state[lane]);
            state[lane] = *cipher;
        }
        permute(&mut state);
    }

    if state[0] != tag[0] {
        return None;
    }
    if plaintext[plain_len..].iter().any(|v| *v != Fr::ZERO) {
        return None;
    }
    plaintext.truncate(plain_len);
    Some(plaintext)
}
