//! Poseidon over BN254 with the circomlib parameters.
//!
//! Hashing `n` inputs runs the width `n + 1` permutation over
//! `[0, inputs..]` and returns lane 0, so arities 1 through 12 are
//! supported. The width-4 permutation also drives the sponge cipher in
//! [`crate::cipher`]. Round constants and MDS matrices come from
//! `light-poseidon`'s circom tables and are converted once into `Fr`.

use ark_ff::PrimeField as ArkPrimeField;
use halo2curves_axiom::{bn256::Fr, ff::Field};
use light_poseidon::parameters::bn254_x5::get_poseidon_parameters;
use once_cell::sync::Lazy;

/// Widest circom permutation with published parameters.
pub const MAX_WIDTH: usize = 13;
pub const MAX_HASH_INPUTS: usize = MAX_WIDTH - 1;

pub const SPONGE_T: usize = 4;
pub const SPONGE_RATE: usize = 3;

struct RoundParams {
    width: usize,
    full_rounds: usize,
    partial_rounds: usize,
    ark: Vec<Fr>,
    mds: Vec<Vec<Fr>>,
}

fn ark_to_fr(value: &ark_bn254::Fr) -> Fr {
    Fr::from_raw(value.into_bigint().0)
}

impl RoundParams {
    fn load(width: usize) -> Self {
        // Widths 2..=13 are tabulated; anything else is a bug in this module.
        let params = get_poseidon_parameters::<ark_bn254::Fr>(width as u8)
            .expect("circom poseidon parameters exist for widths 2..=13");
        Self {
            width: params.width,
            full_rounds: params.full_rounds,
            partial_rounds: params.partial_rounds,
            ark: params.ark.iter().map(ark_to_fr).collect(),
            mds: params
                .mds
                .iter()
                .map(|row| row.iter().map(ark_to_fr).collect())
                .collect(),
        }
    }

    fn permute(&self, state: &mut [Fr]) {
        debug_assert_eq!(state.len(), self.width);
        let half_full = self.full_rounds / 2;
        let rounds = self.full_rounds + self.partial_rounds;
        let mut next = vec![Fr::ZERO; self.width];

        for round in 0..rounds {
            let constants = &self.ark[round * self.width..(round + 1) * self.width];
            for (word, constant) in state.iter_mut().zip(constants) {
                *word += constant;
            }
            if round < half_full || round >= half_full + self.partial_rounds {
                state.iter_mut().for_each(|word| *word = sbox(*word));
            } else {
                state[0] = sbox(state[0]);
            }
            for (out, row) in next.iter_mut().zip(&self.mds) {
                *out = row
                    .iter()
                    .zip(state.iter())
                    .fold(Fr::ZERO, |acc, (m, s)| acc + *m * s);
            }
            state.copy_from_slice(&next);
        }
    }
}

fn sbox(value: Fr) -> Fr {
    value.square().square() * value
}

/// Parameters indexed by `width - 2`.
static PARAMS: Lazy<Vec<RoundParams>> =
    Lazy::new(|| (2..=MAX_WIDTH).map(RoundParams::load).collect());

fn params(width: usize) -> &'static RoundParams {
    &PARAMS[width - 2]
}

/// circomlib `Poseidon(n)` over `inputs`.
///
/// # Panics
///
/// Panics when `inputs` is empty or longer than [`MAX_HASH_INPUTS`]. Every
/// protocol hash has a fixed arity inside that range.
pub fn hash(inputs: &[Fr]) -> Fr {
    assert!(
        (1..=MAX_HASH_INPUTS).contains(&inputs.len()),
        "poseidon arity {} outside 1..={MAX_HASH_INPUTS}",
        inputs.len()
    );
    let mut state = Vec::with_capacity(inputs.len() + 1);
    state.push(Fr::ZERO);
    state.extend_from_slice(inputs);
    params(state.len()).permute(&mut state);
    state[0]
}

pub fn hash_left_right(left: Fr, right: Fr) -> Fr {
    hash(&[left, right])
}

/// Apply the width-4 permutation in place.
pub fn permute(state: &mut [Fr; SPONGE_T]) {
    params(SPONGE_T).permute(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fr_from_decimal, fr_to_decimal};
    use num_bigint::BigUint;

    fn from_hex(hex: &str) -> Fr {
        let value = BigUint::parse_bytes(hex.as_bytes(), 16).unwrap();
        fr_from_decimal(&value.to_string()).unwrap()
    }

    #[test]
    fn matches_circomlib_vectors() {
        let two = hash(&[Fr::from(1u64), Fr::from(2u64)]);
        assert_eq!(
            two,
            from_hex("115cc0f5e7d690413df64c6b9662e9cf2a3617f2743245519e19607a4417189a"),
            "got {}",
            fr_to_decimal(&two)
        );
        let four = hash(&[1u64, 2, 3, 4].map(Fr::from));
        assert_eq!(
            four,
            from_hex("299c867db6c1fdd79dcefa40e4510b9837e60ebb1ce0663dbaa525df65250465"),
            "got {}",
            fr_to_decimal(&four)
        );
    }

    #[test]
    fn sponge_permutation_agrees_with_three_input_hash() {
        let inputs = [Fr::from(3u64), Fr::from(5u64), Fr::from(8u64)];
        let mut state = [Fr::ZERO, inputs[0], inputs[1], inputs[2]];
        permute(&mut state);
        assert_eq!(state[0], hash(&inputs));
    }

    #[test]
    fn hash_depends_on_order_and_arity() {
        let a = Fr::from(7u64);
        let b = Fr::from(11u64);
        assert_ne!(hash(&[a, b]), hash(&[b, a]));
        assert_ne!(hash(&[a]), hash(&[a, Fr::ZERO]));
    }

    #[test]
    fn every_supported_arity_hashes() {
        let inputs: Vec<Fr> = (1..=MAX_HASH_INPUTS as u64).map(Fr::from).collect();
        let mut seen = std::collections::HashSet::new();
        for len in 1..=MAX_HASH_INPUTS {
            assert!(seen.insert(fr_to_decimal(&hash(&inputs[..len]))));
        }
    }

    #[test]
    #[should_panic(expected = "poseidon arity")]
    fn oversized_input_panics() {
        hash(&[Fr::ONE; MAX_HASH_INPUTS + 1]);
    }

    #[test]
    fn left_right_matches_two_input_hash() {
        let l = Fr::from(5u64);
        let r = Fr::from(9u64);
        assert_eq!(hash_left_right(l, r), hash(&[l, r]));
    }

    #[test]
    fn permutation_mixes_every_lane() {
        let mut a = [Fr::ZERO; SPONGE_T];
        let mut b = [Fr::ZERO; SPONGE_T];
        b[3] = Fr::ONE;
        permute(&mut a);
        permute(&mut b);
        for lane in 0..SPONGE_T {
            assert_ne!(a[lane], b[lane], "lane {lane} unaffected by input change");
        }
    }
}
