//! Voter and coordinator keys, ECDH and EdDSA-Poseidon signatures.

use std::fmt;

use halo2curves_axiom::{bn256::Fr, ff::Field};
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::{
    babyjub::{Point, BASE8, SUBORDER},
    error::CryptoError,
    fr_from_biguint, fr_to_biguint, fr_to_bytes,
    poseidon::hash,
};

/// BabyJubJub private scalar in `[1, l)`.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivKey(BigUint);

impl PrivKey {
    pub fn new(scalar: BigUint) -> Result<Self, CryptoError> {
        let reduced = scalar % &*SUBORDER;
        if reduced.bits() == 0 {
            return Err(CryptoError::InvalidPrivateKey("scalar reduces to zero".into()));
        }
        Ok(Self(reduced))
    }

    pub fn from_decimal(value: &str) -> Result<Self, CryptoError> {
        let parsed = BigUint::parse_bytes(value.trim().as_bytes(), 10).ok_or_else(|| {
            CryptoError::InvalidPrivateKey("expected a decimal integer".into())
        })?;
        Self::new(parsed)
    }

    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            if let Ok(key) = Self::new(BigUint::from_bytes_le(&bytes)) {
                return key;
            }
        }
    }

    pub fn scalar(&self) -> &BigUint {
        &self.0
    }

    /// The scalar as a field element; `l` is smaller than the field modulus so
    /// the conversion is lossless.
    pub fn as_fr(&self) -> Fr {
        fr_from_biguint(&self.0).unwrap_or(Fr::ZERO)
    }

    pub fn public_key(&self) -> PubKey {
        PubKey(BASE8.mul_scalar(&self.0))
    }
}

impl fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivKey(<redacted>)")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PubKey(pub Point);

impl PubKey {
    pub fn new(x: Fr, y: Fr) -> Self {
        Self(Point::new(x, y))
    }

    pub fn x(&self) -> Fr {
        self.0.x
    }

    pub fn y(&self) -> Fr {
        self.0.y
    }

    pub fn as_array(&self) -> [Fr; 2] {
        [self.0.x, self.0.y]
    }

    /// `hash([x, y])`, published as the coordinator public key hash.
    pub fn hash(&self) -> Fr {
        hash(&self.as_array())
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_on_curve()
    }

    /// The key stored in the blank state leaf and used by padding messages.
    pub fn padding() -> Self {
        Self(*BASE8)
    }
}

#[derive(Clone, Debug)]
pub struct Keypair {
    pub private: PrivKey,
    pub public: PubKey,
}

impl Keypair {
    pub fn from_private(private: PrivKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_private(PrivKey::random(rng))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SharedKey(pub [Fr; 2]);

/// Diffie-Hellman over BabyJubJub. Returns `None` if `public` is not a curve
/// point, so a hostile encryption key can never yield a usable key.
pub fn ecdh(private: &PrivKey, public: &PubKey) -> Option<SharedKey> {
    if !public.is_valid() {
        return None;
    }
    let shared = public.0.mul_scalar(private.scalar());
    Some(SharedKey([shared.x, shared.y]))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub r8: Point,
    pub s: BigUint,
}

impl Signature {
    /// Rebuild a signature from its three plaintext field elements.
    pub fn from_fields(r8x: Fr, r8y: Fr, s: Fr) -> Self {
        Self {
            r8: Point::new(r8x, r8y),
            s: fr_to_biguint(&s),
        }
    }

    /// `[R8x, R8y, S]`. `S < l` for every signature produced by [`sign`].
    pub fn to_fields(&self) -> [Fr; 3] {
        [
            self.r8.x,
            self.r8.y,
            fr_from_biguint(&self.s).unwrap_or(Fr::ZERO),
        ]
    }
}

fn challenge(r8: &Point, public: &PubKey, message: Fr) -> BigUint {
    let hm = hash(&[r8.x, r8.y, public.x(), public.y(), message]);
    fr_to_biguint(&hm) * 8u32
}

/// Deterministic EdDSA-Poseidon signature over one field element.
pub fn sign(private: &PrivKey, message: Fr) -> Signature {
    let mut hasher = Sha512::new();
    let mut sk_bytes = private.scalar().to_bytes_le();
    sk_bytes.resize(32, 0);
    hasher.update(&sk_bytes);
    hasher.update(fr_to_bytes(&message));
    let r = BigUint::from_bytes_le(&hasher.finalize()) % &*SUBORDER;

    let r8 = BASE8.mul_scalar(&r);
    let public = private.public_key();
    let s = (r + challenge(&r8, &public, message) * private.scalar()) % &*SUBORDER;
    Signature { r8, s }
}

/// Returns `false` for any malformed or forged signature.
pub fn verify_signature(message: Fr, signature: &Signature, public: &PubKey) -> bool {
    if signature.s >= *SUBORDER {
        return false;
    }
    if !signature.r8.is_on_curve() || !public.is_valid() {
        return false;
    }
    let lhs = BASE8.mul_scalar(&signature.s);
    let rhs = signature
        .r8
        .add(&public.0.mul_scalar(&challenge(&signature.r8, public, message)));
    lhs == rhs
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn keypair(seed: u64) -> Keypair {
        Keypair::random(&mut ChaCha20Rng::seed_from_u64(seed))
    }

    #[test]
    fn ecdh_is_symmetric() {
        let alice = keypair(1);
        let bob = keypair(2);
        let ab = ecdh(&alice.private, &bob.public).unwrap();
        let ba = ecdh(&bob.private, &alice.public).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn ecdh_rejects_off_curve_keys() {
        let alice = keypair(3);
        let bogus = PubKey::new(Fr::from(1u64), Fr::from(5u64));
        assert!(ecdh(&alice.private, &bogus).is_none());
    }

    #[test]
    fn signature_round_trip() {
        let kp = keypair(4);
        let msg = Fr::from(123_456u64);
        let sig = sign(&kp.private, msg);
        assert!(verify_signature(msg, &sig, &kp.public));
        assert!(!verify_signature(msg + Fr::from(1u64), &sig, &kp.public));
        assert!(!verify_signature(msg, &sig, &keypair(5).public));
    }

    #[test]
    fn signature_survives_field_encoding() {
        let kp = keypair(6);
        let msg = Fr::from(99u64);
        let sig = sign(&kp.private, msg);
        let [x, y, s] = sig.to_fields();
        assert!(verify_signature(msg, &Signature::from_fields(x, y, s), &kp.public));
    }

    #[test]
    fn malformed_signatures_return_false() {
        let kp = keypair(7);
        let msg = Fr::from(1u64);
        let mut sig = sign(&kp.private, msg);
        sig.s = SUBORDER.clone();
        assert!(!verify_signature(msg, &sig, &kp.public));

        let off_curve = Signature::from_fields(Fr::from(3u64), Fr::from(4u64), Fr::from(5u64));
        assert!(!verify_signature(msg, &off_curve, &kp.public));
    }

    #[test]
    fn private_key_rejects_zero_and_multiples_of_order() {
        assert!(PrivKey::new(BigUint::from(0u32)).is_err());
        assert!(PrivKey::new(SUBORDER.clone()).is_err());
        assert!(PrivKey::from_decimal("not a number").is_err());
        assert!(PrivKey::from_decimal("42").is_ok());
    }

    #[test]
    fn debug_output_hides_the_scalar() {
        let kp = keypair(8);
        assert_eq!(format!("{:?}", kp.private), "PrivKey(<redacted>)");
    }
}
