//! Error types for the cryptographic toolkit.

use thiserror::Error;

/// Decoding errors. Verification failures are never reported through this
/// type; those surface as `false` or `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid field element: {0}")]
    InvalidField(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("point is not on the BabyJubJub curve")]
    NotOnCurve,
}
