//! Groth16 proofs in snarkjs JSON layout and their verifier calldata form.

use serde::{Deserialize, Serialize};

use crate::error::ProverError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_curve")]
    pub curve: String,
}

fn default_protocol() -> String {
    "groth16".into()
}

fn default_curve() -> String {
    "bn128".into()
}

/// Proof plus the public signals the prover reported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedProof {
    pub proof: Groth16Proof,
    pub public_signals: Vec<String>,
}

/// Arguments for `verifyProof(pA, pB, pC, ...)` as decimal strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofCalldata {
    pub p_a: [String; 2],
    pub p_b: [[String; 2]; 2],
    pub p_c: [String; 2],
}

impl Groth16Proof {
    /// Drop the projective coordinate and swap each G2 coordinate pair into
    /// the order the Solidity verifier expects.
    pub fn to_calldata(&self) -> Result<ProofCalldata, ProverError> {
        let g1 = |name: &str, point: &[String]| -> Result<[String; 2], ProverError> {
            match point {
                [x, y, ..] => Ok([x.clone(), y.clone()]),
                _ => Err(ProverError::MalformedProof(format!(
                    "{name} needs two coordinates, found {}",
                    point.len()
                ))),
            }
        };
        let g2_pair = |row: Option<&Vec<String>>| -> Result<[String; 2], ProverError> {
            match row.map(Vec::as_slice) {
                Some([c0, c1, ..]) => Ok([c1.clone(), c0.clone()]),
                _ => Err(ProverError::MalformedProof(
                    "pi_b rows need two coefficients".into(),
                )),
            }
        };

        Ok(ProofCalldata {
            p_a: g1("pi_a", &self.pi_a)?,
            p_b: [g2_pair(self.pi_b.first())?, g2_pair(self.pi_b.get(1))?],
            p_c: g1("pi_c", &self.pi_c)?,
        })
    }
}
