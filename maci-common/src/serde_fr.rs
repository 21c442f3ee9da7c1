//! Serde adapters that render field elements as decimal strings, the format
//! circuits and snarkjs tooling consume.

use halo2curves_axiom::bn256::Fr;
use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

use crate::{fr_from_decimal, fr_to_decimal};

pub fn serialize<S>(value: &Fr, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&fr_to_decimal(value))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Fr, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    fr_from_decimal(&raw).map_err(D::Error::custom)
}

/// Adapter for `Vec<Fr>` and fixed-size `[Fr; N]` fields.
pub mod seq {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S, T>(values: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[Fr]>,
    {
        let values = values.as_ref();
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&fr_to_decimal(value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<Fr>>,
    {
        let raw = Vec::<String>::deserialize(deserializer)?;
        let parsed = raw
            .iter()
            .map(|s| fr_from_decimal(s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(D::Error::custom)?;
        let len = parsed.len();
        T::try_from(parsed)
            .map_err(|_| D::Error::custom(format!("unexpected field element count {len}")))
    }
}
