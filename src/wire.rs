//! Boundary shapes exchanged with the transport collaborator.
//!
//! Big integers travel as decimal strings with no framing or type tag; the
//! caller tracks which scheme and key produced a value.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::LabError;

/// Parses an unsigned decimal string.
pub fn parse_decimal(s: &str) -> Result<BigUint, LabError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LabError::Encoding(format!(
            "expected unsigned decimal integer, got {:?}",
            s
        )));
    }
    BigUint::parse_bytes(s.as_bytes(), 10)
        .ok_or_else(|| LabError::Encoding(format!("invalid decimal integer {:?}", s)))
}

/// Serde adapter encoding a `BigUint` as a decimal string.
pub mod decimal {
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_decimal(&s).map_err(D::Error::custom)
    }
}

/// Serde adapter for share values: a JSON integer when the value fits in
/// `u64`, a decimal string otherwise. Both forms are accepted on input.
pub mod integer {
    use num_bigint::BigUint;
    use num_traits::ToPrimitive;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        match value.to_u64() {
            Some(v) => serializer.serialize_u64(v),
            None => serializer.serialize_str(&value.to_str_radix(10)),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(v) => Ok(BigUint::from(v)),
            NumberOrString::String(s) => super::parse_decimal(&s).map_err(D::Error::custom),
        }
    }
}

/// A single-integer ciphertext (Paillier or RSA).
///
/// The value carries no scheme tag: combining ciphertexts from different keys
/// or schemes is the caller's mistake to avoid.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ciphertext(#[serde(with = "decimal")] BigUint);

impl Ciphertext {
    pub fn new(value: BigUint) -> Self {
        Ciphertext(value)
    }

    pub fn value(&self) -> &BigUint {
        &self.0
    }

    pub fn into_inner(self) -> BigUint {
        self.0
    }
}

impl fmt::Display for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ciphertext {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_decimal(s).map(Ciphertext)
    }
}

/// Homomorphic scheme identifier as used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Algorithm {
    Paillier,
    Rsa,
    Elgamal,
}

impl Algorithm {
    /// The ciphertext-space operation the scheme supports.
    pub fn operation(self) -> Operation {
        match self {
            Algorithm::Paillier => Operation::Sum,
            Algorithm::Rsa | Algorithm::Elgamal => Operation::Product,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Paillier => "PAILLIER",
            Algorithm::Rsa => "RSA",
            Algorithm::Elgamal => "ELGAMAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Sum,
    Product,
}

/// `{ n, g }` for the additive scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaillierKeyBundle {
    #[serde(with = "decimal")]
    pub n: BigUint,
    #[serde(with = "decimal")]
    pub g: BigUint,
}

/// `{ n, e }` for textbook RSA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaKeyBundle {
    #[serde(with = "decimal")]
    pub n: BigUint,
    #[serde(with = "decimal")]
    pub e: BigUint,
}

/// `{ p, g, y }` for ElGamal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElGamalKeyBundle {
    #[serde(with = "decimal")]
    pub p: BigUint,
    #[serde(with = "decimal")]
    pub g: BigUint,
    #[serde(with = "decimal")]
    pub y: BigUint,
}

/// Public parameters of one of the homomorphic schemes, tagged by algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "UPPERCASE")]
pub enum PublicKeyBundle {
    Paillier(PaillierKeyBundle),
    Rsa(RsaKeyBundle),
    Elgamal(ElGamalKeyBundle),
}

impl PublicKeyBundle {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            PublicKeyBundle::Paillier(_) => Algorithm::Paillier,
            PublicKeyBundle::Rsa(_) => Algorithm::Rsa,
            PublicKeyBundle::Elgamal(_) => Algorithm::Elgamal,
        }
    }

    /// Bit length of the modulus the ciphertexts live under.
    pub fn bit_length(&self) -> u64 {
        match self {
            PublicKeyBundle::Paillier(k) => k.n.bits(),
            PublicKeyBundle::Rsa(k) => k.n.bits(),
            PublicKeyBundle::Elgamal(k) => k.p.bits(),
        }
    }

    pub fn key_info(&self) -> KeyInfo {
        KeyInfo {
            bit_length: self.bit_length(),
            operation: self.algorithm().operation(),
        }
    }
}

/// Metadata the key holder publishes next to a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub bit_length: u64,
    pub operation: Operation,
}

/// `{ x, y }` share pair. Polynomial coefficients never appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireShare {
    pub x: u64,
    #[serde(with = "integer")]
    pub y: BigUint,
}

/// AEAD output as carried by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedMessage {
    /// base64 ciphertext including the authentication tag
    pub ciphertext: String,
    /// base64 96-bit nonce
    pub iv: String,
}
