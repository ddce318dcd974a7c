//! Ciphertext-space aggregation as performed by the remote compute peer.
//!
//! The peer receives a public key bundle and a batch of ciphertexts, folds
//! them with the scheme's homomorphic operation (SUM for Paillier, PRODUCT
//! for RSA and ElGamal) and returns one ciphertext, never seeing a plaintext.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::elgamal::{ElGamalCiphertext, ElGamalPublicKey};
use crate::error::LabError;
use crate::paillier::PaillierPublicKey;
use crate::rsa::RsaPublicKey;
use crate::wire::{Algorithm, Ciphertext, Operation, PublicKeyBundle};

/// A ciphertext of any scheme as it appears in a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireCiphertext {
    /// Paillier or RSA: a decimal string
    Single(Ciphertext),
    /// ElGamal: `{ c1, c2 }`
    Pair(ElGamalCiphertext),
}

impl From<Ciphertext> for WireCiphertext {
    fn from(c: Ciphertext) -> Self {
        WireCiphertext::Single(c)
    }
}

impl From<ElGamalCiphertext> for WireCiphertext {
    fn from(c: ElGamalCiphertext) -> Self {
        WireCiphertext::Pair(c)
    }
}

/// Result of aggregating one batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeResult {
    pub algorithm: Algorithm,
    pub operation: Operation,
    /// Number of ciphertexts folded together
    pub count: usize,
    pub ciphertext: WireCiphertext,
}

/// Folds `ciphertexts` under the scheme and key described by `bundle`.
///
/// # Errors
/// * [`LabError::InvalidParameter`] for an empty batch or an invalid key
/// * [`LabError::Encoding`] if a ciphertext has the wrong shape for the scheme
/// * range errors from the scheme itself
pub fn aggregate(
    bundle: &PublicKeyBundle,
    ciphertexts: &[WireCiphertext],
) -> Result<ComputeResult, LabError> {
    if ciphertexts.is_empty() {
        return Err(LabError::InvalidParameter(
            "no ciphertexts to aggregate".to_string(),
        ));
    }
    let algorithm = bundle.algorithm();

    let ciphertext = match bundle {
        PublicKeyBundle::Paillier(b) => {
            let key = PaillierPublicKey::from_bundle(b)?;
            WireCiphertext::Single(key.sum(singles(algorithm, ciphertexts)?)?)
        }
        PublicKeyBundle::Rsa(b) => {
            let key = RsaPublicKey::from_bundle(b)?;
            WireCiphertext::Single(key.product(singles(algorithm, ciphertexts)?)?)
        }
        PublicKeyBundle::Elgamal(b) => {
            let key = ElGamalPublicKey::from_bundle(b)?;
            WireCiphertext::Pair(key.product(pairs(ciphertexts)?)?)
        }
    };

    info!(%algorithm, count = ciphertexts.len(), "aggregated ciphertexts");
    Ok(ComputeResult {
        algorithm,
        operation: algorithm.operation(),
        count: ciphertexts.len(),
        ciphertext,
    })
}

fn singles(
    algorithm: Algorithm,
    ciphertexts: &[WireCiphertext],
) -> Result<Vec<&Ciphertext>, LabError> {
    ciphertexts
        .iter()
        .map(|c| match c {
            WireCiphertext::Single(c) => Ok(c),
            WireCiphertext::Pair(_) => Err(LabError::Encoding(format!(
                "{} expects single-integer ciphertexts",
                algorithm
            ))),
        })
        .collect()
}

fn pairs(ciphertexts: &[WireCiphertext]) -> Result<Vec<&ElGamalCiphertext>, LabError> {
    ciphertexts
        .iter()
        .map(|c| match c {
            WireCiphertext::Pair(c) => Ok(c),
            WireCiphertext::Single(_) => Err(LabError::Encoding(
                "ELGAMAL expects {c1, c2} ciphertexts".to_string(),
            )),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elgamal::ElGamalKeyPair;
    use crate::paillier::PaillierKeyPair;
    use crate::rsa::RsaKeyPair;
    use num_bigint::BigUint;
    use rand::{rngs::StdRng, SeedableRng};

    fn big(v: u64) -> BigUint {
        BigUint::from(v)
    }

    #[test]
    fn test_paillier_batch_sum() {
        let mut rng = StdRng::seed_from_u64(41);
        let pair = PaillierKeyPair::demo().unwrap();
        let bundle = PublicKeyBundle::Paillier(pair.public.to_bundle());
        let batch: Vec<WireCiphertext> = [5u64, 15, 25]
            .iter()
            .map(|v| pair.public.encrypt(&big(*v), &mut rng).unwrap().into())
            .collect();

        let result = aggregate(&bundle, &batch).unwrap();
        assert_eq!(result.operation, Operation::Sum);
        assert_eq!(result.count, 3);
        match result.ciphertext {
            WireCiphertext::Single(c) => assert_eq!(pair.private.decrypt(&c).unwrap(), big(45)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rsa_batch_product() {
        let pair = RsaKeyPair::demo().unwrap();
        let bundle = PublicKeyBundle::Rsa(pair.public.to_bundle());
        let batch: Vec<WireCiphertext> = [2u64, 3, 7]
            .iter()
            .map(|v| pair.public.encrypt(&big(*v)).unwrap().into())
            .collect();

        let result = aggregate(&bundle, &batch).unwrap();
        assert_eq!(result.operation, Operation::Product);
        match result.ciphertext {
            WireCiphertext::Single(c) => assert_eq!(pair.private.decrypt(&c).unwrap(), big(42)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_elgamal_batch_from_json() {
        let mut rng = StdRng::seed_from_u64(42);
        let pair = ElGamalKeyPair::demo().unwrap();
        let bundle = PublicKeyBundle::Elgamal(pair.public.to_bundle());
        let batch: Vec<WireCiphertext> = [4u64, 5]
            .iter()
            .map(|v| pair.public.encrypt(&big(*v), &mut rng).unwrap().into())
            .collect();

        // through the wire and back
        let json = serde_json::to_string(&batch).unwrap();
        let batch: Vec<WireCiphertext> = serde_json::from_str(&json).unwrap();

        let result = aggregate(&bundle, &batch).unwrap();
        match result.ciphertext {
            WireCiphertext::Pair(c) => assert_eq!(pair.private.decrypt(&c).unwrap(), big(20)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_shape_mismatch_and_empty_batch() {
        let pair = RsaKeyPair::demo().unwrap();
        let bundle = PublicKeyBundle::Rsa(pair.public.to_bundle());
        let wrong = vec![WireCiphertext::Pair(ElGamalCiphertext {
            c1: big(1),
            c2: big(2),
        })];
        assert!(matches!(
            aggregate(&bundle, &wrong).unwrap_err(),
            LabError::Encoding(_)
        ));
        assert!(aggregate(&bundle, &[]).is_err());
    }

    #[test]
    fn test_untagged_parsing() {
        let single: WireCiphertext = serde_json::from_str("\"123\"").unwrap();
        assert_eq!(single, WireCiphertext::Single("123".parse().unwrap()));
        let pair: WireCiphertext = serde_json::from_str(r#"{"c1":"3","c2":"4"}"#).unwrap();
        assert!(matches!(pair, WireCiphertext::Pair(_)));
    }
}
