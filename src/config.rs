//! Explicit parameters for every scheme.
//!
//! Field primes and key sizes are passed into constructors instead of being
//! compiled in, so the size of a deployment is a deliberate, validated choice.

use num_bigint::BigUint;
use num_traits::One;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::arith::{is_probable_prime, MILLER_RABIN_ROUNDS};
use crate::error::LabError;
use crate::wire::decimal;

/// Prime used by the classroom demo; only secrets below 257 fit.
pub const DEMO_FIELD_PRIME: u64 = 257;

/// Smallest prime half accepted by [`KeySizes::validate`].
pub const MIN_PRIME_BITS: u64 = 16;

/// HKDF info label shared with the remote peer.
pub const DEFAULT_CONTEXT_LABEL: &str = "handshake data";

/// Prime field for secret sharing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Field prime `p`
    #[serde(with = "decimal")]
    pub prime: BigUint,
    /// Largest secret the deployment promises to share
    #[serde(with = "decimal")]
    pub max_secret: BigUint,
}

impl FieldConfig {
    /// Creates and validates a field configuration.
    pub fn new(prime: BigUint, max_secret: BigUint) -> Result<Self, LabError> {
        let config = FieldConfig { prime, max_secret };
        config.validate()?;
        Ok(config)
    }

    /// The `p = 257` field used in the classroom demo.
    pub fn demo() -> Self {
        FieldConfig {
            prime: BigUint::from(DEMO_FIELD_PRIME),
            max_secret: BigUint::from(DEMO_FIELD_PRIME - 1),
        }
    }

    /// Checks that the prime is prime and exceeds every declared secret.
    pub fn validate(&self) -> Result<(), LabError> {
        // deterministic witnesses so validation is reproducible
        let mut rng = StdRng::seed_from_u64(0x5eed);
        if !is_probable_prime(&self.prime, MILLER_RABIN_ROUNDS, &mut rng) {
            return Err(LabError::InvalidParameter(format!(
                "field modulus {} is not prime",
                self.prime
            )));
        }
        if self.max_secret >= self.prime {
            return Err(LabError::FieldOverflow {
                secret: self.max_secret.to_string(),
                limit: (&self.prime - 1u32).to_string(),
            });
        }
        Ok(())
    }
}

impl Default for FieldConfig {
    /// Mersenne prime `2^127 - 1`.
    fn default() -> Self {
        let prime = (BigUint::one() << 127u32) - 1u32;
        let max_secret = &prime - 1u32;
        FieldConfig { prime, max_secret }
    }
}

/// Bit sizes of the homomorphic scheme moduli.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySizes {
    /// Size of the Paillier modulus `n`
    pub paillier_bits: u64,
    /// Size of the RSA modulus `n`
    pub rsa_bits: u64,
    /// Size of the ElGamal prime `p`
    pub elgamal_bits: u64,
}

impl KeySizes {
    pub fn validate(&self) -> Result<(), LabError> {
        for (name, bits) in [
            ("paillier", self.paillier_bits),
            ("rsa", self.rsa_bits),
        ] {
            if bits < 2 * MIN_PRIME_BITS {
                return Err(LabError::InvalidParameter(format!(
                    "{} modulus must be at least {} bits, got {}",
                    name,
                    2 * MIN_PRIME_BITS,
                    bits
                )));
            }
        }
        if self.elgamal_bits < MIN_PRIME_BITS {
            return Err(LabError::InvalidParameter(format!(
                "elgamal prime must be at least {} bits, got {}",
                MIN_PRIME_BITS, self.elgamal_bits
            )));
        }
        Ok(())
    }
}

impl Default for KeySizes {
    fn default() -> Self {
        KeySizes {
            paillier_bits: 512,
            rsa_bits: 512,
            elgamal_bits: 256,
        }
    }
}

/// Which handshake backend a new session should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModePreference {
    /// Native when the host supports it, fallback otherwise
    #[default]
    Auto,
    ForceNative,
    ForceFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    pub mode_preference: ModePreference,
    /// HKDF info label; both peers must agree on it
    pub context_label: String,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        HandshakeConfig {
            mode_preference: ModePreference::Auto,
            context_label: DEFAULT_CONTEXT_LABEL.to_string(),
        }
    }
}

/// Top-level configuration for a client instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabConfig {
    pub field: FieldConfig,
    pub key_sizes: KeySizes,
    pub handshake: HandshakeConfig,
}

impl LabConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, LabError> {
        let config: LabConfig =
            serde_json::from_str(json).map_err(|e| LabError::Encoding(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LabError> {
        self.field.validate()?;
        self.key_sizes.validate()?;
        if self.handshake.context_label.is_empty() {
            return Err(LabError::InvalidParameter(
                "handshake context label must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
