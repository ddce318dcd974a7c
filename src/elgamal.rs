//! ElGamal over `Z_p*`, used as a multiplicatively homomorphic scheme.
//!
//! A ciphertext is the pair `(g^k, m * y^k)`; multiplying two ciphertexts
//! component-wise yields an encryption of the product of the plaintexts
//! under the combined ephemeral `k1 + k2`.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::arith::{gen_safe_prime, modinverse, modpow, random_range};
use crate::config::MIN_PRIME_BITS;
use crate::error::LabError;
use crate::wire::{decimal, ElGamalKeyBundle};

/// `{ c1, c2 }` with both components as decimal strings on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElGamalCiphertext {
    #[serde(with = "decimal")]
    pub c1: BigUint,
    #[serde(with = "decimal")]
    pub c2: BigUint,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElGamalPublicKey {
    p: BigUint,
    g: BigUint,
    y: BigUint,
}

impl ElGamalPublicKey {
    pub fn new(p: BigUint, g: BigUint, y: BigUint) -> Result<Self, LabError> {
        if p < BigUint::from(3u32) {
            return Err(LabError::InvalidParameter(format!(
                "elgamal prime must be at least 3, got {}",
                p
            )));
        }
        if g <= BigUint::one() || g >= p {
            return Err(LabError::InvalidParameter(format!(
                "elgamal generator {} is not in (1, p)",
                g
            )));
        }
        if y.is_zero() || y >= p {
            return Err(LabError::InvalidParameter(format!(
                "elgamal public value {} is not in [1, p)",
                y
            )));
        }
        Ok(ElGamalPublicKey { p, g, y })
    }

    pub fn from_bundle(bundle: &ElGamalKeyBundle) -> Result<Self, LabError> {
        Self::new(bundle.p.clone(), bundle.g.clone(), bundle.y.clone())
    }

    pub fn to_bundle(&self) -> ElGamalKeyBundle {
        ElGamalKeyBundle {
            p: self.p.clone(),
            g: self.g.clone(),
            y: self.y.clone(),
        }
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    /// Encrypts `m` with a fresh ephemeral exponent.
    pub fn encrypt<R: RngCore + ?Sized>(
        &self,
        m: &BigUint,
        rng: &mut R,
    ) -> Result<ElGamalCiphertext, LabError> {
        let k = random_range(&BigUint::one(), &(&self.p - 1u32), rng)?;
        self.encrypt_with_ephemeral(m, &k)
    }

    /// Encrypts `m` with a caller-chosen ephemeral exponent `k`.
    pub fn encrypt_with_ephemeral(
        &self,
        m: &BigUint,
        k: &BigUint,
    ) -> Result<ElGamalCiphertext, LabError> {
        if m >= &self.p {
            return Err(LabError::PlaintextOutOfRange(format!(
                "plaintext must be < p ({}), got {}",
                self.p, m
            )));
        }
        let c1 = modpow(&self.g, k, &self.p)?;
        let c2 = m * modpow(&self.y, k, &self.p)? % &self.p;
        Ok(ElGamalCiphertext { c1, c2 })
    }

    /// Component-wise product; decrypts to `(a * b) mod p`.
    pub fn multiply(
        &self,
        a: &ElGamalCiphertext,
        b: &ElGamalCiphertext,
    ) -> Result<ElGamalCiphertext, LabError> {
        self.check_ciphertext(a)?;
        self.check_ciphertext(b)?;
        Ok(ElGamalCiphertext {
            c1: &a.c1 * &b.c1 % &self.p,
            c2: &a.c2 * &b.c2 % &self.p,
        })
    }

    /// Folds [`ElGamalPublicKey::multiply`]; the empty product is `(1, 1)`.
    pub fn product<'a, I>(&self, ciphertexts: I) -> Result<ElGamalCiphertext, LabError>
    where
        I: IntoIterator<Item = &'a ElGamalCiphertext>,
    {
        let one = ElGamalCiphertext {
            c1: BigUint::one(),
            c2: BigUint::one(),
        };
        ciphertexts
            .into_iter()
            .try_fold(one, |acc, c| self.multiply(&acc, c))
    }

    fn check_ciphertext(&self, c: &ElGamalCiphertext) -> Result<(), LabError> {
        if c.c1.is_zero() || c.c1 >= self.p || c.c2 >= self.p {
            return Err(LabError::CiphertextOutOfRange(format!(
                "ciphertext components must be < p ({}) with c1 != 0",
                self.p
            )));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ElGamalPrivateKey {
    x: BigUint,
    public: ElGamalPublicKey,
}

impl ElGamalPrivateKey {
    /// `m = c2 * (c1^x)^-1 mod p`.
    pub fn decrypt(&self, c: &ElGamalCiphertext) -> Result<BigUint, LabError> {
        let public = &self.public;
        public.check_ciphertext(c)?;
        let shared = modpow(&c.c1, &self.x, &public.p)?;
        let inverse = modinverse(&shared, &public.p)?;
        Ok(&c.c2 * inverse % &public.p)
    }

    pub fn public_key(&self) -> &ElGamalPublicKey {
        &self.public
    }
}

impl Zeroize for ElGamalPrivateKey {
    fn zeroize(&mut self) {
        self.x.set_zero();
    }
}

impl ZeroizeOnDrop for ElGamalPrivateKey {}

impl Drop for ElGamalPrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for ElGamalPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElGamalPrivateKey")
            .field("p", &self.public.p)
            .field("x", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct ElGamalKeyPair {
    pub public: ElGamalPublicKey,
    pub private: ElGamalPrivateKey,
}

impl ElGamalKeyPair {
    /// Builds a key pair from group parameters and a secret exponent.
    pub fn from_secret(p: BigUint, g: BigUint, x: BigUint) -> Result<Self, LabError> {
        if x.is_zero() || x >= &p - 1u32 {
            return Err(LabError::InvalidParameter(
                "elgamal secret exponent must be in [1, p-1)".to_string(),
            ));
        }
        let y = modpow(&g, &x, &p)?;
        let public = ElGamalPublicKey::new(p, g, y)?;
        Ok(ElGamalKeyPair {
            private: ElGamalPrivateKey {
                x,
                public: public.clone(),
            },
            public,
        })
    }

    /// Classroom key over `p = 467` with `g = 2`.
    pub fn demo() -> Result<Self, LabError> {
        Self::from_secret(
            BigUint::from(467u32),
            BigUint::from(2u32),
            BigUint::from(127u32),
        )
    }

    /// Generates a key over a fresh `bits`-bit safe prime `p = 2q + 1`, with
    /// `g` generating the order-`q` subgroup of quadratic residues.
    pub fn generate<R: RngCore + ?Sized>(bits: u64, rng: &mut R) -> Result<Self, LabError> {
        if bits < MIN_PRIME_BITS {
            return Err(LabError::InvalidParameter(format!(
                "elgamal prime must be at least {} bits, got {}",
                MIN_PRIME_BITS, bits
            )));
        }

        let (p, q) = gen_safe_prime(bits, rng)?;
        let two = BigUint::from(2u32);
        let g = loop {
            let h = random_range(&two, &(&p - 1u32), rng)?;
            let g = h.modpow(&two, &p);
            if !g.is_one() {
                break g;
            }
        };
        let x = random_range(&BigUint::one(), &q, rng)?;
        let pair = Self::from_secret(p, g, x)?;
        info!(bits, "generated elgamal key pair");
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn big(v: u64) -> BigUint {
        BigUint::from(v)
    }

    #[test]
    fn test_encrypt_decrypt_demo() {
        let mut rng = StdRng::seed_from_u64(31);
        let pair = ElGamalKeyPair::demo().unwrap();
        for m in [0u64, 1, 2, 100, 466] {
            let c = pair.public.encrypt(&big(m), &mut rng).unwrap();
            assert_eq!(pair.private.decrypt(&c).unwrap(), big(m));
        }
    }

    #[test]
    fn test_multiplicative_homomorphism() {
        let mut rng = StdRng::seed_from_u64(32);
        let pair = ElGamalKeyPair::generate(64, &mut rng).unwrap();
        let p = pair.public.p().clone();
        for (a, b) in [(2u64, 3u64), (12345, 67890), (1 << 40, 1 << 30)] {
            let ca = pair.public.encrypt(&big(a), &mut rng).unwrap();
            let cb = pair.public.encrypt(&big(b), &mut rng).unwrap();
            let prod = pair.public.multiply(&ca, &cb).unwrap();
            assert_eq!(pair.private.decrypt(&prod).unwrap(), big(a) * big(b) % &p);
        }
    }

    #[test]
    fn test_fixed_ephemeral_is_deterministic() {
        let pair = ElGamalKeyPair::demo().unwrap();
        let c1 = pair.public.encrypt_with_ephemeral(&big(9), &big(5)).unwrap();
        let c2 = pair.public.encrypt_with_ephemeral(&big(9), &big(5)).unwrap();
        assert_eq!(c1, c2);
        // g^5 = 32
        assert_eq!(c1.c1, big(32));
    }

    #[test]
    fn test_product_and_wire_shape() {
        let mut rng = StdRng::seed_from_u64(33);
        let pair = ElGamalKeyPair::demo().unwrap();
        let cts: Vec<ElGamalCiphertext> = [2u64, 3, 5]
            .iter()
            .map(|v| pair.public.encrypt(&big(*v), &mut rng).unwrap())
            .collect();
        let prod = pair.public.product(&cts).unwrap();
        assert_eq!(pair.private.decrypt(&prod).unwrap(), big(30));

        let json = serde_json::to_value(&prod).unwrap();
        assert!(json["c1"].is_string());
        let back: ElGamalCiphertext = serde_json::from_value(json).unwrap();
        assert_eq!(back, prod);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut rng = StdRng::seed_from_u64(34);
        let pair = ElGamalKeyPair::demo().unwrap();
        assert!(pair.public.encrypt(&big(467), &mut rng).is_err());
        let bad = ElGamalCiphertext {
            c1: big(0),
            c2: big(5),
        };
        assert!(pair.private.decrypt(&bad).is_err());
        assert!(ElGamalPublicKey::new(big(467), big(1), big(5)).is_err());
    }

    #[test]
    fn test_bundle_round_trip() {
        let pair = ElGamalKeyPair::demo().unwrap();
        let bundle = pair.public.to_bundle();
        assert_eq!(ElGamalPublicKey::from_bundle(&bundle).unwrap(), pair.public);
    }
}
