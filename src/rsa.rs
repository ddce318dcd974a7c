//! Textbook RSA used as a multiplicatively homomorphic scheme.
//!
//! `E(a) * E(b) = a^e * b^e = (ab)^e = E(ab) mod n`.
//!
//! There is no padding and no randomness: equal plaintexts always give equal
//! ciphertexts, so the scheme is not semantically secure. It exists here to
//! demonstrate the homomorphic property only.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::RngCore;
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::arith::{gen_prime, modinverse, modpow};
use crate::config::MIN_PRIME_BITS;
use crate::error::LabError;
use crate::wire::{Ciphertext, RsaKeyBundle};

/// Public exponent used by [`RsaKeyPair::generate`].
pub const DEFAULT_PUBLIC_EXPONENT: u32 = 65537;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RsaPublicKey {
    n: BigUint,
    e: BigUint,
}

impl RsaPublicKey {
    pub fn new(n: BigUint, e: BigUint) -> Result<Self, LabError> {
        if n < BigUint::from(2u32) {
            return Err(LabError::InvalidParameter(format!(
                "rsa modulus must be at least 2, got {}",
                n
            )));
        }
        if e.is_zero() {
            return Err(LabError::InvalidParameter(
                "rsa public exponent must be positive".to_string(),
            ));
        }
        Ok(RsaPublicKey { n, e })
    }

    pub fn from_bundle(bundle: &RsaKeyBundle) -> Result<Self, LabError> {
        Self::new(bundle.n.clone(), bundle.e.clone())
    }

    pub fn to_bundle(&self) -> RsaKeyBundle {
        RsaKeyBundle {
            n: self.n.clone(),
            e: self.e.clone(),
        }
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn e(&self) -> &BigUint {
        &self.e
    }

    /// `c = m^e mod n`. Deterministic.
    pub fn encrypt(&self, m: &BigUint) -> Result<Ciphertext, LabError> {
        if m >= &self.n {
            return Err(LabError::PlaintextOutOfRange(format!(
                "plaintext must be < n ({}), got {}",
                self.n, m
            )));
        }
        Ok(Ciphertext::new(modpow(m, &self.e, &self.n)?))
    }

    /// Homomorphic multiplication: the result decrypts to `(a * b) mod n`.
    pub fn multiply(&self, c1: &Ciphertext, c2: &Ciphertext) -> Result<Ciphertext, LabError> {
        self.check_ciphertext(c1)?;
        self.check_ciphertext(c2)?;
        Ok(Ciphertext::new(c1.value() * c2.value() % &self.n))
    }

    /// Folds [`RsaPublicKey::multiply`]; the empty product is `1 = E(1)`.
    pub fn product<'a, I>(&self, ciphertexts: I) -> Result<Ciphertext, LabError>
    where
        I: IntoIterator<Item = &'a Ciphertext>,
    {
        ciphertexts
            .into_iter()
            .try_fold(Ciphertext::new(BigUint::one()), |acc, c| {
                self.multiply(&acc, c)
            })
    }

    fn check_ciphertext(&self, c: &Ciphertext) -> Result<(), LabError> {
        if c.value() >= &self.n {
            return Err(LabError::CiphertextOutOfRange(format!(
                "ciphertext must be < n ({})",
                self.n
            )));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct RsaPrivateKey {
    d: BigUint,
    public: RsaPublicKey,
}

impl RsaPrivateKey {
    /// `m = c^d mod n`.
    pub fn decrypt(&self, c: &Ciphertext) -> Result<BigUint, LabError> {
        self.public.check_ciphertext(c)?;
        Ok(modpow(c.value(), &self.d, &self.public.n)?)
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }
}

impl Zeroize for RsaPrivateKey {
    fn zeroize(&mut self) {
        self.d.set_zero();
    }
}

impl ZeroizeOnDrop for RsaPrivateKey {}

impl Drop for RsaPrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("n", &self.public.n)
            .field("d", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct RsaKeyPair {
    pub public: RsaPublicKey,
    pub private: RsaPrivateKey,
}

impl RsaKeyPair {
    /// Builds a key pair from primes `p != q` and public exponent `e`.
    ///
    /// # Errors
    /// Returns an error if `p == q` or `e` is not invertible modulo
    /// `(p-1)(q-1)`.
    pub fn from_primes(p: &BigUint, q: &BigUint, e: &BigUint) -> Result<Self, LabError> {
        if p == q {
            return Err(LabError::InvalidParameter(
                "rsa primes must be distinct".to_string(),
            ));
        }
        let n = p * q;
        let phi = (p - 1u32) * (q - 1u32);
        let d = modinverse(e, &phi)?;
        let public = RsaPublicKey::new(n, e.clone())?;
        Ok(RsaKeyPair {
            private: RsaPrivateKey {
                d,
                public: public.clone(),
            },
            public,
        })
    }

    /// Classroom key `p = 61, q = 53, e = 17` (`n = 3233`, `d = 2753`).
    pub fn demo() -> Result<Self, LabError> {
        Self::from_primes(
            &BigUint::from(61u32),
            &BigUint::from(53u32),
            &BigUint::from(17u32),
        )
    }

    /// Generates a key pair with a `bits`-bit modulus and `e = 65537`.
    pub fn generate<R: RngCore + ?Sized>(bits: u64, rng: &mut R) -> Result<Self, LabError> {
        if bits < 2 * MIN_PRIME_BITS {
            return Err(LabError::InvalidParameter(format!(
                "rsa modulus must be at least {} bits, got {}",
                2 * MIN_PRIME_BITS,
                bits
            )));
        }

        let e = BigUint::from(DEFAULT_PUBLIC_EXPONENT);
        loop {
            let p = gen_prime(bits / 2, rng)?;
            let q = gen_prime(bits - bits / 2, rng)?;
            if p == q || (&p * &q).bits() != bits {
                continue;
            }
            let phi = (&p - 1u32) * (&q - 1u32);
            if !e.gcd(&phi).is_one() {
                continue;
            }
            let pair = Self::from_primes(&p, &q, &e)?;
            info!(bits, "generated rsa key pair");
            return Ok(pair);
        }
    }
}
