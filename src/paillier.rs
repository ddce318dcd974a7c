//! Paillier additively homomorphic encryption (simplified `g = n + 1` variant).
//!
//! Multiplying two ciphertexts modulo `n^2` yields an encryption of the sum
//! of their plaintexts modulo `n`. This is what lets a remote peer total
//! encrypted values it cannot read.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::RngCore;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::arith::{
    gen_prime, is_probable_prime, lcm, modinverse, modpow, random_range, MILLER_RABIN_ROUNDS,
};
use crate::config::MIN_PRIME_BITS;
use crate::error::LabError;
use crate::wire::{Ciphertext, PaillierKeyBundle};

/// Public key `(n, g)` with `n^2` cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaillierPublicKey {
    n: BigUint,
    g: BigUint,
    n_squared: BigUint,
}

impl PaillierPublicKey {
    /// Builds a public key from received parameters.
    ///
    /// # Errors
    /// Returns an error if `n < 2` or `g` is not in `[1, n^2)`.
    pub fn new(n: BigUint, g: BigUint) -> Result<Self, LabError> {
        if n < BigUint::from(2u32) {
            return Err(LabError::InvalidParameter(format!(
                "paillier modulus must be at least 2, got {}",
                n
            )));
        }
        let n_squared = &n * &n;
        if g.is_zero() || g >= n_squared {
            return Err(LabError::InvalidParameter(format!(
                "paillier generator {} is not in [1, n^2)",
                g
            )));
        }
        Ok(PaillierPublicKey { n, g, n_squared })
    }

    pub fn from_bundle(bundle: &PaillierKeyBundle) -> Result<Self, LabError> {
        Self::new(bundle.n.clone(), bundle.g.clone())
    }

    pub fn to_bundle(&self) -> PaillierKeyBundle {
        PaillierKeyBundle {
            n: self.n.clone(),
            g: self.g.clone(),
        }
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn g(&self) -> &BigUint {
        &self.g
    }

    pub fn n_squared(&self) -> &BigUint {
        &self.n_squared
    }

    /// Encrypts `m` with a fresh blinding factor, so encrypting the same
    /// value twice gives different ciphertexts.
    ///
    /// # Errors
    /// Returns [`LabError::PlaintextOutOfRange`] unless `0 <= m < n`.
    pub fn encrypt<R: RngCore + ?Sized>(
        &self,
        m: &BigUint,
        rng: &mut R,
    ) -> Result<Ciphertext, LabError> {
        // r must be a unit mod n or decryption breaks
        let r = loop {
            let r = random_range(&BigUint::one(), &self.n, rng)?;
            if r.gcd(&self.n).is_one() {
                break r;
            }
        };
        self.encrypt_with_blinding(m, &r)
    }

    /// Encrypts `m` with a caller-chosen blinding factor `r`.
    ///
    /// `c = (g^m mod n^2) * (r^n mod n^2) mod n^2`
    pub fn encrypt_with_blinding(&self, m: &BigUint, r: &BigUint) -> Result<Ciphertext, LabError> {
        if m >= &self.n {
            return Err(LabError::PlaintextOutOfRange(format!(
                "plaintext must be < n ({}), got {}",
                self.n, m
            )));
        }
        if r.is_zero() || r >= &self.n {
            return Err(LabError::InvalidParameter(
                "blinding factor must be in [1, n)".to_string(),
            ));
        }

        let gm = modpow(&self.g, m, &self.n_squared)?;
        let rn = modpow(r, &self.n, &self.n_squared)?;
        Ok(Ciphertext::new(gm * rn % &self.n_squared))
    }

    /// Homomorphic addition: the result decrypts to `(a + b) mod n`.
    pub fn add(&self, c1: &Ciphertext, c2: &Ciphertext) -> Result<Ciphertext, LabError> {
        self.check_ciphertext(c1)?;
        self.check_ciphertext(c2)?;
        Ok(Ciphertext::new(c1.value() * c2.value() % &self.n_squared))
    }

    /// Folds [`PaillierPublicKey::add`] over any number of ciphertexts.
    ///
    /// The empty sum is `1`, the blinding-free encryption of zero.
    pub fn sum<'a, I>(&self, ciphertexts: I) -> Result<Ciphertext, LabError>
    where
        I: IntoIterator<Item = &'a Ciphertext>,
    {
        ciphertexts
            .into_iter()
            .try_fold(Ciphertext::new(BigUint::one()), |acc, c| self.add(&acc, c))
    }

    fn check_ciphertext(&self, c: &Ciphertext) -> Result<(), LabError> {
        if c.value().is_zero() || c.value() >= &self.n_squared {
            return Err(LabError::CiphertextOutOfRange(format!(
                "ciphertext must be in [1, n^2) for n = {}",
                self.n
            )));
        }
        Ok(())
    }
}

/// Private key `(lambda, mu)`.
#[derive(Clone)]
pub struct PaillierPrivateKey {
    lambda: BigUint,
    mu: BigUint,
    public: PaillierPublicKey,
}

impl PaillierPrivateKey {
    /// `m = L(c^lambda mod n^2) * mu mod n` with `L(u) = (u - 1) / n`.
    ///
    /// # Errors
    /// Returns [`LabError::CiphertextOutOfRange`] if `c` is not a valid
    /// ciphertext under this key.
    pub fn decrypt(&self, c: &Ciphertext) -> Result<BigUint, LabError> {
        let public = &self.public;
        public.check_ciphertext(c)?;

        let u = modpow(c.value(), &self.lambda, &public.n_squared)?;
        if u.is_zero() {
            return Err(LabError::CiphertextOutOfRange(
                "ciphertext shares a factor with n".to_string(),
            ));
        }
        let (l, rem) = (u - 1u32).div_rem(&public.n);
        if !rem.is_zero() {
            return Err(LabError::CiphertextOutOfRange(
                "c^lambda is not 1 mod n; ciphertext was not produced under this key".to_string(),
            ));
        }
        Ok(l * &self.mu % &public.n)
    }

    pub fn public_key(&self) -> &PaillierPublicKey {
        &self.public
    }
}

impl Zeroize for PaillierPrivateKey {
    fn zeroize(&mut self) {
        self.lambda.set_zero();
        self.mu.set_zero();
    }
}

impl ZeroizeOnDrop for PaillierPrivateKey {}

impl Drop for PaillierPrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for PaillierPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaillierPrivateKey")
            .field("n", &self.public.n)
            .field("lambda", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct PaillierKeyPair {
    pub public: PaillierPublicKey,
    pub private: PaillierPrivateKey,
}

impl PaillierKeyPair {
    /// Builds a key pair from two distinct primes.
    ///
    /// # Errors
    /// Returns an error if `p` or `q` is not prime, `p == q`, or
    /// `gcd(pq, (p-1)(q-1)) != 1`.
    pub fn from_primes(p: &BigUint, q: &BigUint) -> Result<Self, LabError> {
        let mut rng = rand::rng();
        for prime in [p, q] {
            if !is_probable_prime(prime, MILLER_RABIN_ROUNDS, &mut rng) {
                return Err(LabError::InvalidParameter(format!("{} is not prime", prime)));
            }
        }
        if p == q {
            return Err(LabError::InvalidParameter(
                "paillier primes must be distinct".to_string(),
            ));
        }

        let n = p * q;
        let p1 = p - 1u32;
        let q1 = q - 1u32;
        if !n.gcd(&(&p1 * &q1)).is_one() {
            return Err(LabError::InvalidParameter(
                "gcd(pq, (p-1)(q-1)) must be 1".to_string(),
            ));
        }

        let lambda = lcm(&p1, &q1);
        let mu = modinverse(&lambda, &n)?;
        let g = &n + 1u32;
        let public = PaillierPublicKey::new(n, g)?;

        Ok(PaillierKeyPair {
            private: PaillierPrivateKey {
                lambda,
                mu,
                public: public.clone(),
            },
            public,
        })
    }

    /// Classroom key with `p = 61, q = 53` (`n = 3233`).
    pub fn demo() -> Result<Self, LabError> {
        Self::from_primes(&BigUint::from(61u32), &BigUint::from(53u32))
    }

    /// Generates a key pair whose modulus has exactly `bits` bits.
    pub fn generate<R: RngCore + ?Sized>(bits: u64, rng: &mut R) -> Result<Self, LabError> {
        if bits < 2 * MIN_PRIME_BITS {
            return Err(LabError::InvalidParameter(format!(
                "paillier modulus must be at least {} bits, got {}",
                2 * MIN_PRIME_BITS,
                bits
            )));
        }

        loop {
            let p = gen_prime(bits / 2, rng)?;
            let q = gen_prime(bits - bits / 2, rng)?;
            if p == q || (&p * &q).bits() != bits {
                continue;
            }
            match Self::from_primes(&p, &q) {
                Ok(pair) => {
                    info!(bits, "generated paillier key pair");
                    return Ok(pair);
                }
                Err(e) => debug!("rejected paillier primes: {e}"),
            }
        }
    }
}
