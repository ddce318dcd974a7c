//! Shamir threshold secret sharing over a prime field GF(p).
//!
//! A secret is the constant term of a random polynomial of degree `t - 1`;
//! share `i` is the polynomial evaluated at `x = i`. Any `t` shares recover
//! the constant term by Lagrange interpolation at zero.

use std::collections::HashSet;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::RngCore;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::arith::{modinverse, random_range};
use crate::config::FieldConfig;
use crate::error::LabError;
use crate::wire::WireShare;

/// One point `(x, f(x))` of the sharing polynomial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Share {
    /// Evaluation index, `1..=n`
    pub x: u64,
    /// `f(x) mod p`
    pub y: BigUint,
}

impl Share {
    pub fn new(x: u64, y: BigUint) -> Self {
        Share { x, y }
    }
}

impl From<Share> for WireShare {
    fn from(share: Share) -> Self {
        WireShare {
            x: share.x,
            y: share.y,
        }
    }
}

impl From<WireShare> for Share {
    fn from(share: WireShare) -> Self {
        Share {
            x: share.x,
            y: share.y,
        }
    }
}

/// Coefficients `[secret, a1, ..., a(t-1)]`. Lives only for the duration of
/// a split and is wiped on drop.
struct Polynomial {
    coeffs: Vec<BigUint>,
}

impl Polynomial {
    fn random<R: RngCore + ?Sized>(
        secret: &BigUint,
        threshold: usize,
        prime: &BigUint,
        rng: &mut R,
    ) -> Result<Self, LabError> {
        let mut coeffs = Vec::with_capacity(threshold);
        coeffs.push(secret.clone());
        for _ in 1..threshold {
            coeffs.push(random_range(&BigUint::one(), prime, rng)?);
        }
        Ok(Polynomial { coeffs })
    }

    /// Horner evaluation modulo `prime`.
    fn evaluate(&self, x: &BigUint, prime: &BigUint) -> BigUint {
        self.coeffs
            .iter()
            .rev()
            .fold(BigUint::zero(), |acc, c| (acc * x + c) % prime)
    }
}

impl Zeroize for Polynomial {
    fn zeroize(&mut self) {
        // BigUint exposes no raw limbs, so overwrite each value with zero
        self.coeffs.iter_mut().for_each(|c| c.set_zero());
        self.coeffs.clear();
    }
}

impl ZeroizeOnDrop for Polynomial {}

impl Drop for Polynomial {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Secret sharing engine bound to one field.
#[derive(Clone, Debug)]
pub struct ShamirScheme {
    field: FieldConfig,
}

impl ShamirScheme {
    /// Creates an engine for a validated field.
    ///
    /// # Errors
    /// Returns an error if the prime is not prime or is too small for the
    /// declared secret range.
    pub fn new(field: FieldConfig) -> Result<Self, LabError> {
        field.validate()?;
        Ok(ShamirScheme { field })
    }

    /// Engine over the classroom `p = 257` field.
    pub fn demo() -> Self {
        ShamirScheme {
            field: FieldConfig::demo(),
        }
    }

    pub fn prime(&self) -> &BigUint {
        &self.field.prime
    }

    /// Splits `secret` into `n` shares, any `threshold` of which recover it.
    ///
    /// # Errors
    /// * [`LabError::FieldOverflow`] if `secret` is above the field's
    ///   `max_secret` (always below `p`)
    /// * [`LabError::InvalidParameter`] unless `1 <= threshold <= n < p`
    pub fn split<R: RngCore + ?Sized>(
        &self,
        secret: &BigUint,
        n: usize,
        threshold: usize,
        rng: &mut R,
    ) -> Result<Vec<Share>, LabError> {
        let prime = self.prime();
        let limit = &self.field.max_secret;
        if secret > limit || secret >= prime {
            return Err(LabError::FieldOverflow {
                secret: secret.to_string(),
                limit: limit.min(&(prime - 1u32)).to_string(),
            });
        }
        if threshold == 0 {
            return Err(LabError::InvalidParameter(
                "threshold must be at least 1".to_string(),
            ));
        }
        if threshold > n {
            return Err(LabError::InvalidParameter(format!(
                "threshold ({}) must be <= number of shares ({})",
                threshold, n
            )));
        }
        if &BigUint::from(n) >= prime {
            return Err(LabError::InvalidParameter(format!(
                "number of shares ({}) must be < field prime ({})",
                n, prime
            )));
        }

        let poly = Polynomial::random(secret, threshold, prime, rng)?;
        let shares = (1..=n as u64)
            .map(|x| Share::new(x, poly.evaluate(&BigUint::from(x), prime)))
            .collect();

        info!(n, threshold, "split secret into shares");
        Ok(shares)
    }

    /// Recovers `f(0)` from the supplied shares by Lagrange interpolation.
    ///
    /// The engine does not know the threshold the shares were produced with.
    /// Supplying fewer than `threshold` shares yields a wrong value without
    /// any error; use [`ShamirScheme::reconstruct_checked`] when the
    /// threshold is known. The order of `shares` does not matter.
    ///
    /// # Errors
    /// * [`LabError::DuplicateShare`] if two shares have the same `x`
    /// * [`LabError::InvalidParameter`] for `x = 0` or an unreduced `y`
    pub fn reconstruct(&self, shares: &[Share]) -> Result<BigUint, LabError> {
        let prime = self.prime();
        if shares.is_empty() {
            return Err(LabError::InsufficientShares {
                supplied: 0,
                threshold: 1,
            });
        }
        self.check_shares(shares)?;

        let xs: Vec<BigUint> = shares.iter().map(|s| BigUint::from(s.x) % prime).collect();
        let mut secret = BigUint::zero();

        for (i, share) in shares.iter().enumerate() {
            let mut numerator = BigUint::one();
            let mut denominator = BigUint::one();
            for (j, xj) in xs.iter().enumerate() {
                if i == j {
                    continue;
                }
                // (0 - xj) and (xi - xj), kept in [0, p)
                numerator = numerator * ((prime - xj) % prime) % prime;
                denominator = denominator * ((&xs[i] + prime - xj) % prime) % prime;
            }
            let basis = numerator * modinverse(&denominator, prime)? % prime;
            secret = (secret + &share.y * basis) % prime;
        }

        debug!(shares = shares.len(), "reconstructed secret");
        Ok(secret)
    }

    /// Like [`ShamirScheme::reconstruct`] but refuses to interpolate from
    /// fewer than `threshold` shares.
    pub fn reconstruct_checked(
        &self,
        shares: &[Share],
        threshold: usize,
    ) -> Result<BigUint, LabError> {
        if shares.len() < threshold {
            return Err(LabError::InsufficientShares {
                supplied: shares.len(),
                threshold,
            });
        }
        self.reconstruct(shares)
    }

    fn check_shares(&self, shares: &[Share]) -> Result<(), LabError> {
        let prime = self.prime();
        let mut seen = HashSet::with_capacity(shares.len());
        for share in shares {
            let x = BigUint::from(share.x) % prime;
            if x.is_zero() {
                return Err(LabError::InvalidParameter(format!(
                    "share index {} is zero in the field",
                    share.x
                )));
            }
            if &share.y >= prime {
                return Err(LabError::InvalidParameter(format!(
                    "share {} value is not reduced modulo {}",
                    share.x, prime
                )));
            }
            if !seen.insert(x) {
                return Err(LabError::DuplicateShare { x: share.x });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn big(v: u64) -> BigUint {
        BigUint::from(v)
    }

    fn pick(shares: &[Share], xs: &[u64]) -> Vec<Share> {
        shares
            .iter()
            .filter(|s| xs.contains(&s.x))
            .cloned()
            .collect()
    }

    /// All k-element subsets of `items`.
    fn subsets(items: &[Share], k: usize) -> Vec<Vec<Share>> {
        if k == 0 {
            return vec![vec![]];
        }
        if items.len() < k {
            return vec![];
        }
        let mut with_first: Vec<Vec<Share>> = subsets(&items[1..], k - 1)
            .into_iter()
            .map(|mut rest| {
                rest.insert(0, items[0].clone());
                rest
            })
            .collect();
        with_first.extend(subsets(&items[1..], k));
        with_first
    }

    #[test]
    fn test_split_123_reconstruct_from_1_3_5() {
        let mut rng = StdRng::seed_from_u64(123);
        let scheme = ShamirScheme::demo();
        let shares = scheme.split(&big(123), 5, 3, &mut rng).unwrap();
        assert_eq!(shares.len(), 5);
        assert_eq!(
            shares.iter().map(|s| s.x).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );

        let chosen = pick(&shares, &[1, 3, 5]);
        assert_eq!(scheme.reconstruct(&chosen).unwrap(), big(123));
    }

    #[test]
    fn test_two_of_three_is_wrong_or_rejected() {
        let mut rng = StdRng::seed_from_u64(123);
        let scheme = ShamirScheme::demo();
        let shares = scheme.split(&big(123), 5, 3, &mut rng).unwrap();
        let chosen = pick(&shares, &[1, 3]);

        // The line through x=1 and x=3 hits s - 3*a2 at zero, and a2 != 0.
        assert_ne!(scheme.reconstruct(&chosen).unwrap(), big(123));

        let err = scheme.reconstruct_checked(&chosen, 3).unwrap_err();
        assert_eq!(
            err,
            LabError::InsufficientShares {
                supplied: 2,
                threshold: 3
            }
        );
    }

    #[test]
    fn test_round_trip_every_secret_every_subset() {
        let mut rng = StdRng::seed_from_u64(1);
        let scheme = ShamirScheme::demo();
        for secret in 0..257u64 {
            let shares = scheme.split(&big(secret), 5, 3, &mut rng).unwrap();
            for subset in subsets(&shares, 3) {
                assert_eq!(scheme.reconstruct(&subset).unwrap(), big(secret));
            }
        }
    }

    #[test]
    fn test_under_threshold_never_recovers() {
        // coefficients are drawn from [1, p-1], so the top term never vanishes
        let mut rng = StdRng::seed_from_u64(2);
        let scheme = ShamirScheme::demo();
        for secret in [0u64, 1, 42, 200, 256] {
            let shares = scheme.split(&big(secret), 6, 4, &mut rng).unwrap();
            for subset in subsets(&shares, 3) {
                assert_ne!(scheme.reconstruct(&subset).unwrap(), big(secret));
            }
        }
    }

    #[test]
    fn test_threshold_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let scheme = ShamirScheme::demo();

        // t = 1: every share is the secret itself
        let shares = scheme.split(&big(77), 4, 1, &mut rng).unwrap();
        assert!(shares.iter().all(|s| s.y == big(77)));

        // t = n: all shares needed
        let shares = scheme.split(&big(77), 4, 4, &mut rng).unwrap();
        assert_eq!(scheme.reconstruct(&shares).unwrap(), big(77));

        assert!(scheme.split(&big(77), 4, 0, &mut rng).is_err());
        assert!(scheme.split(&big(77), 4, 5, &mut rng).is_err());
        assert!(scheme.split(&big(77), 257, 2, &mut rng).is_err());
    }

    #[test]
    fn test_order_does_not_matter() {
        let mut rng = StdRng::seed_from_u64(4);
        let scheme = ShamirScheme::demo();
        let shares = scheme.split(&big(99), 5, 3, &mut rng).unwrap();
        let forward = pick(&shares, &[2, 4, 5]);
        let mut backward = forward.clone();
        backward.reverse();
        assert_eq!(
            scheme.reconstruct(&forward).unwrap(),
            scheme.reconstruct(&backward).unwrap()
        );
    }

    #[test]
    fn test_field_overflow() {
        let mut rng = StdRng::seed_from_u64(5);
        let scheme = ShamirScheme::demo();
        let err = scheme.split(&big(257), 5, 3, &mut rng).unwrap_err();
        assert!(matches!(err, LabError::FieldOverflow { .. }));
    }

    #[test]
    fn test_secret_above_declared_range() {
        let mut rng = StdRng::seed_from_u64(8);
        let scheme = ShamirScheme::new(FieldConfig::new(big(257), big(100)).unwrap()).unwrap();

        let err = scheme.split(&big(150), 5, 3, &mut rng).unwrap_err();
        assert_eq!(
            err,
            LabError::FieldOverflow {
                secret: "150".to_string(),
                limit: "100".to_string()
            }
        );

        let shares = scheme.split(&big(100), 5, 3, &mut rng).unwrap();
        assert_eq!(scheme.reconstruct(&shares[..3]).unwrap(), big(100));
    }

    #[test]
    fn test_duplicate_x_rejected() {
        let mut rng = StdRng::seed_from_u64(6);
        let scheme = ShamirScheme::demo();
        let shares = scheme.split(&big(10), 5, 3, &mut rng).unwrap();
        let dup = vec![shares[0].clone(), shares[1].clone(), shares[0].clone()];
        assert_eq!(
            scheme.reconstruct(&dup).unwrap_err(),
            LabError::DuplicateShare { x: 1 }
        );

        // 258 is the same field element as 1
        let aliased = vec![shares[0].clone(), Share::new(258, shares[1].y.clone())];
        assert!(matches!(
            scheme.reconstruct(&aliased).unwrap_err(),
            LabError::DuplicateShare { x: 258 }
        ));
    }

    #[test]
    fn test_rejects_malformed_shares() {
        let scheme = ShamirScheme::demo();
        assert!(scheme.reconstruct(&[]).is_err());
        assert!(scheme.reconstruct(&[Share::new(0, big(5))]).is_err());
        assert!(scheme.reconstruct(&[Share::new(1, big(300))]).is_err());
    }

    #[test]
    fn test_large_field() {
        let mut rng = StdRng::seed_from_u64(7);
        let scheme = ShamirScheme::new(FieldConfig::default()).unwrap();
        let secret = BigUint::parse_bytes(b"123456789012345678901234567890", 10).unwrap();
        let shares = scheme.split(&secret, 7, 4, &mut rng).unwrap();
        assert!(shares.iter().all(|s| &s.y < scheme.prime()));
        let chosen = pick(&shares, &[7, 2, 5, 3]);
        assert_eq!(scheme.reconstruct_checked(&chosen, 4).unwrap(), secret);
    }

    #[test]
    fn test_wire_share_conversion() {
        let share = Share::new(3, big(200));
        let wire: WireShare = share.clone().into();
        let json = serde_json::to_string(&wire).unwrap();
        assert_eq!(json, r#"{"x":3,"y":200}"#);
        let back: Share = serde_json::from_str::<WireShare>(&json).unwrap().into();
        assert_eq!(back, share);
    }
}
