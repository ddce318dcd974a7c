//! Modular arithmetic over arbitrary-precision non-negative integers.
//!
//! Every scheme in the crate is built on the two kernel operations
//! [`modpow`] and [`modinverse`]. The module also carries the sampling and
//! primality helpers used by key generation.

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::RngCore;

use crate::error::{ArithmeticError, LabError};

/// Miller-Rabin rounds used by [`gen_prime`] and [`FieldConfig`](crate::config::FieldConfig) validation.
pub const MILLER_RABIN_ROUNDS: usize = 32;

const SMALL_PRIMES: [u32; 25] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

/// Computes `base^exponent mod modulus` by square-and-multiply.
///
/// # Errors
/// Returns [`ArithmeticError::ZeroModulus`] if `modulus` is zero.
pub fn modpow(
    base: &BigUint,
    exponent: &BigUint,
    modulus: &BigUint,
) -> Result<BigUint, ArithmeticError> {
    if modulus.is_zero() {
        return Err(ArithmeticError::ZeroModulus);
    }
    Ok(base.modpow(exponent, modulus))
}

/// Computes `a^-1 mod modulus` with the extended Euclidean algorithm.
///
/// The Bezout coefficient may go negative during the iteration; the result
/// is normalized back into `[0, modulus)`.
///
/// # Errors
/// * [`ArithmeticError::ZeroModulus`] if `modulus` is zero
/// * [`ArithmeticError::NoInverse`] if `gcd(a, modulus) != 1`
pub fn modinverse(a: &BigUint, modulus: &BigUint) -> Result<BigUint, ArithmeticError> {
    if modulus.is_zero() {
        return Err(ArithmeticError::ZeroModulus);
    }

    let m = BigInt::from(modulus.clone());
    let (mut old_r, mut r) = (BigInt::from(a % modulus), m.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());

    while !r.is_zero() {
        let q = &old_r / &r;
        let next_r = &old_r - &q * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &q * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }

    if !old_r.is_one() {
        return Err(ArithmeticError::NoInverse {
            value: a.to_string(),
            modulus: modulus.to_string(),
        });
    }

    // mod_floor keeps the sign of the (positive) modulus
    let (_, inverse) = old_s.mod_floor(&m).into_parts();
    Ok(inverse)
}

/// Least common multiple.
pub fn lcm(a: &BigUint, b: &BigUint) -> BigUint {
    a.lcm(b)
}

/// Draws a uniform integer in `[0, bound)` by rejection sampling.
///
/// # Errors
/// Returns [`ArithmeticError::ZeroModulus`] for an empty range.
pub fn random_below<R: RngCore + ?Sized>(
    bound: &BigUint,
    rng: &mut R,
) -> Result<BigUint, ArithmeticError> {
    if bound.is_zero() {
        return Err(ArithmeticError::ZeroModulus);
    }

    let bits = bound.bits();
    let len = bits.div_ceil(8) as usize;
    let excess = (len as u64 * 8 - bits) as u32;
    let mut buf = vec![0u8; len];

    loop {
        rng.fill_bytes(&mut buf);
        buf[0] &= 0xffu8 >> excess;
        let candidate = BigUint::from_bytes_be(&buf);
        if &candidate < bound {
            return Ok(candidate);
        }
    }
}

/// Draws a uniform integer in `[low, high)`.
pub fn random_range<R: RngCore + ?Sized>(
    low: &BigUint,
    high: &BigUint,
    rng: &mut R,
) -> Result<BigUint, ArithmeticError> {
    if high <= low {
        return Err(ArithmeticError::ZeroModulus);
    }
    Ok(low + random_below(&(high - low), rng)?)
}

/// Miller-Rabin probabilistic primality test.
pub fn is_probable_prime<R: RngCore + ?Sized>(n: &BigUint, rounds: usize, rng: &mut R) -> bool {
    let two = BigUint::from(2u32);
    if n < &two {
        return false;
    }
    for &p in SMALL_PRIMES.iter() {
        let p = BigUint::from(p);
        if n == &p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }

    let n_minus_one = n - 1u32;
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;

    'witness: for _ in 0..rounds {
        // a in [2, n-2]; n > 97 here so the range is non-empty
        let a = match random_range(&two, &n_minus_one, rng) {
            Ok(a) => a,
            Err(_) => return false,
        };
        let mut x = a.modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Generates a random probable prime of exactly `bits` bits.
///
/// # Errors
/// Returns an error if `bits < 2`.
pub fn gen_prime<R: RngCore + ?Sized>(bits: u64, rng: &mut R) -> Result<BigUint, LabError> {
    if bits < 2 {
        return Err(LabError::InvalidParameter(format!(
            "prime size must be at least 2 bits, got {}",
            bits
        )));
    }

    let top = BigUint::one() << (bits - 1);
    loop {
        let mut candidate = random_below(&top, rng)? | &top;
        candidate |= BigUint::one();
        if is_probable_prime(&candidate, MILLER_RABIN_ROUNDS, rng) {
            return Ok(candidate);
        }
    }
}

/// Generates a safe prime `p = 2q + 1` of `bits` bits, returning `(p, q)`.
pub fn gen_safe_prime<R: RngCore + ?Sized>(
    bits: u64,
    rng: &mut R,
) -> Result<(BigUint, BigUint), LabError> {
    if bits < 3 {
        return Err(LabError::InvalidParameter(format!(
            "safe prime size must be at least 3 bits, got {}",
            bits
        )));
    }

    loop {
        let q = gen_prime(bits - 1, rng)?;
        let p: BigUint = (&q << 1u32) + 1u32;
        if p.bits() == bits && is_probable_prime(&p, MILLER_RABIN_ROUNDS, rng) {
            return Ok((p, q));
        }
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
    fn test_modpow() {
        assert_eq!(modpow(&big(4), &big(13), &big(497)).unwrap(), big(445));
        assert_eq!(modpow(&big(7), &big(0), &big(13)).unwrap(), big(1));
        assert_eq!(modpow(&big(7), &big(5), &big(1)).unwrap(), big(0));
    }

    #[test]
    fn test_modpow_zero_modulus() {
        assert_eq!(
            modpow(&big(2), &big(3), &big(0)),
            Err(ArithmeticError::ZeroModulus)
        );
    }

    #[test]
    fn test_modinverse() {
        assert_eq!(modinverse(&big(3), &big(7)).unwrap(), big(5));
        assert_eq!(modinverse(&big(17), &big(3120)).unwrap(), big(2753));
        // a larger than the modulus is reduced first
        assert_eq!(modinverse(&big(10), &big(7)).unwrap(), big(5));
        assert_eq!(modinverse(&big(5), &big(1)).unwrap(), big(0));
    }

    #[test]
    fn test_modinverse_every_element_of_small_field() {
        let p = big(257);
        for a in 1..257u64 {
            let inv = modinverse(&big(a), &p).unwrap();
            assert_eq!((big(a) * inv) % &p, big(1));
        }
    }

    #[test]
    fn test_modinverse_not_coprime() {
        let err = modinverse(&big(6), &big(9)).unwrap_err();
        assert!(matches!(err, ArithmeticError::NoInverse { .. }));
        assert!(modinverse(&big(0), &big(5)).is_err());
        assert_eq!(
            modinverse(&big(3), &big(0)),
            Err(ArithmeticError::ZeroModulus)
        );
    }

    #[test]
    fn test_random_below_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let bound = big(257);
        for _ in 0..1000 {
            assert!(random_below(&bound, &mut rng).unwrap() < bound);
        }
        assert_eq!(random_below(&big(1), &mut rng).unwrap(), big(0));
        assert!(random_below(&big(0), &mut rng).is_err());
    }

    #[test]
    fn test_primality() {
        let mut rng = StdRng::seed_from_u64(11);
        for p in [2u64, 3, 61, 53, 257, 65537, 2_147_483_647] {
            assert!(is_probable_prime(&big(p), 16, &mut rng), "{} is prime", p);
        }
        for c in [0u64, 1, 4, 561, 3233, 65535, 2_147_483_649] {
            assert!(!is_probable_prime(&big(c), 16, &mut rng), "{} is composite", c);
        }
    }

    #[test]
    fn test_gen_prime_bit_length() {
        let mut rng = StdRng::seed_from_u64(3);
        let p = gen_prime(64, &mut rng).unwrap();
        assert_eq!(p.bits(), 64);
        assert!(is_probable_prime(&p, 16, &mut rng));
        assert!(gen_prime(1, &mut rng).is_err());
    }

    #[test]
    fn test_gen_safe_prime() {
        let mut rng = StdRng::seed_from_u64(5);
        let (p, q) = gen_safe_prime(32, &mut rng).unwrap();
        assert_eq!(p, (&q << 1u32) + 1u32);
        assert_eq!(p.bits(), 32);
    }
}
