//! Privacy Lab
//!
//! Local-side primitives for a privacy-preserving computation demo:
//! threshold secret sharing, homomorphic encryption and a secure channel
//! handshake.
//!
//! ## Key Components
//!
//! - **Arithmetic**: modular exponentiation and inverse over arbitrary
//!   precision integers, primality testing and prime generation
//! - **Secret Sharing**: Shamir's `(t, n)` scheme over a prime field
//! - **Homomorphic Encryption**: Paillier (additive), RSA and ElGamal
//!   (multiplicative), plus batch aggregation as performed by the compute peer
//! - **Secure Channel**: ephemeral P-256 ECDH, HKDF-SHA256 and AES-256-GCM,
//!   with a clearly weaker software fallback
//!
//! ## Example
//!
//! ```rust,no_run
//! use num_bigint::BigUint;
//! use privacy_lab::{paillier::PaillierKeyPair, sharing::ShamirScheme};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(7);
//!
//! // Threshold sharing: any 3 of 5 shares recover the secret
//! let scheme = ShamirScheme::demo();
//! let shares = scheme.split(&BigUint::from(123u32), 5, 3, &mut rng).unwrap();
//! let secret = scheme.reconstruct(&shares[..3]).unwrap();
//! assert_eq!(secret, BigUint::from(123u32));
//!
//! // Additive homomorphism: Dec(Enc(a) * Enc(b)) = a + b
//! let keys = PaillierKeyPair::demo().unwrap();
//! let a = keys.public.encrypt(&BigUint::from(20u32), &mut rng).unwrap();
//! let b = keys.public.encrypt(&BigUint::from(22u32), &mut rng).unwrap();
//! let sum = keys.public.add(&a, &b).unwrap();
//! assert_eq!(keys.private.decrypt(&sum).unwrap(), BigUint::from(42u32));
//! ```

pub mod aggregate;
pub mod arith;
pub mod channel;
pub mod config;
pub mod elgamal;
pub mod error;
pub mod observer;
pub mod paillier;
pub mod rsa;
pub mod sharing;
pub mod wire;

pub use error::{ArithmeticError, ErrorKind, LabError};
