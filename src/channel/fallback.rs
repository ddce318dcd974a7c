//! Software fallback for hosts without native key agreement.
//!
//! This is not a key agreement scheme and gives NO confidentiality against
//! a passive observer. The "public key" is `SHA-256(private)` and the
//! session key is `SHA-256(label || sorted public digests)`: the local
//! private material never enters the key, so anyone who sees the two public
//! values exchanged on the wire can compute the session key and read every
//! message. What remains is tamper detection against a party that missed
//! the handshake. It must only be used when the native provider is
//! unavailable.

use std::time::{SystemTime, UNIX_EPOCH};

use blake2::Blake2b512;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::aead::{SessionKey, KEY_LEN};
use super::provider::{ChannelMode, CryptoProvider, LocalKeyPair, FALLBACK_PREFIX};
use crate::error::LabError;

/// Warning reported whenever a session runs on this provider.
pub const FALLBACK_WARNING: &str =
    "software fallback: session key is computable from the public handshake values, \
     no confidentiality against a passive observer";

const PRIVATE_LEN: usize = 32;
const DIGEST_HEX_LEN: usize = 64;

pub struct SoftwareProvider {
    rng: StdRng,
}

impl SoftwareProvider {
    pub fn with_rng(rng: StdRng) -> Self {
        SoftwareProvider { rng }
    }

    /// Reproducible provider for tests and demos.
    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Seeds from whatever the host offers without the OS entropy source:
    /// wall clock, process id, thread id and a stack address, mixed with
    /// Blake2b.
    pub fn from_entropy() -> Self {
        let mut hasher = Blake2b512::new();
        hasher.update(b"privacy-lab-fallback-seed-v1:");
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        hasher.update(nanos.to_le_bytes());
        hasher.update(std::process::id().to_le_bytes());
        hasher.update(format!("{:?}", std::thread::current().id()).as_bytes());
        let marker = 0u8;
        hasher.update((&marker as *const u8 as usize).to_le_bytes());

        let digest = hasher.finalize();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest[..32]);
        warn!("software fallback seeded without OS entropy");
        Self::with_rng(StdRng::from_seed(seed))
    }
}

impl std::fmt::Debug for SoftwareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SoftwareProvider")
    }
}

/// Strips the sentinel and checks the digest shape.
fn parse_fallback_key(wire: &str) -> Result<&str, LabError> {
    let digest = wire.strip_prefix(FALLBACK_PREFIX).ok_or_else(|| {
        LabError::Handshake("fallback public key is missing its prefix".to_string())
    })?;
    if digest.len() != DIGEST_HEX_LEN || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(LabError::Handshake(format!(
            "fallback public key must be {} hex characters",
            DIGEST_HEX_LEN
        )));
    }
    Ok(digest)
}

impl CryptoProvider for SoftwareProvider {
    fn mode(&self) -> ChannelMode {
        ChannelMode::Fallback
    }

    fn random_bytes(&mut self, len: usize) -> Result<Vec<u8>, LabError> {
        let mut buf = vec![0u8; len];
        self.rng.fill_bytes(&mut buf);
        Ok(buf)
    }

    fn generate_key_pair(&mut self) -> Result<LocalKeyPair, LabError> {
        let private = Zeroizing::new(self.random_bytes(PRIVATE_LEN)?);
        let public = hex::encode(Sha256::digest(private.as_slice()));
        debug!("generated fallback key pair");
        Ok(LocalKeyPair::new(
            ChannelMode::Fallback,
            private,
            format!("{}{}", FALLBACK_PREFIX, public),
        ))
    }

    /// Shared material is derived from public values only.
    fn agree(&self, local: &LocalKeyPair, peer_wire: &str) -> Result<Zeroizing<Vec<u8>>, LabError> {
        let ours = parse_fallback_key(local.public_wire())?.to_ascii_lowercase();
        let theirs = parse_fallback_key(peer_wire)?.to_ascii_lowercase();
        if ours == theirs {
            return Err(LabError::Handshake(
                "peer echoed our own fallback public key".to_string(),
            ));
        }

        let (low, high) = if ours < theirs {
            (ours, theirs)
        } else {
            (theirs, ours)
        };
        let mut material = Zeroizing::new(Vec::with_capacity(2 * DIGEST_HEX_LEN));
        material.extend_from_slice(low.as_bytes());
        material.extend_from_slice(high.as_bytes());
        Ok(material)
    }

    fn derive_key(&self, shared: &[u8], context_label: &str) -> Result<SessionKey, LabError> {
        let mut hasher = Sha256::new();
        hasher.update(context_label.as_bytes());
        hasher.update(shared);
        let digest = hasher.finalize();
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest);
        Ok(SessionKey::from_bytes(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_is_tagged_digest() {
        let mut provider = SoftwareProvider::from_seed(1);
        let pair = provider.generate_key_pair().unwrap();
        let wire = pair.public_wire();
        assert!(wire.starts_with("POLYFILL:"));
        assert_eq!(wire.len(), "POLYFILL:".len() + 64);
        assert_eq!(
            &wire["POLYFILL:".len()..],
            hex::encode(Sha256::digest(pair.secret()))
        );
    }

    #[test]
    fn test_agreement_is_symmetric() {
        let mut alice_provider = SoftwareProvider::from_seed(2);
        let mut bob_provider = SoftwareProvider::from_seed(3);
        let alice = alice_provider.generate_key_pair().unwrap();
        let bob = bob_provider.generate_key_pair().unwrap();

        let ab = alice_provider.agree(&alice, bob.public_wire()).unwrap();
        let ba = bob_provider.agree(&bob, alice.public_wire()).unwrap();
        assert_eq!(*ab, *ba);

        let k1 = alice_provider.derive_key(&ab, "handshake data").unwrap();
        let k2 = bob_provider.derive_key(&ba, "handshake data").unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_observer_of_public_values_derives_same_key() {
        let mut alice_provider = SoftwareProvider::from_seed(5);
        let mut bob_provider = SoftwareProvider::from_seed(6);
        let alice = alice_provider.generate_key_pair().unwrap();
        let bob = bob_provider.generate_key_pair().unwrap();
        let shared = alice_provider.agree(&alice, bob.public_wire()).unwrap();
        let key = alice_provider.derive_key(&shared, "handshake data").unwrap();

        // only the two wire values, no private material
        let mut low = alice.public_wire()["POLYFILL:".len()..].to_string();
        let mut high = bob.public_wire()["POLYFILL:".len()..].to_string();
        if high < low {
            std::mem::swap(&mut low, &mut high);
        }
        let mut hasher = Sha256::new();
        hasher.update(b"handshake data");
        hasher.update(low.as_bytes());
        hasher.update(high.as_bytes());
        let eavesdropped = SessionKey::from_slice(&hasher.finalize()).unwrap();
        assert_eq!(key, eavesdropped);
    }

    #[test]
    fn test_rejects_malformed_keys() {
        let mut provider = SoftwareProvider::from_seed(4);
        let alice = provider.generate_key_pair().unwrap();
        assert!(provider.agree(&alice, "POLYFILL:xyz").is_err());
        assert!(provider.agree(&alice, "deadbeef").is_err());
        assert!(provider.agree(&alice, alice.public_wire()).is_err());
    }

    #[test]
    fn test_from_entropy_differs_between_instances() {
        let mut a = SoftwareProvider::from_entropy();
        let mut b = SoftwareProvider::from_entropy();
        assert_ne!(a.random_bytes(16).unwrap(), b.random_bytes(16).unwrap());
    }
}
