//! Native key agreement: ephemeral P-256 ECDH, HKDF-SHA256 expansion.
//!
//! Public keys travel as base64 SubjectPublicKeyInfo DER, the encoding a
//! browser's `exportKey("spki", ...)` produces.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use p256::{
    ecdh::diffie_hellman,
    pkcs8::{DecodePublicKey, EncodePublicKey},
    PublicKey, SecretKey,
};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use super::aead::{SessionKey, KEY_LEN};
use super::provider::{ChannelMode, CryptoProvider, LocalKeyPair};
use crate::error::LabError;

/// Name of the fixed curve.
pub const CURVE: &str = "P-256";

const SCALAR_LEN: usize = 32;

/// Provider backed by the operating system's entropy source and the
/// RustCrypto P-256 implementation.
#[derive(Debug)]
pub struct NativeProvider {
    _private: (),
}

impl NativeProvider {
    /// Checks that the OS entropy source works before committing to it.
    pub fn probe() -> Result<Self, LabError> {
        let mut buf = [0u8; 16];
        getrandom::fill(&mut buf).map_err(|e| {
            LabError::Handshake(format!("native randomness unavailable: {e}"))
        })?;
        Ok(NativeProvider { _private: () })
    }
}

impl CryptoProvider for NativeProvider {
    fn mode(&self) -> ChannelMode {
        ChannelMode::Native
    }

    fn random_bytes(&mut self, len: usize) -> Result<Vec<u8>, LabError> {
        let mut buf = vec![0u8; len];
        getrandom::fill(&mut buf)
            .map_err(|e| LabError::Handshake(format!("native randomness unavailable: {e}")))?;
        Ok(buf)
    }

    fn generate_key_pair(&mut self) -> Result<LocalKeyPair, LabError> {
        // rejection-sample a scalar in [1, order)
        let secret = loop {
            let bytes = Zeroizing::new(self.random_bytes(SCALAR_LEN)?);
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                break secret;
            }
        };

        let der = secret
            .public_key()
            .to_public_key_der()
            .map_err(|e| LabError::Handshake(format!("public key export failed: {e}")))?;
        let public_wire = STANDARD.encode(der.as_bytes());
        let secret_bytes = Zeroizing::new(secret.to_bytes().to_vec());

        debug!(curve = CURVE, "generated ephemeral key pair");
        Ok(LocalKeyPair::new(
            ChannelMode::Native,
            secret_bytes,
            public_wire,
        ))
    }

    fn agree(&self, local: &LocalKeyPair, peer_wire: &str) -> Result<Zeroizing<Vec<u8>>, LabError> {
        let der = STANDARD
            .decode(peer_wire)
            .map_err(|e| LabError::Handshake(format!("peer public key is not base64: {e}")))?;
        let peer = PublicKey::from_public_key_der(&der)
            .map_err(|e| LabError::Handshake(format!("peer public key import failed: {e}")))?;
        let secret = SecretKey::from_slice(local.secret())
            .map_err(|_| LabError::Handshake("local private key is invalid".to_string()))?;

        let shared = diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
        Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
    }

    fn derive_key(&self, shared: &[u8], context_label: &str) -> Result<SessionKey, LabError> {
        // empty salt
        let hk = Hkdf::<Sha256>::new(None, shared);
        let mut okm = Zeroizing::new([0u8; KEY_LEN]);
        hk.expand(context_label.as_bytes(), &mut okm[..])
            .map_err(|e| LabError::Handshake(format!("key expansion failed: {e}")))?;
        Ok(SessionKey::from_bytes(*okm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_is_spki_base64() {
        let mut provider = NativeProvider::probe().unwrap();
        let pair = provider.generate_key_pair().unwrap();
        let der = STANDARD.decode(pair.public_wire()).unwrap();
        // SPKI for an uncompressed P-256 point
        assert_eq!(der.len(), 91);
        assert!(!pair.public_wire().starts_with("POLYFILL:"));
    }

    #[test]
    fn test_ecdh_agreement_is_symmetric() {
        let mut provider = NativeProvider::probe().unwrap();
        let alice = provider.generate_key_pair().unwrap();
        let bob = provider.generate_key_pair().unwrap();

        let ab = provider.agree(&alice, bob.public_wire()).unwrap();
        let ba = provider.agree(&bob, alice.public_wire()).unwrap();
        assert_eq!(*ab, *ba);
        assert_eq!(ab.len(), 32);

        let k1 = provider.derive_key(&ab, "handshake data").unwrap();
        let k2 = provider.derive_key(&ba, "handshake data").unwrap();
        assert_eq!(k1, k2);

        let other_label = provider.derive_key(&ab, "other label").unwrap();
        assert_ne!(k1, other_label);
    }

    #[test]
    fn test_rejects_malformed_peer_key() {
        let mut provider = NativeProvider::probe().unwrap();
        let alice = provider.generate_key_pair().unwrap();
        assert!(matches!(
            provider.agree(&alice, "not base64 !!"),
            Err(LabError::Handshake(_))
        ));
        assert!(matches!(
            provider.agree(&alice, &STANDARD.encode([4u8; 65])),
            Err(LabError::Handshake(_))
        ));
    }

    #[test]
    fn test_random_bytes_are_fresh() {
        let mut provider = NativeProvider::probe().unwrap();
        let a = provider.random_bytes(12).unwrap();
        let b = provider.random_bytes(12).unwrap();
        assert_eq!(a.len(), 12);
        assert_ne!(a, b);
    }
}
