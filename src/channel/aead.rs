//! AES-256-GCM under the negotiated session key.

use aes_gcm::{
    aead::{consts::U12, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use blake2::{Blake2b512, Digest};
use zeroize::Zeroizing;

use crate::error::LabError;

/// Key length of the AEAD cipher.
pub const KEY_LEN: usize = 32;

/// GCM nonce length (96 bits).
pub const NONCE_LEN: usize = 12;

/// Symmetric key owned by a single session. Wiped on drop.
pub struct SessionKey {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl SessionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        SessionKey {
            key: Zeroizing::new(bytes),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, LabError> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            LabError::Handshake(format!(
                "session key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Short Blake2b fingerprint, safe to display or log.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Blake2b512::new();
        hasher.update(b"privacy-lab-session-key-v1:");
        hasher.update(self.key.as_slice());
        hex::encode(&hasher.finalize()[..8])
    }

    /// Encrypts and authenticates `plaintext` under `nonce`.
    ///
    /// The nonce must never repeat for this key.
    pub fn seal(&self, plaintext: &[u8], nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>, LabError> {
        let nonce = Nonce::<U12>::from(*nonce);
        self.cipher()?
            .encrypt(&nonce, plaintext)
            .map_err(|_| LabError::Handshake("AEAD encryption failed".to_string()))
    }

    /// Verifies and decrypts `ciphertext`.
    ///
    /// # Errors
    /// Returns [`LabError::Decrypt`] on a bad nonce length or a tag mismatch.
    pub fn open(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, LabError> {
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| {
            LabError::Decrypt(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LEN,
                nonce.len()
            ))
        })?;
        self.cipher()?
            .decrypt(&Nonce::<U12>::from(nonce), ciphertext)
            .map_err(|_| LabError::Decrypt("authentication tag mismatch".to_string()))
    }

    fn cipher(&self) -> Result<Aes256Gcm, LabError> {
        Aes256Gcm::new_from_slice(self.key.as_slice())
            .map_err(|_| LabError::Handshake("invalid AEAD key length".to_string()))
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(self.key.as_slice(), other.key.as_slice())
    }
}

impl Eq for SessionKey {}

// Prevent debug output from leaking the key
impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionKey({})", self.fingerprint())
    }
}

/// Byte comparison whose running time does not depend on where the inputs
/// differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = SessionKey::from_bytes([7u8; KEY_LEN]);
        let nonce = [1u8; NONCE_LEN];
        let ct = key.seal(b"hello bob", &nonce).unwrap();
        // 16-byte tag appended
        assert_eq!(ct.len(), 9 + 16);
        assert_eq!(key.open(&ct, &nonce).unwrap(), b"hello bob");
    }

    #[test]
    fn test_every_single_bit_flip_is_detected() {
        let key = SessionKey::from_bytes([9u8; KEY_LEN]);
        let nonce = [3u8; NONCE_LEN];
        let ct = key.seal(b"tamper me", &nonce).unwrap();

        for bit in 0..ct.len() * 8 {
            let mut bad = ct.clone();
            bad[bit / 8] ^= 1 << (bit % 8);
            assert!(matches!(key.open(&bad, &nonce), Err(LabError::Decrypt(_))));
        }
        for bit in 0..NONCE_LEN * 8 {
            let mut bad_nonce = nonce;
            bad_nonce[bit / 8] ^= 1 << (bit % 8);
            assert!(matches!(key.open(&ct, &bad_nonce), Err(LabError::Decrypt(_))));
        }
    }

    #[test]
    fn test_wrong_key_or_nonce_length() {
        let key = SessionKey::from_bytes([1u8; KEY_LEN]);
        let other = SessionKey::from_bytes([2u8; KEY_LEN]);
        let nonce = [0u8; NONCE_LEN];
        let ct = key.seal(b"x", &nonce).unwrap();
        assert!(other.open(&ct, &nonce).is_err());
        assert!(key.open(&ct, &[0u8; 8]).is_err());
        assert!(SessionKey::from_slice(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_equality_and_fingerprint() {
        let a = SessionKey::from_bytes([5u8; KEY_LEN]);
        let b = SessionKey::from_slice(&[5u8; KEY_LEN]).unwrap();
        let c = SessionKey::from_bytes([6u8; KEY_LEN]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
        assert!(!format!("{:?}", a).contains("5, 5"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(&[1, 2, 3], &[1, 2, 3]));
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2, 4]));
        assert!(!constant_time_eq(&[1, 2], &[1, 2, 3]));
    }
}
