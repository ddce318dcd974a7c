//! Capability interface behind the handshake.
//!
//! A session is handed one [`CryptoProvider`] at start: the native provider
//! (P-256 ECDH with HKDF-SHA256) or the software fallback. Both drive the
//! same state machine and share the AES-GCM [`SessionKey`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::aead::SessionKey;
use super::fallback::SoftwareProvider;
use super::native::NativeProvider;
use crate::config::ModePreference;
use crate::error::LabError;

/// Sentinel prefix marking a fallback public key on the wire.
pub const FALLBACK_PREFIX: &str = "POLYFILL:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelMode {
    Native,
    Fallback,
}

impl ChannelMode {
    /// Mode announced by a wire public key. The prefix is the only signal.
    pub fn of_wire_key(wire: &str) -> ChannelMode {
        if wire.starts_with(FALLBACK_PREFIX) {
            ChannelMode::Fallback
        } else {
            ChannelMode::Native
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMode::Native => f.write_str("NATIVE"),
            ChannelMode::Fallback => f.write_str("FALLBACK"),
        }
    }
}

/// Ephemeral key pair owned by one session.
pub struct LocalKeyPair {
    mode: ChannelMode,
    secret: Zeroizing<Vec<u8>>,
    public_wire: String,
}

impl LocalKeyPair {
    pub(crate) fn new(mode: ChannelMode, secret: Zeroizing<Vec<u8>>, public_wire: String) -> Self {
        LocalKeyPair {
            mode,
            secret,
            public_wire,
        }
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// Exported public key exactly as sent to the peer.
    pub fn public_wire(&self) -> &str {
        &self.public_wire
    }

    pub(crate) fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for LocalKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeyPair")
            .field("mode", &self.mode)
            .field("public_wire", &self.public_wire)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

pub trait CryptoProvider: Send {
    fn mode(&self) -> ChannelMode;

    /// Fills a fresh buffer with `len` random bytes.
    fn random_bytes(&mut self, len: usize) -> Result<Vec<u8>, LabError>;

    /// Generates an ephemeral key pair and its wire encoding.
    fn generate_key_pair(&mut self) -> Result<LocalKeyPair, LabError>;

    /// Computes the raw shared secret with the peer's wire public key.
    ///
    /// The caller has already checked that `peer_wire` is in this
    /// provider's mode.
    fn agree(&self, local: &LocalKeyPair, peer_wire: &str) -> Result<Zeroizing<Vec<u8>>, LabError>;

    /// Turns the raw shared secret into the symmetric session key.
    fn derive_key(&self, shared: &[u8], context_label: &str) -> Result<SessionKey, LabError>;
}

/// Picks the provider for a new session.
///
/// `Auto` probes the native backend and falls back to the software provider
/// when the host cannot supply it.
pub fn select_provider(preference: ModePreference) -> Result<Box<dyn CryptoProvider>, LabError> {
    match preference {
        ModePreference::ForceNative => Ok(Box::new(NativeProvider::probe()?)),
        ModePreference::ForceFallback => Ok(Box::new(SoftwareProvider::from_entropy())),
        ModePreference::Auto => match NativeProvider::probe() {
            Ok(native) => {
                info!("native key agreement available");
                Ok(Box::new(native))
            }
            Err(e) => {
                warn!(
                    "native key agreement unavailable ({e}), using software fallback \
                     without confidentiality"
                );
                Ok(Box::new(SoftwareProvider::from_entropy()))
            }
        },
    }
}
