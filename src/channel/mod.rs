//! Secure channel handshake.
//!
//! Two peers exchange ephemeral public keys, derive the same AES-256-GCM
//! session key and then exchange sealed chat messages. The key agreement is
//! done by a [`CryptoProvider`]: [`NativeProvider`] (P-256 ECDH with
//! HKDF-SHA256) or, when the host cannot supply it, the much weaker
//! [`SoftwareProvider`]. Fallback public keys carry the `POLYFILL:` prefix
//! and the two modes never interoperate.

pub mod aead;
pub mod fallback;
pub mod native;
pub mod provider;
pub mod session;

pub use aead::{SessionKey, KEY_LEN, NONCE_LEN};
pub use fallback::SoftwareProvider;
pub use native::{NativeProvider, CURVE};
pub use provider::{select_provider, ChannelMode, CryptoProvider, LocalKeyPair, FALLBACK_PREFIX};
pub use session::{ChatMessage, HandshakeSession, HandshakeState, PeerKeyOutcome};
