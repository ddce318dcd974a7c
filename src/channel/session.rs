//! Handshake state machine and the encrypted chat that runs on top of it.
//!
//! ```text
//! Idle -> KeyGenerated -> AwaitingPeerKey -> KeyDerived
//!   \__________\_______________\_______________> Failed
//! ```
//!
//! A session owns its provider, its ephemeral key pair and at most one
//! session key. A failed session stays failed until [`HandshakeSession::reset`].
//!
//! Under [`ModePreference::Auto`] the session drops to the software fallback
//! only for the attempt in which native key generation failed; `reset`
//! goes back to the native provider.

use std::collections::HashSet;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::aead::{SessionKey, NONCE_LEN};
use super::fallback::{SoftwareProvider, FALLBACK_WARNING};
use super::native::NativeProvider;
use super::provider::{select_provider, ChannelMode, CryptoProvider, LocalKeyPair};
use crate::config::{HandshakeConfig, ModePreference};
use crate::error::LabError;
use crate::observer::{LogKind, ProtocolEvent, ProtocolObserver, Sender};
use crate::wire::SealedMessage;

/// Attempts at drawing a nonce that has not been seen under the current key.
const NONCE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandshakeState {
    Idle,
    KeyGenerated,
    AwaitingPeerKey,
    KeyDerived,
    Failed,
}

/// What happened to a peer public key handed to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerKeyOutcome {
    /// A new session key was derived.
    Derived { fingerprint: String },
    /// The key arrived outside `AwaitingPeerKey` and was discarded.
    Ignored,
}

/// One entry of the session's chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub plaintext: String,
    pub iv: String,
    pub ciphertext: String,
    pub outgoing: bool,
}

pub struct HandshakeSession {
    provider: Box<dyn CryptoProvider>,
    /// Native provider set aside after a failed key generation under `Auto`
    suspended_native: Option<Box<dyn CryptoProvider>>,
    observer: Arc<dyn ProtocolObserver>,
    sender: Sender,
    preference: ModePreference,
    context_label: String,
    state: HandshakeState,
    local: Option<LocalKeyPair>,
    peer_public: Option<String>,
    shared_key: Option<SessionKey>,
    failure: Option<LabError>,
    used_nonces: HashSet<[u8; NONCE_LEN]>,
    history: Vec<ChatMessage>,
}

impl HandshakeSession {
    /// Creates an idle session with the provider the configuration asks for.
    pub fn new(
        config: &HandshakeConfig,
        observer: Arc<dyn ProtocolObserver>,
    ) -> Result<Self, LabError> {
        let provider = select_provider(config.mode_preference)?;
        Ok(Self::with_provider(provider, config, observer))
    }

    pub fn with_provider(
        provider: Box<dyn CryptoProvider>,
        config: &HandshakeConfig,
        observer: Arc<dyn ProtocolObserver>,
    ) -> Self {
        HandshakeSession {
            provider,
            suspended_native: None,
            observer,
            sender: Sender::Client,
            preference: config.mode_preference,
            context_label: config.context_label.clone(),
            state: HandshakeState::Idle,
            local: None,
            peer_public: None,
            shared_key: None,
            failure: None,
            used_nonces: HashSet::new(),
            history: Vec::new(),
        }
    }

    /// Sets the side this session reports events as.
    pub fn as_sender(mut self, sender: Sender) -> Self {
        self.sender = sender;
        self
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn mode(&self) -> ChannelMode {
        self.provider.mode()
    }

    pub fn local_public_key(&self) -> Option<&str> {
        self.local.as_ref().map(|pair| pair.public_wire())
    }

    pub fn peer_public_key(&self) -> Option<&str> {
        self.peer_public.as_deref()
    }

    pub fn failure(&self) -> Option<&LabError> {
        self.failure.as_ref()
    }

    pub fn session_key_fingerprint(&self) -> Option<String> {
        self.shared_key.as_ref().map(SessionKey::fingerprint)
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// `Idle -> KeyGenerated`. Returns the public key to send to the peer.
    ///
    /// With [`ModePreference::Auto`], a native key generation failure swaps
    /// the session to the software fallback and retries once.
    pub fn start(&mut self) -> Result<String, LabError> {
        if self.state != HandshakeState::Idle {
            return Err(LabError::Handshake(format!(
                "cannot start a handshake in state {:?}",
                self.state
            )));
        }

        let pair = match self.provider.generate_key_pair() {
            Ok(pair) => pair,
            Err(e)
                if self.preference == ModePreference::Auto
                    && self.provider.mode() == ChannelMode::Native =>
            {
                warn!("native key generation failed ({e}), switching to software fallback");
                self.emit(
                    LogKind::Warn,
                    "native crypto unavailable, using fallback",
                    Some(e.to_string()),
                );
                let native = std::mem::replace(
                    &mut self.provider,
                    Box::new(SoftwareProvider::from_entropy()),
                );
                self.suspended_native = Some(native);
                match self.provider.generate_key_pair() {
                    Ok(pair) => pair,
                    Err(e) => return Err(self.fail(e)),
                }
            }
            Err(e) => return Err(self.fail(e)),
        };

        let public = pair.public_wire().to_string();
        info!(mode = %pair.mode(), "generated handshake key pair");
        if pair.mode() == ChannelMode::Fallback {
            warn!("{}", FALLBACK_WARNING);
            self.emit(LogKind::Warn, FALLBACK_WARNING, None);
        }
        self.emit(
            LogKind::Handshake,
            "generated key pair",
            Some(pair.mode().to_string()),
        );
        self.local = Some(pair);
        self.state = HandshakeState::KeyGenerated;
        Ok(public)
    }

    /// `KeyGenerated -> AwaitingPeerKey`, once the public key has been sent.
    pub fn await_peer_key(&mut self) -> Result<(), LabError> {
        if self.state != HandshakeState::KeyGenerated {
            return Err(LabError::Handshake(format!(
                "cannot await a peer key in state {:?}",
                self.state
            )));
        }
        self.state = HandshakeState::AwaitingPeerKey;
        self.emit(LogKind::Handshake, "sent public key, awaiting peer", None);
        Ok(())
    }

    /// `AwaitingPeerKey -> KeyDerived`.
    ///
    /// A key received in any other state is stale or duplicated and is
    /// discarded without touching the current session key.
    ///
    /// # Errors
    /// [`LabError::ModeMismatch`] when the peer is in the other mode, and
    /// [`LabError::Handshake`] when import or derivation fails. Both leave
    /// the session in `Failed`.
    pub fn receive_peer_key(&mut self, peer_wire: &str) -> Result<PeerKeyOutcome, LabError> {
        if self.state != HandshakeState::AwaitingPeerKey {
            warn!(state = ?self.state, "discarding peer public key received out of turn");
            self.emit(
                LogKind::Warn,
                "ignored stale peer public key",
                Some(format!("{:?}", self.state)),
            );
            return Ok(PeerKeyOutcome::Ignored);
        }

        let local_mode = self.provider.mode();
        let peer_mode = ChannelMode::of_wire_key(peer_wire);
        if local_mode != peer_mode {
            return Err(self.fail(LabError::ModeMismatch {
                local: local_mode.to_string(),
                peer: peer_mode.to_string(),
            }));
        }

        let derived = match self.local.as_ref() {
            Some(local) => self
                .provider
                .agree(local, peer_wire)
                .and_then(|shared| self.provider.derive_key(&shared, &self.context_label)),
            None => Err(LabError::Handshake("no local key pair".to_string())),
        };
        let key = match derived {
            Ok(key) => key,
            Err(LabError::Handshake(reason)) => return Err(self.fail(LabError::Handshake(reason))),
            Err(e) => return Err(self.fail(LabError::Handshake(e.to_string()))),
        };

        let fingerprint = key.fingerprint();
        self.shared_key = Some(key);
        self.used_nonces.clear();
        self.peer_public = Some(peer_wire.to_string());
        self.state = HandshakeState::KeyDerived;
        info!(fingerprint = %fingerprint, mode = %local_mode, "session key derived");
        self.emit(
            LogKind::Handshake,
            "derived shared key",
            Some(fingerprint.clone()),
        );
        Ok(PeerKeyOutcome::Derived { fingerprint })
    }

    /// Encrypts a chat message under a fresh nonce.
    pub fn seal(&mut self, plaintext: &str) -> Result<SealedMessage, LabError> {
        if self.shared_key.is_none() {
            return Err(self.not_ready());
        }
        let nonce = self.fresh_nonce()?;
        let key = self
            .shared_key
            .as_ref()
            .ok_or_else(|| LabError::Handshake("no session key".to_string()))?;
        let ciphertext = key.seal(plaintext.as_bytes(), &nonce)?;

        let sealed = SealedMessage {
            ciphertext: STANDARD.encode(ciphertext),
            iv: STANDARD.encode(nonce),
        };
        self.history.push(ChatMessage {
            plaintext: plaintext.to_string(),
            iv: sealed.iv.clone(),
            ciphertext: sealed.ciphertext.clone(),
            outgoing: true,
        });
        debug!(len = plaintext.len(), "sealed chat message");
        self.emit(LogKind::Data, "sent encrypted message", Some(sealed.iv.clone()));
        Ok(sealed)
    }

    /// Verifies and decrypts a chat message from the peer.
    ///
    /// Any failure is a [`LabError::Decrypt`]: the message is dropped and
    /// the session stays usable.
    pub fn open(&mut self, sealed: &SealedMessage) -> Result<String, LabError> {
        let key = match self.shared_key.as_ref() {
            Some(key) => key,
            None => return Err(self.not_ready()),
        };

        let opened = Self::decode(sealed).and_then(|(ciphertext, nonce)| {
            let plaintext = key.open(&ciphertext, &nonce)?;
            let text = String::from_utf8(plaintext)
                .map_err(|_| LabError::Decrypt("plaintext is not UTF-8".to_string()))?;
            Ok((text, nonce))
        });

        match opened {
            Ok((text, nonce)) => {
                if let Ok(nonce) = <[u8; NONCE_LEN]>::try_from(nonce.as_slice()) {
                    self.used_nonces.insert(nonce);
                }
                self.history.push(ChatMessage {
                    plaintext: text.clone(),
                    iv: sealed.iv.clone(),
                    ciphertext: sealed.ciphertext.clone(),
                    outgoing: false,
                });
                self.emit(LogKind::Data, "received encrypted message", None);
                Ok(text)
            }
            Err(e) => {
                warn!("dropping message: {e}");
                self.emit(LogKind::Error, "dropped message", Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Discards keys, history and any failure, returning to `Idle`.
    ///
    /// Under [`ModePreference::Auto`] a session running on the fallback goes
    /// back to the native provider it set aside, or re-probes the host if it
    /// never had one.
    pub fn reset(&mut self) {
        if self.preference == ModePreference::Auto {
            if let Some(native) = self.suspended_native.take() {
                self.provider = native;
            } else if self.provider.mode() == ChannelMode::Fallback {
                if let Ok(native) = NativeProvider::probe() {
                    self.provider = Box::new(native);
                }
            }
        }
        self.local = None;
        self.peer_public = None;
        self.shared_key = None;
        self.failure = None;
        self.used_nonces.clear();
        self.history.clear();
        self.state = HandshakeState::Idle;
        self.emit(LogKind::Info, "session reset", None);
    }

    fn decode(sealed: &SealedMessage) -> Result<(Vec<u8>, Vec<u8>), LabError> {
        let ciphertext = STANDARD
            .decode(&sealed.ciphertext)
            .map_err(|e| LabError::Decrypt(format!("ciphertext is not base64: {e}")))?;
        let nonce = STANDARD
            .decode(&sealed.iv)
            .map_err(|e| LabError::Decrypt(format!("iv is not base64: {e}")))?;
        Ok((ciphertext, nonce))
    }

    fn fresh_nonce(&mut self) -> Result<[u8; NONCE_LEN], LabError> {
        for _ in 0..NONCE_ATTEMPTS {
            let bytes = self.provider.random_bytes(NONCE_LEN)?;
            let nonce: [u8; NONCE_LEN] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| LabError::Handshake("provider returned a short nonce".to_string()))?;
            if self.used_nonces.insert(nonce) {
                return Ok(nonce);
            }
        }
        Err(LabError::Handshake(
            "randomness source keeps repeating nonces".to_string(),
        ))
    }

    fn not_ready(&self) -> LabError {
        match &self.failure {
            Some(failure) => failure.clone(),
            None => LabError::Handshake(format!("no session key in state {:?}", self.state)),
        }
    }

    fn fail(&mut self, err: LabError) -> LabError {
        warn!(error = %err, "handshake failed");
        self.emit(LogKind::Error, "handshake failed", Some(err.to_string()));
        self.shared_key = None;
        self.state = HandshakeState::Failed;
        self.failure = Some(err.clone());
        err
    }

    fn emit(&self, kind: LogKind, message: &str, details: Option<String>) {
        let mut event = ProtocolEvent::new(self.sender, kind, message);
        if let Some(details) = details {
            event = event.with_details(details);
        }
        self.observer.on_event(&event);
    }
}

impl std::fmt::Debug for HandshakeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeSession")
            .field("mode", &self.provider.mode())
            .field("state", &self.state)
            .field("key", &self.session_key_fingerprint())
            .finish()
    }
}
