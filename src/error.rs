//! Error types for the privacy lab primitives

use thiserror::Error;

/// Failures of the modular arithmetic kernel.
///
/// These are precondition violations: the call cannot produce a meaningful
/// value and the caller has to change its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    /// A modulus of zero was supplied
    #[error("modulus must be non-zero")]
    ZeroModulus,
    /// `gcd(a, modulus) != 1`, so no inverse exists
    #[error("{value} has no inverse modulo {modulus}")]
    NoInverse { value: String, modulus: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabError {
    /// Modular arithmetic precondition failed
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),
    /// Fewer shares than the declared threshold were supplied
    #[error("threshold violation: {supplied} shares supplied, {threshold} required")]
    InsufficientShares { supplied: usize, threshold: usize },
    /// Two shares carry the same x coordinate
    #[error("duplicate share index x = {x}")]
    DuplicateShare { x: u64 },
    /// The secret is above the declared range of the configured field
    #[error("secret {secret} exceeds the largest shareable value {limit}")]
    FieldOverflow { secret: String, limit: String },
    /// Plaintext is outside the message space of the key
    #[error("plaintext out of range: {0}")]
    PlaintextOutOfRange(String),
    /// Ciphertext is outside the ciphertext space of the key
    #[error("ciphertext out of range: {0}")]
    CiphertextOutOfRange(String),
    /// Invalid parameter provided (threshold, key size, prime, ...)
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Native and fallback handshake modes were mixed
    #[error("handshake mode mismatch: local {local}, peer {peer}")]
    ModeMismatch { local: String, peer: String },
    /// Key import or derivation failed; the session is unusable
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// Authentication tag mismatch or malformed sealed message
    #[error("decryption failed: {0}")]
    Decrypt(String),
    /// Wire value could not be parsed
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Fieldless classification of a [`LabError`], suitable for choosing a
/// user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Arithmetic,
    ThresholdViolation,
    DuplicateShare,
    FieldOverflow,
    OutOfRange,
    InvalidParameter,
    ModeMismatch,
    Handshake,
    Decrypt,
    Encoding,
}

impl LabError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LabError::Arithmetic(_) => ErrorKind::Arithmetic,
            LabError::InsufficientShares { .. } => ErrorKind::ThresholdViolation,
            LabError::DuplicateShare { .. } => ErrorKind::DuplicateShare,
            LabError::FieldOverflow { .. } => ErrorKind::FieldOverflow,
            LabError::PlaintextOutOfRange(_) | LabError::CiphertextOutOfRange(_) => {
                ErrorKind::OutOfRange
            }
            LabError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            LabError::ModeMismatch { .. } => ErrorKind::ModeMismatch,
            LabError::Handshake(_) => ErrorKind::Handshake,
            LabError::Decrypt(_) => ErrorKind::Decrypt,
            LabError::Encoding(_) => ErrorKind::Encoding,
        }
    }

    /// Whether the caller can carry on after this error.
    ///
    /// Duplicate or missing shares can be fixed by choosing other shares, a
    /// failed handshake by starting a new session, and a failed decryption
    /// only drops the one message. Arithmetic and range violations are
    /// programming errors and are not recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ThresholdViolation
                | ErrorKind::DuplicateShare
                | ErrorKind::ModeMismatch
                | ErrorKind::Handshake
                | ErrorKind::Decrypt
        )
    }
}
