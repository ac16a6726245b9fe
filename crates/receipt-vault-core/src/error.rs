//! Error types for Receipt Vault core.

use thiserror::Error;

/// Errors produced by the cryptographic core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The random source failed while generating key material.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// A key was malformed or does not belong with its counterpart.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A principal identifier was rejected.
    #[error("invalid principal id: {0}")]
    InvalidPrincipal(String),

    /// Plaintext exceeds the configured maximum.
    #[error("payload too large: {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Serialized data could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Decryption did not produce plaintext.
    #[error("decryption failed: {0}")]
    Decryption(DecryptionFailure),

    /// A capsule cannot be used for the requested operation.
    #[error("invalid capsule: {0}")]
    InvalidCapsule(String),

    /// The AEAD layer refused to encrypt.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Encoding to bytes failed.
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Why a decryption attempt failed.
///
/// Callers only learn that decryption failed and which stage rejected it,
/// never any partial plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecryptionFailure {
    #[error("ciphertext is bound to a different capsule")]
    CapsuleMismatch,

    #[error("capsule failed its validity check")]
    CapsuleCheck,

    #[error("authentication failed")]
    Authentication,
}

/// Errors decoding capsules, ciphertexts, fragments and keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("expected {expected} segments, found {found}")]
    Segments { expected: usize, found: usize },

    #[error("invalid base64 in {0}")]
    Base64(&'static str),

    #[error("invalid UTF-8 in {0}")]
    Utf8(&'static str),

    #[error("invalid length for {what}: expected {expected}, got {actual}")]
    Length {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid point encoding for {0}")]
    InvalidPoint(&'static str),

    #[error("non-canonical scalar for {0}")]
    InvalidScalar(&'static str),

    #[error("unknown capsule kind: {0:#04x}")]
    UnknownKind(u8),

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("invalid hex: {0}")]
    Hex(String),

    #[error("malformed CBOR: {0}")]
    Cbor(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
