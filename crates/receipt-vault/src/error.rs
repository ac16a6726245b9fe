//! Error types for the Vault.

use receipt_vault_core::{CapsuleId, CoreError, FragmentId, PrincipalId};
use receipt_vault_perms::{DenyReason, PermsError};
use receipt_vault_store::StoreError;
use thiserror::Error;

/// Errors that can occur during Vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Cryptographic or encoding error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Registry or authorization error.
    #[error("permission error: {0}")]
    Permission(#[from] PermsError),

    /// Principal already has a key pair.
    #[error("key pair already exists for {0}")]
    KeyPairExists(PrincipalId),

    /// Principal has no key pair in local storage.
    #[error("key pair not found for {0}")]
    KeyPairNotFound(PrincipalId),

    /// Principal has not published a public key.
    #[error("public key not found for {0}")]
    PublicKeyNotFound(PrincipalId),

    #[error("capsule not found: {0}")]
    CapsuleNotFound(CapsuleId),

    #[error("fragment not found: {0}")]
    FragmentNotFound(FragmentId),

    /// Configuration rejected at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A blocking registry call could not be joined.
    #[error("task error: {0}")]
    Task(String),
}

/// Coarse classification of a [`VaultError`].
///
/// Lets an outer layer tell "access denied" from "decryption failed" from
/// "corrupt data" without matching on nested enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    KeyGeneration,
    InvalidKey,
    PayloadTooLarge,
    Decode,
    AccessDenied(DenyReason),
    Decryption,
    InvalidCapsule,
    InvalidInput,
    NotFound,
    AlreadyExists,
    Storage,
    Config,
    Internal,
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Core(e) => match e {
                CoreError::KeyGeneration(_) => ErrorKind::KeyGeneration,
                CoreError::InvalidKey(_) => ErrorKind::InvalidKey,
                CoreError::InvalidPrincipal(_) => ErrorKind::InvalidInput,
                CoreError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
                CoreError::Decode(_) => ErrorKind::Decode,
                CoreError::Decryption(_) => ErrorKind::Decryption,
                CoreError::InvalidCapsule(_) => ErrorKind::InvalidCapsule,
                CoreError::Encryption(_) | CoreError::Encoding(_) => ErrorKind::Internal,
            },
            VaultError::Store(e) => match e {
                StoreError::NotFound(_) => ErrorKind::NotFound,
                StoreError::InvalidKey(_) => ErrorKind::InvalidInput,
                _ => ErrorKind::Storage,
            },
            VaultError::Permission(e) => match e {
                PermsError::AccessDenied(reason) => ErrorKind::AccessDenied(*reason),
                PermsError::CapsuleNotFound(_) | PermsError::FragmentNotFound(_) => {
                    ErrorKind::NotFound
                }
                PermsError::CapsuleExists { .. } => ErrorKind::AlreadyExists,
                PermsError::OwnerKeyMismatch { .. } => ErrorKind::InvalidKey,
                PermsError::NotOwner { .. } | PermsError::InvalidGrant(_) => {
                    ErrorKind::InvalidInput
                }
                PermsError::Serialization(_) => ErrorKind::Decode,
                PermsError::Database(_) | PermsError::Migration(_) => ErrorKind::Storage,
                PermsError::Poisoned(_) => ErrorKind::Internal,
            },
            VaultError::KeyPairExists(_) => ErrorKind::AlreadyExists,
            VaultError::KeyPairNotFound(_)
            | VaultError::PublicKeyNotFound(_)
            | VaultError::CapsuleNotFound(_)
            | VaultError::FragmentNotFound(_) => ErrorKind::NotFound,
            VaultError::Config(_) => ErrorKind::Config,
            VaultError::Task(_) => ErrorKind::Internal,
        }
    }

    /// The deny reason, if this is an access denial.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self.kind() {
            ErrorKind::AccessDenied(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<receipt_vault_core::DecodeError> for VaultError {
    fn from(e: receipt_vault_core::DecodeError) -> Self {
        VaultError::Core(CoreError::Decode(e))
    }
}

/// Result type for Vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
