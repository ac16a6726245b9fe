//! Error types for the permissions module.

use thiserror::Error;

use receipt_vault_core::{CapsuleId, FragmentId, PrincipalId};

use crate::grant::DenyReason;

/// Errors that can occur during permission operations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// A transform was refused.
    #[error("access denied: {0}")]
    AccessDenied(DenyReason),

    /// Capsule is not registered.
    #[error("capsule not registered: {0}")]
    CapsuleNotFound(CapsuleId),

    /// Capsule is already registered to a different owner.
    #[error("capsule {capsule_id} already registered to {owner}")]
    CapsuleExists {
        capsule_id: CapsuleId,
        owner: PrincipalId,
    },

    /// Fragment is not known to the registry.
    #[error("fragment not found: {0}")]
    FragmentNotFound(FragmentId),

    /// Caller does not own the capsule.
    #[error("{principal} does not own capsule {capsule_id}")]
    NotOwner {
        capsule_id: CapsuleId,
        principal: PrincipalId,
    },

    /// Fragment was issued under a key other than the one the capsule is
    /// encrypted to.
    #[error("fragment from {principal} does not match the key of capsule {capsule_id}")]
    OwnerKeyMismatch {
        capsule_id: CapsuleId,
        principal: PrincipalId,
    },

    /// Grant request is malformed.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored data could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding registry state was poisoned by a panic.
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

impl PermsError {
    /// The deny reason, if this is an access denial.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            PermsError::AccessDenied(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
