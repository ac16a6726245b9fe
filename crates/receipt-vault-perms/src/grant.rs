//! Grant records.
//!
//! The registry never holds key material. A [`FragmentRecord`] mirrors the
//! policy fields of a re-encryption key fragment, and an [`AccessGrant`]
//! links that fragment to a capsule.

use std::fmt;

use serde::{Deserialize, Serialize};

use receipt_vault_core::{CapsuleId, FragmentId, PrincipalId, PublicKey, ReEncryptionKeyFragment};

/// Why a transform was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DenyReason {
    /// The capsule is not registered with the proxy.
    UnknownCapsule,
    /// The fragment was never recorded.
    UnknownFragment,
    /// The fragment exists but was never granted for this capsule.
    NoGrant,
    /// The fragment was revoked.
    Revoked,
    /// The fragment's validity window has passed.
    Expired,
    /// The fragment's issuer is not the capsule's current owner.
    OwnerMismatch,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::UnknownCapsule => "unknown_capsule",
            DenyReason::UnknownFragment => "unknown_fragment",
            DenyReason::NoGrant => "no_grant",
            DenyReason::Revoked => "revoked",
            DenyReason::Expired => "expired",
            DenyReason::OwnerMismatch => "owner_mismatch",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy view of a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentRecord {
    pub fragment_id: FragmentId,
    pub from_principal: PrincipalId,
    /// Key the fragment re-encrypts from.
    pub from_public_key: PublicKey,
    pub to_public_key: PublicKey,
    /// Unix ms, exclusive.
    pub valid_until: Option<i64>,
    pub issued_at: i64,
    pub revoked_at: Option<i64>,
}

impl FragmentRecord {
    pub fn from_fragment(fragment: &ReEncryptionKeyFragment, issued_at: i64) -> Self {
        Self {
            fragment_id: fragment.id(),
            from_principal: fragment.from_principal.clone(),
            from_public_key: fragment.from_public_key,
            to_public_key: fragment.to_public_key,
            valid_until: fragment.valid_until,
            issued_at,
            revoked_at: fragment.revoked.then_some(issued_at),
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.valid_until.map_or(false, |until| now >= until)
    }

    pub fn is_active(&self, now: i64) -> bool {
        self.check(now).is_ok()
    }

    /// Revocation takes precedence over expiry.
    pub fn check(&self, now: i64) -> Result<(), DenyReason> {
        if self.is_revoked() {
            return Err(DenyReason::Revoked);
        }
        if self.is_expired(now) {
            return Err(DenyReason::Expired);
        }
        Ok(())
    }
}

/// Links a fragment to the capsule it was granted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessGrant {
    pub capsule_id: CapsuleId,
    pub fragment_id: FragmentId,
    pub granted_at: i64,
}

/// A capsule registered with the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsuleRecord {
    pub capsule_id: CapsuleId,
    pub owner: PrincipalId,
    /// Key the capsule is encrypted under. Unchanged by ownership transfer.
    pub owner_key: PublicKey,
    pub registered_at: i64,
}

impl CapsuleRecord {
    /// Whether `fragment` was issued by the current owner under the key
    /// this capsule is encrypted to.
    pub fn accepts(&self, fragment: &FragmentRecord) -> bool {
        fragment.from_principal == self.owner && fragment.from_public_key == self.owner_key
    }
}
