//! AccessGrantRegistry trait: the proxy's record of who may transform what.
//!
//! The registry is the only shared mutable state in the system. Revocations
//! and ownership transfers are atomic, and [`AccessGrantRegistry::authorize`]
//! runs the caller's transform while the registry state it checked is still
//! held, so a revocation that has returned is seen by every later transform.

use receipt_vault_core::{CapsuleId, FragmentId, PrincipalId, PublicKey, ReEncryptionKeyFragment};

use crate::error::{PermsError, Result};
use crate::grant::{AccessGrant, CapsuleRecord, DenyReason, FragmentRecord};
use crate::state::ShareState;

pub trait AccessGrantRegistry: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Capsules
    // ─────────────────────────────────────────────────────────────────────────

    /// Record `owner` as the owner of a capsule encrypted to `owner_key`.
    ///
    /// Idempotent for the same owner and key. Anything else yields
    /// `CapsuleExists`; use [`Self::transfer_ownership`] instead.
    fn register_capsule(
        &self,
        capsule_id: CapsuleId,
        owner: &PrincipalId,
        owner_key: &PublicKey,
        at: i64,
    ) -> Result<()>;

    fn capsule(&self, capsule_id: &CapsuleId) -> Result<Option<CapsuleRecord>>;

    fn capsule_owner(&self, capsule_id: &CapsuleId) -> Result<Option<PrincipalId>> {
        Ok(self.capsule(capsule_id)?.map(|c| c.owner))
    }

    /// Atomically revoke every fragment granted for the capsule, then record
    /// the new owner. Returns the fragments that were newly revoked.
    ///
    /// The capsule stays encrypted to its original key, so the new owner
    /// cannot grant on it; the facade re-seals under the new owner's key.
    fn transfer_ownership(
        &self,
        capsule_id: &CapsuleId,
        new_owner: &PrincipalId,
        at: i64,
    ) -> Result<Vec<FragmentId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Grants
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a fragment and link it to a capsule.
    ///
    /// The fragment's issuer must be the capsule's registered owner
    /// (`NotOwner`), issuing from the key the capsule is encrypted to
    /// (`OwnerKeyMismatch`). Re-recording an existing link returns the original grant.
    fn record_grant(
        &self,
        capsule_id: CapsuleId,
        fragment: &ReEncryptionKeyFragment,
        at: i64,
    ) -> Result<AccessGrant>;

    fn fragment(&self, fragment_id: &FragmentId) -> Result<Option<FragmentRecord>>;

    /// All grants for a capsule with their fragment records, oldest first.
    fn grants_for_capsule(
        &self,
        capsule_id: &CapsuleId,
    ) -> Result<Vec<(AccessGrant, FragmentRecord)>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Revocation
    // ─────────────────────────────────────────────────────────────────────────

    /// Revoke one fragment. Returns `false` if it was already revoked.
    fn revoke_fragment(&self, fragment_id: &FragmentId, at: i64) -> Result<bool>;

    /// Revoke every fragment granted for a capsule. Returns the fragments
    /// that were newly revoked.
    fn revoke_all_for_capsule(&self, capsule_id: &CapsuleId, at: i64) -> Result<Vec<FragmentId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Authorization
    // ─────────────────────────────────────────────────────────────────────────

    /// Check that `fragment_id` may transform `capsule_id` at `now`, and if
    /// so run `f` before any concurrent revocation can take effect.
    ///
    /// Denials surface as `PermsError::AccessDenied` with, in order of
    /// precedence: `UnknownCapsule`, `UnknownFragment`, `NoGrant`,
    /// `Revoked`, `Expired`, `OwnerMismatch`.
    fn authorize<T, F>(
        &self,
        capsule_id: &CapsuleId,
        fragment_id: &FragmentId,
        now: i64,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&FragmentRecord) -> T;

    /// Current sharing state of a capsule.
    fn share_state(&self, capsule_id: &CapsuleId, now: i64) -> Result<ShareState> {
        let grants = self.grants_for_capsule(capsule_id)?;
        Ok(ShareState::from_records(grants.iter().map(|(_, r)| r), now))
    }
}

/// Shared authorization decision for registry backends.
pub(crate) fn evaluate<'a>(
    capsule: Option<&CapsuleRecord>,
    record: Option<&'a FragmentRecord>,
    granted: bool,
    now: i64,
) -> std::result::Result<&'a FragmentRecord, DenyReason> {
    let capsule = capsule.ok_or(DenyReason::UnknownCapsule)?;
    let record = record.ok_or(DenyReason::UnknownFragment)?;
    if !granted {
        return Err(DenyReason::NoGrant);
    }
    record.check(now)?;
    if !capsule.accepts(record) {
        return Err(DenyReason::OwnerMismatch);
    }
    Ok(record)
}

/// Shared issuer check for [`AccessGrantRegistry::record_grant`].
pub(crate) fn check_issuer(
    capsule: &CapsuleRecord,
    fragment: &ReEncryptionKeyFragment,
) -> Result<()> {
    if capsule.owner != fragment.from_principal {
        return Err(PermsError::NotOwner {
            capsule_id: capsule.capsule_id,
            principal: fragment.from_principal.clone(),
        });
    }
    if capsule.owner_key != fragment.from_public_key {
        return Err(PermsError::OwnerKeyMismatch {
            capsule_id: capsule.capsule_id,
            principal: fragment.from_principal.clone(),
        });
    }
    Ok(())
}
