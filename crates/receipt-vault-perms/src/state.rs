//! Per-capsule sharing state.
//!
//! `OwnerOnly` until the first grant, `Shared` while any fragment is active,
//! `Revoked` once every fragment is revoked or expired. A fresh grant moves a
//! revoked capsule back to `Shared`.

use std::collections::BTreeSet;

use receipt_vault_core::PublicKey;

use crate::grant::FragmentRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareState {
    OwnerOnly,
    /// Recipients holding at least one active fragment.
    Shared(BTreeSet<PublicKey>),
    /// Recipients whose fragments are all revoked or expired.
    Revoked(BTreeSet<PublicKey>),
}

impl ShareState {
    /// Derive the state from the fragments granted for one capsule.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a FragmentRecord>,
        now: i64,
    ) -> Self {
        let mut active = BTreeSet::new();
        let mut inactive = BTreeSet::new();
        let mut any = false;

        for record in records {
            any = true;
            if record.is_active(now) {
                active.insert(record.to_public_key);
            } else {
                inactive.insert(record.to_public_key);
            }
        }

        if !any {
            ShareState::OwnerOnly
        } else if !active.is_empty() {
            ShareState::Shared(active)
        } else {
            ShareState::Revoked(inactive)
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, ShareState::Shared(_))
    }

    pub fn recipients(&self) -> Option<&BTreeSet<PublicKey>> {
        match self {
            ShareState::OwnerOnly => None,
            ShareState::Shared(r) | ShareState::Revoked(r) => Some(r),
        }
    }
}
