//! In-memory grant registry.
//!
//! Authorization takes the read lock, so transforms on different capsules
//! run in parallel. Grants, revocations and transfers take the write lock
//! and therefore wait for in-flight transforms.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use receipt_vault_core::{CapsuleId, FragmentId, PrincipalId, PublicKey, ReEncryptionKeyFragment};

use crate::error::{PermsError, Result};
use crate::grant::{AccessGrant, CapsuleRecord, FragmentRecord};
use crate::registry::{check_issuer, evaluate, AccessGrantRegistry};

#[derive(Default)]
struct RegistryInner {
    capsules: HashMap<CapsuleId, CapsuleRecord>,
    fragments: HashMap<FragmentId, FragmentRecord>,
    /// capsule -> fragment -> grant
    grants: HashMap<CapsuleId, BTreeMap<FragmentId, AccessGrant>>,
}

impl RegistryInner {
    fn revoke_capsule_grants(&mut self, capsule_id: &CapsuleId, at: i64) -> Vec<FragmentId> {
        let Some(links) = self.grants.get(capsule_id) else {
            return Vec::new();
        };
        let mut revoked = Vec::new();
        for fragment_id in links.keys() {
            if let Some(record) = self.fragments.get_mut(fragment_id) {
                if record.revoked_at.is_none() {
                    record.revoked_at = Some(at);
                    revoked.push(*fragment_id);
                }
            }
        }
        revoked
    }
}

/// Grant registry held in process memory.
#[derive(Default)]
pub struct MemoryGrantRegistry {
    inner: RwLock<RegistryInner>,
}

impl MemoryGrantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryInner>> {
        self.inner
            .read()
            .map_err(|e| PermsError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryInner>> {
        self.inner
            .write()
            .map_err(|e| PermsError::Poisoned(e.to_string()))
    }
}

impl AccessGrantRegistry for MemoryGrantRegistry {
    fn register_capsule(
        &self,
        capsule_id: CapsuleId,
        owner: &PrincipalId,
        owner_key: &PublicKey,
        at: i64,
    ) -> Result<()> {
        let mut inner = self.write()?;
        if let Some(existing) = inner.capsules.get(&capsule_id) {
            if &existing.owner == owner && &existing.owner_key == owner_key {
                return Ok(());
            }
            return Err(PermsError::CapsuleExists {
                capsule_id,
                owner: existing.owner.clone(),
            });
        }
        inner.capsules.insert(
            capsule_id,
            CapsuleRecord {
                capsule_id,
                owner: owner.clone(),
                owner_key: *owner_key,
                registered_at: at,
            },
        );
        debug!(capsule_id = %capsule_id, owner = %owner, "Registered capsule");
        Ok(())
    }

    fn capsule(&self, capsule_id: &CapsuleId) -> Result<Option<CapsuleRecord>> {
        Ok(self.read()?.capsules.get(capsule_id).cloned())
    }

    fn transfer_ownership(
        &self,
        capsule_id: &CapsuleId,
        new_owner: &PrincipalId,
        at: i64,
    ) -> Result<Vec<FragmentId>> {
        let mut inner = self.write()?;
        if !inner.capsules.contains_key(capsule_id) {
            return Err(PermsError::CapsuleNotFound(*capsule_id));
        }
        let revoked = inner.revoke_capsule_grants(capsule_id, at);
        if let Some(record) = inner.capsules.get_mut(capsule_id) {
            record.owner = new_owner.clone();
        }
        info!(
            capsule_id = %capsule_id,
            new_owner = %new_owner,
            revoked = revoked.len(),
            "Transferred capsule ownership"
        );
        Ok(revoked)
    }

    fn record_grant(
        &self,
        capsule_id: CapsuleId,
        fragment: &ReEncryptionKeyFragment,
        at: i64,
    ) -> Result<AccessGrant> {
        if fragment.revoked {
            return Err(PermsError::InvalidGrant("fragment is already revoked".into()));
        }
        let fragment_id = fragment.id();
        let mut inner = self.write()?;

        let capsule = inner
            .capsules
            .get(&capsule_id)
            .ok_or(PermsError::CapsuleNotFound(capsule_id))?;
        check_issuer(capsule, fragment)?;

        inner
            .fragments
            .entry(fragment_id)
            .or_insert_with(|| FragmentRecord::from_fragment(fragment, at));
        let grant = *inner
            .grants
            .entry(capsule_id)
            .or_default()
            .entry(fragment_id)
            .or_insert(AccessGrant {
                capsule_id,
                fragment_id,
                granted_at: at,
            });
        debug!(capsule_id = %capsule_id, fragment_id = %fragment_id, "Recorded grant");
        Ok(grant)
    }

    fn fragment(&self, fragment_id: &FragmentId) -> Result<Option<FragmentRecord>> {
        Ok(self.read()?.fragments.get(fragment_id).cloned())
    }

    fn grants_for_capsule(
        &self,
        capsule_id: &CapsuleId,
    ) -> Result<Vec<(AccessGrant, FragmentRecord)>> {
        let inner = self.read()?;
        if !inner.capsules.contains_key(capsule_id) {
            return Err(PermsError::CapsuleNotFound(*capsule_id));
        }
        let mut grants: Vec<_> = inner
            .grants
            .get(capsule_id)
            .into_iter()
            .flat_map(|links| links.values())
            .filter_map(|g| inner.fragments.get(&g.fragment_id).map(|r| (*g, r.clone())))
            .collect();
        grants.sort_by_key(|(g, _)| (g.granted_at, g.fragment_id));
        Ok(grants)
    }

    fn revoke_fragment(&self, fragment_id: &FragmentId, at: i64) -> Result<bool> {
        let mut inner = self.write()?;
        let record = inner
            .fragments
            .get_mut(fragment_id)
            .ok_or(PermsError::FragmentNotFound(*fragment_id))?;
        if record.revoked_at.is_some() {
            return Ok(false);
        }
        record.revoked_at = Some(at);
        info!(fragment_id = %fragment_id, "Revoked fragment");
        Ok(true)
    }

    fn revoke_all_for_capsule(&self, capsule_id: &CapsuleId, at: i64) -> Result<Vec<FragmentId>> {
        let mut inner = self.write()?;
        if !inner.capsules.contains_key(capsule_id) {
            return Err(PermsError::CapsuleNotFound(*capsule_id));
        }
        let revoked = inner.revoke_capsule_grants(capsule_id, at);
        info!(capsule_id = %capsule_id, revoked = revoked.len(), "Revoked all grants for capsule");
        Ok(revoked)
    }

    fn authorize<T, F>(
        &self,
        capsule_id: &CapsuleId,
        fragment_id: &FragmentId,
        now: i64,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&FragmentRecord) -> T,
    {
        let inner = self.read()?;
        let granted = inner
            .grants
            .get(capsule_id)
            .map_or(false, |links| links.contains_key(fragment_id));
        let record = evaluate(
            inner.capsules.get(capsule_id),
            inner.fragments.get(fragment_id),
            granted,
            now,
        )
        .map_err(PermsError::AccessDenied)?;
        Ok(f(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grant::DenyReason;
    use crate::state::ShareState;
    use receipt_vault_core::{generate_fragment, KeyPair};

    fn pair(name: &str) -> KeyPair {
        KeyPair::generate(PrincipalId::new(name).unwrap()).unwrap()
    }

    fn fragment(owner: &KeyPair, to: &KeyPair, until: Option<i64>) -> ReEncryptionKeyFragment {
        generate_fragment(
            owner.principal_id(),
            owner.secret_key(),
            owner.public_key(),
            to.public_key(),
            until,
        )
        .unwrap()
    }

    fn deny<T: std::fmt::Debug>(result: Result<T>) -> DenyReason {
        result.unwrap_err().deny_reason().unwrap()
    }

    #[test]
    fn test_authorize_happy_path() {
        let registry = MemoryGrantRegistry::new();
        let (alice, bob) = (pair("alice"), pair("bob"));
        let capsule = CapsuleId::from_bytes([1; 32]);
        registry.register_capsule(capsule, alice.principal_id(), alice.public_key(), 0).unwrap();
        let frag = fragment(&alice, &bob, Some(100));
        registry.record_grant(capsule, &frag, 1).unwrap();

        let to = registry
            .authorize(&capsule, &frag.id(), 50, |r| r.to_public_key)
            .unwrap();
        assert_eq!(&to, bob.public_key());
        assert!(registry.share_state(&capsule, 50).unwrap().is_shared());
    }

    #[test]
    fn test_deny_reasons() {
        let registry = MemoryGrantRegistry::new();
        let (alice, bob) = (pair("alice"), pair("bob"));
        let capsule = CapsuleId::from_bytes([1; 32]);
        let other = CapsuleId::from_bytes([2; 32]);
        let frag = fragment(&alice, &bob, Some(100));

        assert_eq!(deny(registry.authorize(&capsule, &frag.id(), 0, |_| ())), DenyReason::UnknownCapsule);

        registry.register_capsule(capsule, alice.principal_id(), alice.public_key(), 0).unwrap();
        registry.register_capsule(other, alice.principal_id(), alice.public_key(), 0).unwrap();
        assert_eq!(deny(registry.authorize(&capsule, &frag.id(), 0, |_| ())), DenyReason::UnknownFragment);

        registry.record_grant(other, &frag, 0).unwrap();
        assert_eq!(deny(registry.authorize(&capsule, &frag.id(), 0, |_| ())), DenyReason::NoGrant);

        registry.record_grant(capsule, &frag, 0).unwrap();
        assert_eq!(deny(registry.authorize(&capsule, &frag.id(), 100, |_| ())), DenyReason::Expired);

        assert!(registry.revoke_fragment(&frag.id(), 10).unwrap());
        assert!(!registry.revoke_fragment(&frag.id(), 11).unwrap());
        assert_eq!(deny(registry.authorize(&capsule, &frag.id(), 20, |_| ())), DenyReason::Revoked);
    }

    #[test]
    fn test_record_grant_requires_owner() {
        let registry = MemoryGrantRegistry::new();
        let (alice, bob, eve) = (pair("alice"), pair("bob"), pair("eve"));
        let capsule = CapsuleId::from_bytes([1; 32]);
        registry.register_capsule(capsule, alice.principal_id(), alice.public_key(), 0).unwrap();
        let forged = fragment(&eve, &bob, None);
        assert!(matches!(
            registry.record_grant(capsule, &forged, 0),
            Err(PermsError::NotOwner { .. })
        ));
    }

    #[test]
    fn test_register_capsule_conflict() {
        let registry = MemoryGrantRegistry::new();
        let capsule = CapsuleId::from_bytes([1; 32]);
        let (alice, bob) = (pair("alice"), pair("bob"));
        let (a, b) = (alice.principal_id(), bob.principal_id());
        registry.register_capsule(capsule, a, alice.public_key(), 0).unwrap();
        registry.register_capsule(capsule, a, alice.public_key(), 1).unwrap();
        assert!(matches!(
            registry.register_capsule(capsule, b, bob.public_key(), 2),
            Err(PermsError::CapsuleExists { .. })
        ));
        assert!(matches!(
            registry.register_capsule(capsule, a, bob.public_key(), 3),
            Err(PermsError::CapsuleExists { .. })
        ));
    }

    #[test]
    fn test_new_owner_cannot_grant_on_old_key() {
        let registry = MemoryGrantRegistry::new();
        let (alice, bob, carol) = (pair("alice"), pair("bob"), pair("carol"));
        let capsule = CapsuleId::from_bytes([1; 32]);
        registry.register_capsule(capsule, alice.principal_id(), alice.public_key(), 0).unwrap();
        registry.transfer_ownership(&capsule, bob.principal_id(), 1).unwrap();

        let frag = fragment(&bob, &carol, None);
        assert!(matches!(
            registry.record_grant(capsule, &frag, 2),
            Err(PermsError::OwnerKeyMismatch { .. })
        ));
        assert!(registry.grants_for_capsule(&capsule).unwrap().is_empty());
    }

    #[test]
    fn test_owner_mismatch_for_other_key() {
        let registry = MemoryGrantRegistry::new();
        let (alice, bob) = (pair("alice"), pair("bob"));
        let rotated = KeyPair::generate(alice.principal_id().clone()).unwrap();
        let capsule = CapsuleId::from_bytes([1; 32]);
        registry.register_capsule(capsule, alice.principal_id(), alice.public_key(), 0).unwrap();

        // same principal, different key, linked directly
        let frag = fragment(&rotated, &bob, None);
        {
            let mut inner = registry.write().unwrap();
            inner.fragments.insert(frag.id(), FragmentRecord::from_fragment(&frag, 0));
            inner.grants.entry(capsule).or_default().insert(
                frag.id(),
                AccessGrant {
                    capsule_id: capsule,
                    fragment_id: frag.id(),
                    granted_at: 0,
                },
            );
        }
        assert_eq!(deny(registry.authorize(&capsule, &frag.id(), 1, |_| ())), DenyReason::OwnerMismatch);
    }

    #[test]
    fn test_revoke_all_and_regrant() {
        let registry = MemoryGrantRegistry::new();
        let (alice, bob, carol) = (pair("alice"), pair("bob"), pair("carol"));
        let capsule = CapsuleId::from_bytes([1; 32]);
        registry.register_capsule(capsule, alice.principal_id(), alice.public_key(), 0).unwrap();
        let f1 = fragment(&alice, &bob, None);
        let f2 = fragment(&alice, &carol, None);
        registry.record_grant(capsule, &f1, 0).unwrap();
        registry.record_grant(capsule, &f2, 0).unwrap();

        let revoked = registry.revoke_all_for_capsule(&capsule, 5).unwrap();
        assert_eq!(revoked.len(), 2);
        for f in [&f1, &f2] {
            assert_eq!(deny(registry.authorize(&capsule, &f.id(), 6, |_| ())), DenyReason::Revoked);
        }
        assert!(matches!(registry.share_state(&capsule, 6).unwrap(), ShareState::Revoked(_)));

        let f3 = fragment(&alice, &bob, None);
        registry.record_grant(capsule, &f3, 7).unwrap();
        assert!(registry.share_state(&capsule, 8).unwrap().is_shared());
    }

    #[test]
    fn test_transfer_revokes_then_changes_owner() {
        let registry = MemoryGrantRegistry::new();
        let (alice, bob, carol) = (pair("alice"), pair("bob"), pair("carol"));
        let capsule = CapsuleId::from_bytes([1; 32]);
        registry.register_capsule(capsule, alice.principal_id(), alice.public_key(), 0).unwrap();
        let f1 = fragment(&alice, &bob, None);
        registry.record_grant(capsule, &f1, 0).unwrap();

        let revoked = registry.transfer_ownership(&capsule, carol.principal_id(), 5).unwrap();
        assert_eq!(revoked, vec![f1.id()]);
        assert_eq!(registry.capsule_owner(&capsule).unwrap().as_ref(), Some(carol.principal_id()));
        assert_eq!(deny(registry.authorize(&capsule, &f1.id(), 6, |_| ())), DenyReason::Revoked);

        // old owner can no longer grant
        let f2 = fragment(&alice, &bob, None);
        assert!(matches!(
            registry.record_grant(capsule, &f2, 7),
            Err(PermsError::NotOwner { .. })
        ));
    }

    #[test]
    fn test_owner_mismatch_for_stale_unrevoked_link() {
        let registry = MemoryGrantRegistry::new();
        let (alice, bob, carol) = (pair("alice"), pair("bob"), pair("carol"));
        let capsule = CapsuleId::from_bytes([1; 32]);
        let other = CapsuleId::from_bytes([2; 32]);
        registry.register_capsule(capsule, alice.principal_id(), alice.public_key(), 0).unwrap();
        registry.register_capsule(other, alice.principal_id(), alice.public_key(), 0).unwrap();
        let frag = fragment(&alice, &bob, None);
        registry.record_grant(other, &frag, 0).unwrap();

        // transfer `capsule` (which never had a grant), then link the
        // fragment's id to it directly to simulate a stale record
        registry.transfer_ownership(&capsule, carol.principal_id(), 1).unwrap();
        {
            let mut inner = registry.write().unwrap();
            inner.grants.entry(capsule).or_default().insert(
                frag.id(),
                AccessGrant {
                    capsule_id: capsule,
                    fragment_id: frag.id(),
                    granted_at: 2,
                },
            );
        }
        assert_eq!(deny(registry.authorize(&capsule, &frag.id(), 3, |_| ())), DenyReason::OwnerMismatch);
    }
}
