//! ProxyReEncryptor: the untrusted transform service.
//!
//! The proxy holds capsules, ciphertexts and re-encryption key fragments. It
//! never sees plaintext or private keys. Every transform is checked against
//! the [`AccessGrantRegistry`] and runs while the registry state it was
//! checked against is held. From async callers, registry calls run on the
//! blocking pool.

use std::sync::Arc;

use bytes::Bytes;
use receipt_vault_core::{
    re_encapsulate, Capsule, CapsuleCodec, CapsuleId, Ciphertext, CoreError, DecodeError,
    FragmentId, PrincipalId, PublicKey, ReEncryptionKeyFragment,
};
use receipt_vault_perms::{
    AccessGrant, AccessGrantRegistry, CapsuleRecord, DenyReason, FragmentRecord, PermsError,
    ShareState,
};
use receipt_vault_store::{layout, BlobStore, InsertResult};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, VaultError};

pub struct ProxyReEncryptor<S: BlobStore, R: AccessGrantRegistry, C: Clock = SystemClock> {
    store: Arc<S>,
    registry: Arc<R>,
    clock: C,
}

impl<S: BlobStore, R: AccessGrantRegistry + 'static, C: Clock> ProxyReEncryptor<S, R, C> {
    pub fn new(store: Arc<S>, registry: Arc<R>, clock: C) -> Self {
        Self {
            store,
            registry,
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Run `f` against the registry on the blocking pool.
    async fn registry_call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&R) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || f(&*registry))
            .await
            .map_err(|e| VaultError::Task(format!("spawn_blocking failed: {}", e)))?
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Capsules and grants
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a capsule and its ciphertext, then register `owner` as its
    /// owner under `owner_key`, the key the capsule is encrypted to.
    ///
    /// Blobs are written first, so a registered capsule can always be loaded.
    pub async fn register_capsule(
        &self,
        owner: &PrincipalId,
        owner_key: &PublicKey,
        capsule: &Capsule,
        ciphertext: &Ciphertext,
    ) -> Result<CapsuleId> {
        let capsule_id = capsule.id();
        if capsule.is_transformed() || ciphertext.capsule_id() != &capsule_id {
            return Err(CoreError::InvalidCapsule(
                "only an original capsule with its own ciphertext can be registered".into(),
            )
            .into());
        }
        self.store
            .put(
                &layout::capsule(&capsule_id),
                Bytes::from(CapsuleCodec::serialize(capsule)),
            )
            .await?;
        self.store
            .put(
                &layout::ciphertext(&capsule_id),
                Bytes::from(ciphertext.to_bytes()),
            )
            .await?;

        let now = self.now();
        let (owner_id, key) = (owner.clone(), *owner_key);
        self.registry_call(move |r| Ok(r.register_capsule(capsule_id, &owner_id, &key, now)?))
            .await?;
        info!(capsule = %capsule_id, owner = %owner, "registered capsule");
        Ok(capsule_id)
    }

    /// Registry record for a capsule.
    pub async fn capsule_record(&self, capsule_id: &CapsuleId) -> Result<CapsuleRecord> {
        let id = *capsule_id;
        self.registry_call(move |r| r.capsule(&id)?.ok_or(VaultError::CapsuleNotFound(id)))
            .await
    }

    /// Accept a fragment from a capsule's owner and record the grant.
    ///
    /// The fragment blob is stored before the grant is recorded, so a
    /// recorded grant always has its fragment available. A rejected grant
    /// leaves no fragment blob behind.
    pub async fn accept_fragment(
        &self,
        capsule_id: CapsuleId,
        fragment: &ReEncryptionKeyFragment,
    ) -> Result<AccessGrant> {
        let fragment_id = fragment.id();
        let key = layout::fragment(&fragment_id);
        let inserted = self
            .store
            .put_if_absent(&key, Bytes::from(fragment.to_bytes()?))
            .await?;

        let now = self.now();
        let submitted = fragment.clone();
        let recorded = self
            .registry_call(move |r| Ok(r.record_grant(capsule_id, &submitted, now)?))
            .await;
        let grant = match recorded {
            Ok(grant) => grant,
            Err(e) => {
                if inserted == InsertResult::Inserted {
                    self.discard_fragment_blob(&fragment_id).await?;
                }
                return Err(e);
            }
        };

        info!(
            capsule = %capsule_id,
            fragment = %fragment_id,
            from = %fragment.from_principal,
            to = %fragment.to_public_key,
            valid_until = ?fragment.valid_until,
            "granted access"
        );
        Ok(grant)
    }

    pub fn grants(
        &self,
        capsule_id: &CapsuleId,
    ) -> Result<Vec<(AccessGrant, FragmentRecord)>> {
        Ok(self.registry.grants_for_capsule(capsule_id)?)
    }

    pub fn share_state(&self, capsule_id: &CapsuleId) -> Result<ShareState> {
        Ok(self.registry.share_state(capsule_id, self.now())?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transform
    // ─────────────────────────────────────────────────────────────────────────

    /// Transform `capsule` for the fragment's recipient.
    ///
    /// The fragment's own flags are checked first, then the registry: the
    /// capsule must be registered, the fragment granted for it, neither
    /// revoked nor expired, and issued by the current owner under the
    /// capsule's key. The transform itself runs inside
    /// [`AccessGrantRegistry::authorize`].
    pub fn re_encrypt(
        &self,
        capsule: &Capsule,
        fragment: &ReEncryptionKeyFragment,
    ) -> Result<Capsule> {
        authorized_transform(&*self.registry, capsule, fragment, self.now())
    }

    /// Fetch a stored capsule, its ciphertext and a stored fragment, then
    /// transform the capsule on the blocking pool.
    pub async fn transform_stored(
        &self,
        capsule_id: &CapsuleId,
        fragment_id: &FragmentId,
    ) -> Result<(Capsule, Ciphertext)> {
        let capsule = self.load_capsule(capsule_id).await?;
        let ciphertext = self.load_ciphertext(capsule_id).await?;
        let fragment = self.load_fragment(fragment_id).await?;
        let now = self.now();
        let transformed = self
            .registry_call(move |r| authorized_transform(r, &capsule, &fragment, now))
            .await?;
        Ok((transformed, ciphertext))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Revocation and ownership
    // ─────────────────────────────────────────────────────────────────────────

    /// Revoke one fragment. Returns `false` if it was already revoked.
    pub async fn revoke_access(&self, fragment_id: &FragmentId) -> Result<bool> {
        let (id, now) = (*fragment_id, self.now());
        let newly = self
            .registry_call(move |r| Ok(r.revoke_fragment(&id, now)?))
            .await?;
        if newly {
            self.mark_stored_revoked(fragment_id).await?;
            info!(fragment = %fragment_id, "revoked access");
        }
        Ok(newly)
    }

    /// Revoke every fragment granted for a capsule.
    pub async fn revoke_all_for_capsule(&self, capsule_id: &CapsuleId) -> Result<Vec<FragmentId>> {
        let (id, now) = (*capsule_id, self.now());
        let revoked = self
            .registry_call(move |r| Ok(r.revoke_all_for_capsule(&id, now)?))
            .await?;
        for fragment_id in &revoked {
            self.mark_stored_revoked(fragment_id).await?;
        }
        info!(capsule = %capsule_id, count = revoked.len(), "revoked all access");
        Ok(revoked)
    }

    /// Revoke every grant for a capsule, then record its new owner.
    pub async fn transfer_ownership(
        &self,
        capsule_id: &CapsuleId,
        new_owner: &PrincipalId,
    ) -> Result<Vec<FragmentId>> {
        let (id, owner, now) = (*capsule_id, new_owner.clone(), self.now());
        let revoked = self
            .registry_call(move |r| Ok(r.transfer_ownership(&id, &owner, now)?))
            .await?;
        for fragment_id in &revoked {
            self.mark_stored_revoked(fragment_id).await?;
        }
        info!(
            capsule = %capsule_id,
            new_owner = %new_owner,
            revoked = revoked.len(),
            "transferred ownership"
        );
        Ok(revoked)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stored blobs
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn load_capsule(&self, capsule_id: &CapsuleId) -> Result<Capsule> {
        let blob = self
            .store
            .get(&layout::capsule(capsule_id))
            .await?
            .ok_or(VaultError::CapsuleNotFound(*capsule_id))?;
        let wire = std::str::from_utf8(&blob).map_err(|_| DecodeError::Utf8("capsule"))?;
        Ok(CapsuleCodec::deserialize(wire)?)
    }

    pub async fn load_ciphertext(&self, capsule_id: &CapsuleId) -> Result<Ciphertext> {
        let blob = self
            .store
            .get(&layout::ciphertext(capsule_id))
            .await?
            .ok_or(VaultError::CapsuleNotFound(*capsule_id))?;
        Ok(Ciphertext::from_bytes(&blob)?)
    }

    pub async fn load_fragment(&self, fragment_id: &FragmentId) -> Result<ReEncryptionKeyFragment> {
        let blob = self
            .store
            .get(&layout::fragment(fragment_id))
            .await?
            .ok_or(VaultError::FragmentNotFound(*fragment_id))?;
        Ok(ReEncryptionKeyFragment::from_bytes(&blob)?)
    }

    /// Keep the stored fragment's flag in step with the registry.
    async fn mark_stored_revoked(&self, fragment_id: &FragmentId) -> Result<()> {
        let key = layout::fragment(fragment_id);
        let Some(blob) = self.store.get(&key).await? else {
            return Ok(());
        };
        let mut fragment = ReEncryptionKeyFragment::from_bytes(&blob)?;
        if !fragment.revoked {
            fragment.revoke();
            self.store.put(&key, Bytes::from(fragment.to_bytes()?)).await?;
        }
        Ok(())
    }

    /// Delete a fragment blob unless a concurrent grant recorded it.
    async fn discard_fragment_blob(&self, fragment_id: &FragmentId) -> Result<()> {
        let id = *fragment_id;
        let recorded = self
            .registry_call(move |r| Ok(r.fragment(&id)?.is_some()))
            .await?;
        if !recorded {
            self.store.delete(&layout::fragment(fragment_id)).await?;
            debug!(fragment = %fragment_id, "discarded rejected fragment");
        }
        Ok(())
    }
}

/// Check a fragment's own flags, then authorize and run the transform
/// against `registry`.
fn authorized_transform<R: AccessGrantRegistry>(
    registry: &R,
    capsule: &Capsule,
    fragment: &ReEncryptionKeyFragment,
    now: i64,
) -> Result<Capsule> {
    let capsule_id = capsule.id();
    let fragment_id = fragment.id();

    if fragment.revoked {
        return Err(deny(&capsule_id, &fragment_id, DenyReason::Revoked));
    }
    if fragment.is_expired(now) {
        return Err(deny(&capsule_id, &fragment_id, DenyReason::Expired));
    }

    let transformed = match registry.authorize(&capsule_id, &fragment_id, now, |_| {
        re_encapsulate(capsule, fragment)
    }) {
        Ok(result) => result?,
        Err(PermsError::AccessDenied(reason)) => {
            return Err(deny(&capsule_id, &fragment_id, reason))
        }
        Err(e) => return Err(e.into()),
    };

    debug!(capsule = %capsule_id, fragment = %fragment_id, "re-encrypted capsule");
    Ok(transformed)
}

fn deny(capsule_id: &CapsuleId, fragment_id: &FragmentId, reason: DenyReason) -> VaultError {
    warn!(capsule = %capsule_id, fragment = %fragment_id, %reason, "re-encryption denied");
    PermsError::AccessDenied(reason).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ErrorKind;
    use async_trait::async_trait;
    use receipt_vault_core::{decrypt, generate_fragment, Encryptor, KeyPair};
    use receipt_vault_perms::MemoryGrantRegistry;
    use receipt_vault_store::{MemoryBlobStore, StoreError};

    /// Memory store that refuses writes under one key prefix.
    struct RefusingStore {
        inner: MemoryBlobStore,
        refuse: &'static str,
    }

    #[async_trait]
    impl BlobStore for RefusingStore {
        async fn put(&self, key: &str, blob: Bytes) -> receipt_vault_store::Result<()> {
            if key.starts_with(self.refuse) {
                return Err(StoreError::Task(format!("write refused: {key}")));
            }
            self.inner.put(key, blob).await
        }

        async fn put_if_absent(
            &self,
            key: &str,
            blob: Bytes,
        ) -> receipt_vault_store::Result<InsertResult> {
            self.inner.put_if_absent(key, blob).await
        }

        async fn get(&self, key: &str) -> receipt_vault_store::Result<Option<Bytes>> {
            self.inner.get(key).await
        }

        async fn contains(&self, key: &str) -> receipt_vault_store::Result<bool> {
            self.inner.contains(key).await
        }

        async fn delete(&self, key: &str) -> receipt_vault_store::Result<bool> {
            self.inner.delete(key).await
        }

        async fn list_prefix(&self, prefix: &str) -> receipt_vault_store::Result<Vec<String>> {
            self.inner.list_prefix(prefix).await
        }
    }

    type TestProxy = ProxyReEncryptor<MemoryBlobStore, MemoryGrantRegistry, ManualClock>;

    fn proxy(clock: &ManualClock) -> TestProxy {
        ProxyReEncryptor::new(
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MemoryGrantRegistry::new()),
            clock.clone(),
        )
    }

    fn pair(name: &str) -> KeyPair {
        KeyPair::generate(PrincipalId::new(name).unwrap()).unwrap()
    }

    fn grant_to(owner: &KeyPair, to: &KeyPair, until: Option<i64>) -> ReEncryptionKeyFragment {
        generate_fragment(
            owner.principal_id(),
            owner.secret_key(),
            owner.public_key(),
            to.public_key(),
            until,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_stored_transform() {
        let clock = ManualClock::new(1_000);
        let proxy = proxy(&clock);
        let (alice, bob) = (pair("alice"), pair("bob"));

        let (capsule, ciphertext) = Encryptor::default()
            .encrypt(b"receipt", alice.public_key())
            .unwrap();
        let capsule_id = proxy
            .register_capsule(alice.principal_id(), alice.public_key(), &capsule, &ciphertext)
            .await
            .unwrap();
        let fragment = grant_to(&alice, &bob, None);
        proxy.accept_fragment(capsule_id, &fragment).await.unwrap();

        let (transformed, stored_ct) = proxy
            .transform_stored(&capsule_id, &fragment.id())
            .await
            .unwrap();
        assert_eq!(transformed.id(), capsule_id);
        assert_eq!(
            decrypt(&transformed, &stored_ct, bob.secret_key()).unwrap(),
            b"receipt"
        );
    }

    #[tokio::test]
    async fn test_register_rejects_transformed() {
        let clock = ManualClock::new(0);
        let proxy = proxy(&clock);
        let (alice, bob) = (pair("alice"), pair("bob"));
        let (capsule, ciphertext) = Encryptor::default()
            .encrypt(b"x", alice.public_key())
            .unwrap();
        proxy
            .register_capsule(alice.principal_id(), alice.public_key(), &capsule, &ciphertext)
            .await
            .unwrap();
        let fragment = grant_to(&alice, &bob, None);
        proxy.accept_fragment(capsule.id(), &fragment).await.unwrap();
        let transformed = proxy.re_encrypt(&capsule, &fragment).unwrap();

        let err = proxy
            .register_capsule(bob.principal_id(), bob.public_key(), &transformed, &ciphertext)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCapsule);
    }

    #[tokio::test]
    async fn test_failed_blob_write_leaves_capsule_unregistered() {
        let store = RefusingStore {
            inner: MemoryBlobStore::new(),
            refuse: layout::CIPHERTEXT_PREFIX,
        };
        let proxy = ProxyReEncryptor::new(
            Arc::new(store),
            Arc::new(MemoryGrantRegistry::new()),
            ManualClock::new(0),
        );
        let alice = pair("alice");
        let (capsule, ciphertext) = Encryptor::default()
            .encrypt(b"x", alice.public_key())
            .unwrap();

        let err = proxy
            .register_capsule(alice.principal_id(), alice.public_key(), &capsule, &ciphertext)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(proxy.registry().capsule(&capsule.id()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_registered_capsule_records_owner_key() {
        let clock = ManualClock::new(0);
        let proxy = proxy(&clock);
        let alice = pair("alice");
        let (capsule, ciphertext) = Encryptor::default()
            .encrypt(b"x", alice.public_key())
            .unwrap();
        let capsule_id = proxy
            .register_capsule(alice.principal_id(), alice.public_key(), &capsule, &ciphertext)
            .await
            .unwrap();

        let record = proxy.capsule_record(&capsule_id).await.unwrap();
        assert_eq!(&record.owner, alice.principal_id());
        assert_eq!(&record.owner_key, alice.public_key());
        assert!(proxy.load_capsule(&capsule_id).await.is_ok());
        assert!(proxy.load_ciphertext(&capsule_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_grant_leaves_no_fragment_blob() {
        let clock = ManualClock::new(0);
        let proxy = proxy(&clock);
        let (alice, bob, eve) = (pair("alice"), pair("bob"), pair("eve"));
        let (capsule, ciphertext) = Encryptor::default()
            .encrypt(b"x", alice.public_key())
            .unwrap();
        proxy
            .register_capsule(alice.principal_id(), alice.public_key(), &capsule, &ciphertext)
            .await
            .unwrap();

        let forged = grant_to(&eve, &bob, None);
        let err = proxy.accept_fragment(capsule.id(), &forged).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!proxy
            .store()
            .contains(&layout::fragment(&forged.id()))
            .await
            .unwrap());

        let unknown = CapsuleId::from_bytes([7; 32]);
        let fragment = grant_to(&alice, &bob, None);
        let err = proxy.accept_fragment(unknown, &fragment).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!proxy
            .store()
            .contains(&layout::fragment(&fragment.id()))
            .await
            .unwrap());

        // the same fragment is still accepted for the right capsule
        proxy.accept_fragment(capsule.id(), &fragment).await.unwrap();
        assert!(proxy.load_fragment(&fragment.id()).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_utf8_capsule_blob_is_decode_error() {
        let clock = ManualClock::new(0);
        let proxy = proxy(&clock);
        let capsule_id = CapsuleId::from_bytes([3; 32]);
        proxy
            .store()
            .put(&layout::capsule(&capsule_id), Bytes::from_static(&[0xff, 0xfe, b'.', 0x80]))
            .await
            .unwrap();

        let err = proxy.load_capsule(&capsule_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(matches!(
            err,
            VaultError::Core(CoreError::Decode(DecodeError::Utf8("capsule")))
        ));
    }

    #[tokio::test]
    async fn test_revocation_updates_stored_fragment() {
        let clock = ManualClock::new(0);
        let proxy = proxy(&clock);
        let (alice, bob) = (pair("alice"), pair("bob"));
        let (capsule, ciphertext) = Encryptor::default()
            .encrypt(b"x", alice.public_key())
            .unwrap();
        proxy
            .register_capsule(alice.principal_id(), alice.public_key(), &capsule, &ciphertext)
            .await
            .unwrap();
        let fragment = grant_to(&alice, &bob, None);
        proxy.accept_fragment(capsule.id(), &fragment).await.unwrap();

        assert!(proxy.revoke_access(&fragment.id()).await.unwrap());
        assert!(!proxy.revoke_access(&fragment.id()).await.unwrap());
        let stored = proxy.load_fragment(&fragment.id()).await.unwrap();
        assert!(stored.revoked);
        assert_eq!(stored.id(), fragment.id());
    }

    #[tokio::test]
    async fn test_local_flags_checked_first() {
        let clock = ManualClock::new(500);
        let proxy = proxy(&clock);
        let (alice, bob) = (pair("alice"), pair("bob"));
        let (capsule, _) = Encryptor::default()
            .encrypt(b"x", alice.public_key())
            .unwrap();

        let mut revoked = grant_to(&alice, &bob, None);
        revoked.revoke();
        let err = proxy.re_encrypt(&capsule, &revoked).unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::Revoked));

        let expired = grant_to(&alice, &bob, Some(500));
        let err = proxy.re_encrypt(&capsule, &expired).unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::Expired));

        // Unregistered capsule, usable fragment.
        let fresh = grant_to(&alice, &bob, None);
        let err = proxy.re_encrypt(&capsule, &fresh).unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::UnknownCapsule));
    }

    #[tokio::test]
    async fn test_missing_blobs() {
        let clock = ManualClock::new(0);
        let proxy = proxy(&clock);
        let capsule_id = CapsuleId::from_bytes([9; 32]);
        let fragment_id = FragmentId::from_bytes([8; 32]);
        assert!(matches!(
            proxy.load_capsule(&capsule_id).await.unwrap_err(),
            VaultError::CapsuleNotFound(_)
        ));
        assert!(matches!(
            proxy.load_fragment(&fragment_id).await.unwrap_err(),
            VaultError::FragmentNotFound(_)
        ));
    }
}
