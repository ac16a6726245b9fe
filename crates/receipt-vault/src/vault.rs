//! The Vault: the grant API over keys, proxy and storage.
//!
//! Owner-side operations (sealing receipts, generating fragments) and
//! proxy-side operations (transforms, revocation) share one handle here for
//! convenience. Private keys stay inside [`KeyPairService`]; the proxy only
//! ever receives capsules, ciphertexts and fragments.

use std::sync::Arc;

use bytes::Bytes;
use receipt_vault_core::{
    decrypt, generate_fragment, Capsule, CapsuleId, Ciphertext, DecodeError, Encryptor,
    FragmentId, KeyPair, PrincipalId, PublicKey, SymmetricKey,
};
use receipt_vault_perms::{AccessGrantRegistry, PermsError, ShareState, SqliteGrantRegistry};
use receipt_vault_store::{layout, BlobStore, SqliteBlobStore};
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::keys::KeyPairService;
use crate::proxy::ProxyReEncryptor;

pub struct Vault<S: BlobStore, R: AccessGrantRegistry, C: Clock = SystemClock> {
    keys: KeyPairService<S>,
    proxy: ProxyReEncryptor<S, R, C>,
    encryptor: Encryptor,
    config: VaultConfig,
}

/// Outcome of [`Vault::transfer_ownership`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipTransfer {
    pub previous_owner: PrincipalId,
    /// The receipt re-sealed under the new owner's key.
    pub capsule_id: CapsuleId,
    /// Fragments on the transferred capsule that this transfer revoked.
    pub revoked: Vec<FragmentId>,
}

impl<S: BlobStore, R: AccessGrantRegistry + 'static, C: Clock> Vault<S, R, C> {
    /// Assemble a vault.
    ///
    /// `keys` is the owners' secure key storage; `store` is the shared blob
    /// store the proxy reads capsules, ciphertexts and fragments from.
    pub fn new(
        keys: KeyPairService<S>,
        store: S,
        registry: R,
        clock: C,
        config: VaultConfig,
    ) -> Self {
        Self {
            keys,
            proxy: ProxyReEncryptor::new(Arc::new(store), Arc::new(registry), clock),
            encryptor: Encryptor::new(config.max_plaintext_bytes),
            config,
        }
    }

    pub fn keys(&self) -> &KeyPairService<S> {
        &self.keys
    }

    pub fn proxy(&self) -> &ProxyReEncryptor<S, R, C> {
        &self.proxy
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Principals
    // ─────────────────────────────────────────────────────────────────────────

    /// Generate a key pair for a principal and publish its public key.
    pub async fn register_principal(&self, principal_id: PrincipalId) -> Result<PublicKey> {
        let keypair = self.keys.generate(principal_id).await?;
        let public_key = *keypair.public_key();
        self.proxy
            .store()
            .put(
                &layout::public_key(keypair.principal_id()),
                Bytes::copy_from_slice(public_key.as_bytes()),
            )
            .await?;
        info!(principal = %keypair.principal_id(), %public_key, "registered principal");
        Ok(public_key)
    }

    /// A principal's published public key.
    pub async fn public_key(&self, principal_id: &PrincipalId) -> Result<PublicKey> {
        let blob = self
            .proxy
            .store()
            .get(&layout::public_key(principal_id))
            .await?
            .ok_or_else(|| VaultError::PublicKeyNotFound(principal_id.clone()))?;
        let bytes: [u8; 32] = blob[..].try_into().map_err(|_| DecodeError::Length {
            what: "public key",
            expected: 32,
            actual: blob.len(),
        })?;
        Ok(PublicKey::from_bytes(&bytes)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Owner side
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt a receipt under the owner's public key and hand the capsule and
    /// ciphertext to the proxy.
    pub async fn seal(&self, owner: &PrincipalId, plaintext: &[u8]) -> Result<CapsuleId> {
        let public_key = self.public_key(owner).await?;
        let (capsule, ciphertext) = self.encryptor.encrypt(plaintext, &public_key)?;
        self.proxy
            .register_capsule(owner, &public_key, &capsule, &ciphertext)
            .await
    }

    /// Grant `recipient` access to a capsule owned by `owner`.
    ///
    /// Generates the fragment with the owner's private key and submits it to
    /// the proxy. Without an explicit `valid_until`, the configured default
    /// TTL applies, if any.
    pub async fn grant_access(
        &self,
        owner: &PrincipalId,
        capsule_id: CapsuleId,
        recipient: &PrincipalId,
        valid_until: Option<i64>,
    ) -> Result<FragmentId> {
        let owner_keys = self.keys.load(owner).await?;
        let recipient_key = self.public_key(recipient).await?;
        let valid_until = valid_until.or_else(|| {
            self.config
                .default_grant_ttl_ms
                .map(|ttl| self.proxy.now().saturating_add(ttl))
        });

        let fragment = generate_fragment(
            owner_keys.principal_id(),
            owner_keys.secret_key(),
            owner_keys.public_key(),
            &recipient_key,
            valid_until,
        )?;
        self.proxy.accept_fragment(capsule_id, &fragment).await?;
        Ok(fragment.id())
    }

    pub async fn revoke_access(&self, fragment_id: &FragmentId) -> Result<bool> {
        self.proxy.revoke_access(fragment_id).await
    }

    pub async fn revoke_all_for_capsule(&self, capsule_id: &CapsuleId) -> Result<Vec<FragmentId>> {
        self.proxy.revoke_all_for_capsule(capsule_id).await
    }

    /// Hand a receipt to `new_owner`.
    ///
    /// Every grant on the capsule is revoked and `new_owner` recorded as its
    /// owner before anything else. The receipt is then re-sealed under the
    /// new owner's key as a fresh capsule with no grants, which is the one
    /// the new owner shares from. The old capsule stays encrypted to the
    /// previous key, so grants on it are refused with `OwnerKeyMismatch`.
    ///
    /// The previous owner's key pair must be held by this vault.
    pub async fn transfer_ownership(
        &self,
        capsule_id: &CapsuleId,
        new_owner: &PrincipalId,
    ) -> Result<OwnershipTransfer> {
        let new_key = self.public_key(new_owner).await?;
        let record = self.proxy.capsule_record(capsule_id).await?;
        let previous = self.keys.load(&record.owner).await?;
        if previous.public_key() != &record.owner_key {
            return Err(PermsError::OwnerKeyMismatch {
                capsule_id: *capsule_id,
                principal: record.owner,
            }
            .into());
        }

        let capsule = self.proxy.load_capsule(capsule_id).await?;
        let ciphertext = self.proxy.load_ciphertext(capsule_id).await?;
        let plaintext = self.open(&previous, &capsule, &ciphertext)?;
        let (resealed, resealed_ct) = self.encryptor.encrypt(&plaintext, &new_key)?;

        let revoked = self.proxy.transfer_ownership(capsule_id, new_owner).await?;
        let new_id = self
            .proxy
            .register_capsule(new_owner, &new_key, &resealed, &resealed_ct)
            .await?;
        info!(
            from = %capsule_id,
            to = %new_id,
            owner = %new_owner,
            "re-sealed capsule for new owner"
        );
        Ok(OwnershipTransfer {
            previous_owner: record.owner,
            capsule_id: new_id,
            revoked,
        })
    }

    pub fn share_state(&self, capsule_id: &CapsuleId) -> Result<ShareState> {
        self.proxy.share_state(capsule_id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recipient side
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask the proxy to transform a stored capsule with a granted fragment.
    pub async fn request_access(
        &self,
        capsule_id: &CapsuleId,
        fragment_id: &FragmentId,
    ) -> Result<(Capsule, Ciphertext)> {
        self.proxy.transform_stored(capsule_id, fragment_id).await
    }

    /// Decrypt an original or transformed capsule.
    pub fn open(
        &self,
        keypair: &KeyPair,
        capsule: &Capsule,
        ciphertext: &Ciphertext,
    ) -> Result<Vec<u8>> {
        Ok(decrypt(capsule, ciphertext, keypair.secret_key())?)
    }

    /// Owner reads back one of their own capsules.
    pub async fn open_own(&self, owner: &PrincipalId, capsule_id: &CapsuleId) -> Result<Vec<u8>> {
        let keypair = self.keys.load(owner).await?;
        let capsule = self.proxy.load_capsule(capsule_id).await?;
        let ciphertext = self.proxy.load_ciphertext(capsule_id).await?;
        self.open(&keypair, &capsule, &ciphertext)
    }

    /// Recipient reads a capsule shared with them through `fragment_id`.
    pub async fn open_shared(
        &self,
        recipient: &PrincipalId,
        capsule_id: &CapsuleId,
        fragment_id: &FragmentId,
    ) -> Result<Vec<u8>> {
        let keypair = self.keys.load(recipient).await?;
        let (capsule, ciphertext) = self.request_access(capsule_id, fragment_id).await?;
        self.open(&keypair, &capsule, &ciphertext)
    }
}

impl Vault<SqliteBlobStore, SqliteGrantRegistry, SystemClock> {
    /// Open a SQLite-backed vault at `config.sqlite_path`, or in memory when
    /// no path is configured.
    ///
    /// Blobs and registry share the database file; secret keys in it are
    /// sealed under `wrap`.
    pub fn open_sqlite(config: VaultConfig, wrap: SymmetricKey) -> Result<Self> {
        if config.max_plaintext_bytes == 0 {
            return Err(VaultError::Config("max_plaintext_bytes must be positive".into()));
        }
        let (store, registry) = match &config.sqlite_path {
            Some(path) => (SqliteBlobStore::open(path)?, SqliteGrantRegistry::open(path)?),
            None => (SqliteBlobStore::open_memory()?, SqliteGrantRegistry::open_memory()?),
        };
        info!(path = ?config.sqlite_path, "opened sqlite vault");
        let keys = KeyPairService::new(store.clone(), wrap);
        Ok(Self::new(keys, store, registry, SystemClock, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use receipt_vault_perms::{DenyReason, MemoryGrantRegistry};
    use receipt_vault_store::MemoryBlobStore;

    type TestVault = Vault<MemoryBlobStore, MemoryGrantRegistry, ManualClock>;

    fn vault(clock: &ManualClock, config: VaultConfig) -> TestVault {
        Vault::new(
            KeyPairService::new(MemoryBlobStore::new(), SymmetricKey::from_bytes([1; 32])),
            MemoryBlobStore::new(),
            MemoryGrantRegistry::new(),
            clock.clone(),
            config,
        )
    }

    fn id(name: &str) -> PrincipalId {
        PrincipalId::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_register_principal_publishes_key() {
        let v = vault(&ManualClock::new(0), VaultConfig::default());
        let pk = v.register_principal(id("alice")).await.unwrap();
        assert_eq!(v.public_key(&id("alice")).await.unwrap(), pk);

        let err = v.public_key(&id("nobody")).await.unwrap_err();
        assert!(matches!(err, VaultError::PublicKeyNotFound(_)));

        let err = v.register_principal(id("alice")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_seal_respects_limit() {
        let config = VaultConfig {
            max_plaintext_bytes: 8,
            ..VaultConfig::default()
        };
        let v = vault(&ManualClock::new(0), config);
        v.register_principal(id("alice")).await.unwrap();

        let capsule_id = v.seal(&id("alice"), b"12345678").await.unwrap();
        assert_eq!(v.open_own(&id("alice"), &capsule_id).await.unwrap(), b"12345678");

        let err = v.seal(&id("alice"), b"123456789").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
    }

    #[tokio::test]
    async fn test_default_ttl_applies() {
        let clock = ManualClock::new(10_000);
        let config = VaultConfig {
            default_grant_ttl_ms: Some(1_000),
            ..VaultConfig::default()
        };
        let v = vault(&clock, config);
        v.register_principal(id("alice")).await.unwrap();
        v.register_principal(id("bob")).await.unwrap();
        let capsule_id = v.seal(&id("alice"), b"r").await.unwrap();

        let fragment_id = v
            .grant_access(&id("alice"), capsule_id, &id("bob"), None)
            .await
            .unwrap();
        let record = v.proxy().registry().fragment(&fragment_id).unwrap().unwrap();
        assert_eq!(record.valid_until, Some(11_000));

        clock.advance(999);
        assert_eq!(
            v.open_shared(&id("bob"), &capsule_id, &fragment_id).await.unwrap(),
            b"r"
        );
        clock.advance(1);
        let err = v
            .open_shared(&id("bob"), &capsule_id, &fragment_id)
            .await
            .unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::Expired));
    }

    #[tokio::test]
    async fn test_grant_requires_recipient_key() {
        let v = vault(&ManualClock::new(0), VaultConfig::default());
        v.register_principal(id("alice")).await.unwrap();
        let capsule_id = v.seal(&id("alice"), b"r").await.unwrap();
        let err = v
            .grant_access(&id("alice"), capsule_id, &id("carol"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::PublicKeyNotFound(_)));
    }

    #[tokio::test]
    async fn test_non_owner_cannot_grant() {
        let v = vault(&ManualClock::new(0), VaultConfig::default());
        for name in ["alice", "bob", "carol"] {
            v.register_principal(id(name)).await.unwrap();
        }
        let capsule_id = v.seal(&id("alice"), b"r").await.unwrap();
        let err = v
            .grant_access(&id("bob"), capsule_id, &id("carol"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_transfer_reseals_for_new_owner() {
        let v = vault(&ManualClock::new(0), VaultConfig::default());
        for name in ["alice", "bob", "carol"] {
            v.register_principal(id(name)).await.unwrap();
        }
        let old = v.seal(&id("alice"), b"r").await.unwrap();
        let transfer = v.transfer_ownership(&old, &id("bob")).await.unwrap();
        assert_eq!(transfer.previous_owner, id("alice"));
        assert_ne!(transfer.capsule_id, old);
        assert!(transfer.revoked.is_empty());
        assert_eq!(v.open_own(&id("bob"), &transfer.capsule_id).await.unwrap(), b"r");

        let err = v
            .grant_access(&id("bob"), old, &id("carol"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);

        // transferring the stale capsule again is refused the same way
        let err = v.transfer_ownership(&old, &id("carol")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
    }

    #[test]
    fn test_open_sqlite_in_memory() {
        let v = Vault::open_sqlite(VaultConfig::default(), SymmetricKey::from_bytes([2; 32]))
            .unwrap();
        assert_eq!(v.config().max_plaintext_bytes, 1024 * 1024);
    }
}
