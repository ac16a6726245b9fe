//! KeyPairService: key generation and the principal's own secure storage.
//!
//! Secret keys are sealed under a local wrap key, with the principal id as
//! associated data, before they reach the blob store. A sealed blob copied
//! under another principal's key does not open.

use std::sync::Arc;

use bytes::Bytes;
use receipt_vault_core::{KeyPair, PrincipalId, SealedSecretKey, SymmetricKey};
use receipt_vault_store::{layout, BlobStore, InsertResult};
use tracing::{debug, info};

use crate::error::{Result, VaultError};

pub struct KeyPairService<K: BlobStore> {
    store: Arc<K>,
    wrap: SymmetricKey,
}

impl<K: BlobStore> KeyPairService<K> {
    pub fn new(store: K, wrap: SymmetricKey) -> Self {
        Self::with_shared(Arc::new(store), wrap)
    }

    pub fn with_shared(store: Arc<K>, wrap: SymmetricKey) -> Self {
        Self { store, wrap }
    }

    /// Generate a fresh key pair and seal its secret into storage.
    ///
    /// Fails with [`VaultError::KeyPairExists`] rather than replacing a
    /// stored pair.
    pub async fn generate(&self, principal_id: PrincipalId) -> Result<KeyPair> {
        let keypair = KeyPair::generate(principal_id)?;
        let principal = keypair.principal_id();
        let sealed = keypair
            .secret_key()
            .seal(&self.wrap, principal.as_str().as_bytes())?;

        let key = layout::sealed_secret_key(principal);
        match self
            .store
            .put_if_absent(&key, Bytes::from(sealed.to_bytes()))
            .await?
        {
            InsertResult::Inserted => {
                info!(
                    principal = %principal,
                    public_key = %keypair.public_key(),
                    "generated key pair"
                );
                Ok(keypair)
            }
            InsertResult::AlreadyExists => Err(VaultError::KeyPairExists(principal.clone())),
        }
    }

    /// Load a previously generated key pair.
    pub async fn load(&self, principal_id: &PrincipalId) -> Result<KeyPair> {
        let key = layout::sealed_secret_key(principal_id);
        let blob = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| VaultError::KeyPairNotFound(principal_id.clone()))?;
        let sealed = SealedSecretKey::from_bytes(&blob)?;
        let secret = sealed.open(&self.wrap, principal_id.as_str().as_bytes())?;
        debug!(principal = %principal_id, "loaded key pair");
        Ok(KeyPair::from_secret(principal_id.clone(), secret))
    }

    pub async fn exists(&self, principal_id: &PrincipalId) -> Result<bool> {
        Ok(self
            .store
            .contains(&layout::sealed_secret_key(principal_id))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use receipt_vault_store::MemoryBlobStore;

    fn service() -> KeyPairService<MemoryBlobStore> {
        KeyPairService::new(MemoryBlobStore::new(), SymmetricKey::from_bytes([7; 32]))
    }

    fn alice() -> PrincipalId {
        PrincipalId::new("alice").unwrap()
    }

    #[tokio::test]
    async fn test_generate_then_load() {
        let keys = service();
        let generated = keys.generate(alice()).await.unwrap();
        let loaded = keys.load(&alice()).await.unwrap();
        assert_eq!(generated.public_key(), loaded.public_key());
        assert_eq!(loaded.principal_id(), &alice());
        assert!(keys.exists(&alice()).await.unwrap());
    }

    #[tokio::test]
    async fn test_generate_refuses_overwrite() {
        let keys = service();
        let first = keys.generate(alice()).await.unwrap();
        let err = keys.generate(alice()).await.unwrap_err();
        assert!(matches!(err, VaultError::KeyPairExists(_)));
        assert_eq!(
            keys.load(&alice()).await.unwrap().public_key(),
            first.public_key()
        );
    }

    #[tokio::test]
    async fn test_load_missing() {
        let err = service().load(&alice()).await.unwrap_err();
        assert!(matches!(err, VaultError::KeyPairNotFound(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_stored_secret_is_sealed() {
        let store = Arc::new(MemoryBlobStore::new());
        let keys = KeyPairService::with_shared(store.clone(), SymmetricKey::from_bytes([7; 32]));
        let keypair = keys.generate(alice()).await.unwrap();

        let blob = store
            .get(&layout::sealed_secret_key(&alice()))
            .await
            .unwrap()
            .unwrap();
        let secret = keypair.secret_key().to_bytes();
        assert!(!blob.windows(32).any(|w| w == &secret[..]));
    }

    #[tokio::test]
    async fn test_wrong_wrap_key_fails() {
        let store = Arc::new(MemoryBlobStore::new());
        KeyPairService::with_shared(store.clone(), SymmetricKey::from_bytes([7; 32]))
            .generate(alice())
            .await
            .unwrap();

        let other = KeyPairService::with_shared(store, SymmetricKey::from_bytes([8; 32]));
        let err = other.load(&alice()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decryption);
    }

    #[tokio::test]
    async fn test_sealed_blob_bound_to_principal() {
        let store = Arc::new(MemoryBlobStore::new());
        let keys = KeyPairService::with_shared(store.clone(), SymmetricKey::from_bytes([7; 32]));
        keys.generate(alice()).await.unwrap();

        let bob = PrincipalId::new("bob").unwrap();
        let blob = store
            .get(&layout::sealed_secret_key(&alice()))
            .await
            .unwrap()
            .unwrap();
        store
            .put(&layout::sealed_secret_key(&bob), blob)
            .await
            .unwrap();
        assert!(keys.load(&bob).await.is_err());
    }
}
