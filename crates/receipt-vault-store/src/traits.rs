//! BlobStore trait: the abstract interface for opaque blob persistence.
//!
//! Capsules, ciphertexts, fragments and key material all reach storage as
//! opaque byte blobs under string keys. See [`crate::layout`] for the key
//! scheme.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StoreError};

/// Longest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 512;

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Blob was stored.
    Inserted,
    /// A blob already exists under the key and was left untouched.
    AlreadyExists,
}

/// Async key-value interface for blobs.
///
/// All methods are async so SQLite can run on `spawn_blocking` and remote
/// backends can be added without touching callers.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `blob` under `key`, replacing any previous value.
    async fn put(&self, key: &str, blob: Bytes) -> Result<()>;

    /// Store `blob` only if `key` is vacant.
    async fn put_if_absent(&self, key: &str, blob: Bytes) -> Result<InsertResult>;

    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    async fn contains(&self, key: &str) -> Result<bool>;

    /// Remove a blob. Returns whether one was present.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List keys beginning with `prefix`, in lexicographic order.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Extension trait for common store patterns.
#[async_trait]
pub trait BlobStoreExt: BlobStore {
    /// Get a blob, turning absence into [`StoreError::NotFound`].
    async fn get_required(&self, key: &str) -> Result<Bytes> {
        self.get(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

impl<S: BlobStore + ?Sized> BlobStoreExt for S {}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("empty key".into()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(StoreError::InvalidKey(format!(
            "{} bytes exceeds maximum of {}",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    Ok(())
}
