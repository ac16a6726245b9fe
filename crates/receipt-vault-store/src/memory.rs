//! In-memory implementation of the BlobStore trait.
//!
//! Same semantics as SQLite, no persistence. Used by tests and by the
//! testkit fixtures.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::traits::{validate_key, BlobStore, InsertResult};

/// In-memory blob store. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryBlobStore {
    inner: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Bytes>>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Bytes>>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, blob: Bytes) -> Result<()> {
        validate_key(key)?;
        self.write()?.insert(key.to_string(), blob);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, blob: Bytes) -> Result<InsertResult> {
        validate_key(key)?;
        let mut inner = self.write()?;
        if inner.contains_key(key) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.insert(key.to_string(), blob);
        Ok(InsertResult::Inserted)
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.write()?.remove(key).is_some())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
