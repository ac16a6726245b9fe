//! SQLite implementation of the BlobStore trait.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{validate_key, BlobStore, InsertResult};

/// SQLite-backed blob store.
///
/// Thread-safe via an internal mutex. Every operation runs on the blocking
/// pool.
#[derive(Clone)]
pub struct SqliteBlobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBlobStore {
    /// Open a database at `path`, creating and migrating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(format!("sqlite connection: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn put(&self, key: &str, blob: Bytes) -> Result<()> {
        validate_key(key)?;
        let key = key.to_string();
        self.run(move |conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO blobs (key, value, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, blob.as_ref(), now],
            )?;
            Ok(())
        })
        .await
    }

    async fn put_if_absent(&self, key: &str, blob: Bytes) -> Result<InsertResult> {
        validate_key(key)?;
        let key = key.to_string();
        self.run(move |conn| {
            let now = now_millis();
            let changed = conn.execute(
                "INSERT OR IGNORE INTO blobs (key, value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![key, blob.as_ref(), now],
            )?;
            Ok(if changed == 0 {
                InsertResult::AlreadyExists
            } else {
                InsertResult::Inserted
            })
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let key = key.to_string();
        self.run(move |conn| {
            let value: Option<Vec<u8>> = conn
                .query_row("SELECT value FROM blobs WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value.map(Bytes::from))
        })
        .await
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.run(move |conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM blobs WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.run(move |conn| {
            let removed = conn.execute("DELETE FROM blobs WHERE key = ?1", params![key])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.to_string();
        self.run(move |conn| {
            // substr comparison avoids LIKE wildcard escaping
            let mut stmt = conn.prepare(
                "SELECT key FROM blobs WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
            )?;
            let keys = stmt
                .query_map(params![prefix], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(keys)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::BlobStoreExt;

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let store = SqliteBlobStore::open_memory().unwrap();
        store.put("k", Bytes::from_static(b"one")).await.unwrap();
        store.put("k", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(store.get_required("k").await.unwrap(), Bytes::from_static(b"two"));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_if_absent() {
        let store = SqliteBlobStore::open_memory().unwrap();
        assert_eq!(
            store.put_if_absent("k", Bytes::from_static(b"a")).await.unwrap(),
            InsertResult::Inserted
        );
        assert_eq!(
            store.put_if_absent("k", Bytes::from_static(b"b")).await.unwrap(),
            InsertResult::AlreadyExists
        );
        assert_eq!(store.get_required("k").await.unwrap(), Bytes::from_static(b"a"));
    }

    #[tokio::test]
    async fn test_list_prefix_ignores_wildcards() {
        let store = SqliteBlobStore::open_memory().unwrap();
        for key in ["a%/1", "a%/2", "ab/3", "b/4"] {
            store.put(key, Bytes::new()).await.unwrap();
        }
        assert_eq!(
            store.list_prefix("a%/").await.unwrap(),
            vec!["a%/1".to_string(), "a%/2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_and_contains() {
        let store = SqliteBlobStore::open_memory().unwrap();
        store.put("k", Bytes::from_static(b"v")).await.unwrap();
        assert!(store.contains("k").await.unwrap());
        assert!(store.delete("k").await.unwrap());
        assert!(!store.contains("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        {
            let store = SqliteBlobStore::open(&path).unwrap();
            store.put("k", Bytes::from_static(b"v")).await.unwrap();
        }
        let store = SqliteBlobStore::open(&path).unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
    }
}
