//! # Receipt Vault Store
//!
//! Opaque blob storage for Receipt Vault.
//!
//! ## Overview
//!
//! Capsules, ciphertexts, re-encryption key fragments and sealed key
//! material are persisted as opaque blobs behind the [`BlobStore`] trait. The
//! primary implementation is [`SqliteBlobStore`], with [`MemoryBlobStore`]
//! for tests. Nothing stored here is readable without the right key: secret
//! keys are sealed before they arrive.
//!
//! ## Key Types
//!
//! - [`BlobStore`] - The async trait for all storage operations
//! - [`BlobStoreExt`] - Convenience helpers such as `get_required`
//! - [`SqliteBlobStore`] - SQLite-based persistent storage
//! - [`MemoryBlobStore`] - In-memory storage for tests
//! - [`layout`] - The key naming scheme
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use receipt_vault_store::{BlobStore, SqliteBlobStore};
//!
//! async fn example() {
//!     let store = SqliteBlobStore::open("vault.db").unwrap();
//!     store.put("capsule/00", Bytes::from_static(b"v1:...")).await.unwrap();
//!     let blob = store.get("capsule/00").await.unwrap();
//! }
//! ```

pub mod error;
pub mod layout;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryBlobStore;
pub use sqlite::SqliteBlobStore;
pub use traits::{BlobStore, BlobStoreExt, InsertResult, MAX_KEY_LEN};
