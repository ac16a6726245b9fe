//! # Receipt Vault Perms
//!
//! The access grant registry consulted by the re-encryption proxy.
//!
//! ## Overview
//!
//! The registry records which principal owns each capsule, which
//! re-encryption key fragments were granted for it, and which of those have
//! been revoked. It holds no key material: only fragment ids, issuers,
//! recipients and validity windows.
//!
//! - [`AccessGrantRegistry`] - The trait the proxy is written against
//! - [`MemoryGrantRegistry`] - RwLock-backed, parallel reads
//! - [`SqliteGrantRegistry`] - Persistent, rusqlite
//! - [`ShareState`] - `OwnerOnly`, `Shared` or `Revoked` per capsule
//! - [`DenyReason`] - Why a transform was refused
//!
//! ## Usage
//!
//! ```rust,no_run
//! use receipt_vault_core::{CapsuleId, KeyPair, PrincipalId};
//! use receipt_vault_perms::{AccessGrantRegistry, MemoryGrantRegistry};
//!
//! let registry = MemoryGrantRegistry::new();
//! let capsule = CapsuleId::from_bytes([0; 32]);
//! let alice = KeyPair::generate(PrincipalId::new("alice").unwrap()).unwrap();
//! registry.register_capsule(capsule, alice.principal_id(), alice.public_key(), 0).unwrap();
//! // registry.record_grant(capsule, &fragment, now)?;
//! // registry.authorize(&capsule, &fragment_id, now, |record| ...)?;
//! ```

pub mod error;
pub mod grant;
pub mod memory;
pub mod migration;
pub mod registry;
pub mod sqlite;
pub mod state;

pub use error::{PermsError, Result};
pub use grant::{AccessGrant, CapsuleRecord, DenyReason, FragmentRecord};
pub use memory::MemoryGrantRegistry;
pub use registry::AccessGrantRegistry;
pub use sqlite::SqliteGrantRegistry;
pub use state::ShareState;
