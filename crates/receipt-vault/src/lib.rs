//! # Receipt Vault
//!
//! Encrypted receipts that their owners can share, time-limit and revoke
//! without ever decrypting them on a server.
//!
//! ## Overview
//!
//! Receipts are encrypted on the owner's device under the owner's public
//! key. To share one, the owner generates a re-encryption key fragment for
//! the recipient and hands it to an untrusted proxy. The proxy transforms
//! the capsule so that only the recipient's private key opens it, and checks
//! every transform against an access grant registry so that revocation and
//! expiry take effect immediately.
//!
//! - **Capsule**: encapsulated data key, versioned wire string
//! - **Ciphertext**: ChaCha20-Poly1305 payload bound to one capsule
//! - **Fragment**: proxy re-encryption key from one owner to one recipient
//! - **Grant**: registry link between a capsule and a fragment
//!
//! ## Usage
//!
//! ```rust,no_run
//! use receipt_vault::{Vault, VaultConfig};
//! use receipt_vault::core::{PrincipalId, SymmetricKey};
//!
//! async fn example() -> receipt_vault::Result<()> {
//!     let vault = Vault::open_sqlite(VaultConfig::default(), SymmetricKey::from_bytes([0; 32]))?;
//!
//!     let alice = PrincipalId::new("alice")?;
//!     let bob = PrincipalId::new("bob")?;
//!     vault.register_principal(alice.clone()).await?;
//!     vault.register_principal(bob.clone()).await?;
//!
//!     let capsule_id = vault.seal(&alice, br#"{"merchant":"Acme","total":42.50}"#).await?;
//!     let fragment_id = vault.grant_access(&alice, capsule_id, &bob, None).await?;
//!
//!     let receipt = vault.open_shared(&bob, &capsule_id, &fragment_id).await?;
//!     vault.revoke_access(&fragment_id).await?;
//!     # let _ = receipt;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `receipt_vault::core` - Keys, capsules, codec, encryption
//! - `receipt_vault::store` - Blob storage
//! - `receipt_vault::perms` - Grant registry

pub mod clock;
pub mod config;
pub mod error;
pub mod keys;
pub mod proxy;
pub mod vault;

pub use receipt_vault_core as core;
pub use receipt_vault_perms as perms;
pub use receipt_vault_store as store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::VaultConfig;
pub use error::{ErrorKind, Result, VaultError};
pub use keys::KeyPairService;
pub use proxy::ProxyReEncryptor;
pub use vault::{OwnershipTransfer, Vault};

pub use receipt_vault_core::{
    Capsule, CapsuleCodec, CapsuleId, Ciphertext, FragmentId, KeyPair, PrincipalId, PublicKey,
    ReEncryptionKeyFragment,
};
pub use receipt_vault_perms::{AccessGrantRegistry, DenyReason, ShareState};
