//! # Receipt Vault Core
//!
//! Cryptographic core for Receipt Vault: single-hop proxy re-encryption of
//! receipt data over the Ristretto group.
//!
//! ## Overview
//!
//! A data owner encrypts a receipt under their own public key, producing a
//! [`Capsule`] (the encapsulated data key) and a [`Ciphertext`]. To share it,
//! the owner generates a [`ReEncryptionKeyFragment`] for a recipient. A proxy
//! holding the fragment transforms the capsule with [`re_encapsulate`]; the
//! recipient then opens it with [`decrypt`] and their own secret key. The
//! proxy never sees plaintext or either party's secret key.
//!
//! Everything in this crate is pure and synchronous. Policy (who may
//! transform what, and until when) lives in `receipt-vault-perms` and the
//! `receipt-vault` facade.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use receipt_vault_core::{
//!     decrypt, generate_fragment, re_encapsulate, Encryptor, KeyPair, PrincipalId,
//! };
//!
//! let alice = KeyPair::generate(PrincipalId::new("alice").unwrap()).unwrap();
//! let bob = KeyPair::generate(PrincipalId::new("bob").unwrap()).unwrap();
//!
//! let (capsule, ciphertext) = Encryptor::default()
//!     .encrypt(br#"{"merchant":"Acme","total":42.50}"#, alice.public_key())
//!     .unwrap();
//!
//! let fragment = generate_fragment(
//!     alice.principal_id(),
//!     alice.secret_key(),
//!     alice.public_key(),
//!     bob.public_key(),
//!     None,
//! )
//! .unwrap();
//!
//! let transformed = re_encapsulate(&capsule, &fragment).unwrap();
//! let plaintext = decrypt(&transformed, &ciphertext, bob.secret_key()).unwrap();
//! ```

pub mod capsule;
pub mod codec;
pub mod decrypt;
pub mod dem;
pub mod encrypt;
pub mod error;
mod hashing;
pub mod keys;
pub mod reencrypt;
pub mod rekey;
pub mod types;

pub use capsule::{Capsule, OriginalCapsule, TransformedCapsule};
pub use codec::{CapsuleCodec, WIRE_VERSION};
pub use decrypt::decrypt;
pub use dem::{Ciphertext, SymmetricKey};
pub use encrypt::{Encryptor, DEFAULT_MAX_PLAINTEXT};
pub use error::{CoreError, DecodeError, DecryptionFailure, Result};
pub use keys::{KeyPair, PublicKey, SealedSecretKey, SecretKey};
pub use reencrypt::re_encapsulate;
pub use rekey::{generate_fragment, generate_fragment_with_rng, ReEncryptionKeyFragment};
pub use types::{CapsuleId, FragmentId, PrincipalId};
