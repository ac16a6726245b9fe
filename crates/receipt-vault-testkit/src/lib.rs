//! # Receipt Vault Testkit
//!
//! Testing utilities for Receipt Vault.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: deterministic key pairs and an in-memory vault driven by a
//!   manual clock
//! - **Generators**: Proptest strategies for property-based testing
//! - **Vectors**: malformed capsule wire strings with the error each must
//!   produce
//!
//! ## Wire Vectors
//!
//! ```rust
//! use receipt_vault_core::CapsuleCodec;
//! use receipt_vault_testkit::vectors::malformed_vectors;
//!
//! for vector in malformed_vectors() {
//!     assert_eq!(CapsuleCodec::deserialize(&vector.input), Err(vector.expected));
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use receipt_vault_testkit::generators::{keypair, plaintext};
//!
//! proptest! {
//!     #[test]
//!     fn owner_can_open(kp in keypair(), data in plaintext(256)) {
//!         // ...
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use receipt_vault_testkit::fixtures::{TestVault, RECEIPT_JSON};
//!
//! async fn example() {
//!     let t = TestVault::with_principals(&["alice", "bob"]).await;
//!     let capsule_id = t.seal(&t.principal("alice"), RECEIPT_JSON).await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{keypair_from_seed, multi_party_fixtures, TestVault, RECEIPT_JSON};
pub use vectors::{malformed_vectors, valid_wire, WireVector};
