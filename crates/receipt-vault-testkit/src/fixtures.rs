//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::ops::Deref;

use rand::rngs::StdRng;
use rand::SeedableRng;
use receipt_vault::{KeyPairService, ManualClock, Vault, VaultConfig};
use receipt_vault_core::{KeyPair, PrincipalId, SymmetricKey};
use receipt_vault_perms::MemoryGrantRegistry;
use receipt_vault_store::MemoryBlobStore;

/// 2026-01-01T00:00:00Z in Unix milliseconds.
pub const T0: i64 = 1_767_225_600_000;

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// The receipt used throughout the sharing scenario.
pub const RECEIPT_JSON: &[u8] = br#"{"merchant":"Acme","total":42.50}"#;

/// Wrap key used by every fixture vault.
pub const TEST_WRAP_KEY: [u8; 32] = [0x5a; 32];

pub type MemoryVault = Vault<MemoryBlobStore, MemoryGrantRegistry, ManualClock>;

/// Deterministic key pair for `name`.
pub fn keypair_from_seed(name: &str, seed: u64) -> KeyPair {
    let principal = PrincipalId::new(name).expect("fixture principal ids are valid");
    KeyPair::generate_with_rng(principal, &mut StdRng::seed_from_u64(seed))
        .expect("seeded rng does not fail")
}

/// One deterministic key pair per name, seeded by position.
pub fn multi_party_fixtures(names: &[&str]) -> Vec<KeyPair> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| keypair_from_seed(name, i as u64 + 1))
        .collect()
}

/// An in-memory vault with a manual clock starting at [`T0`].
pub struct TestVault {
    pub vault: MemoryVault,
    pub clock: ManualClock,
}

impl TestVault {
    pub fn new() -> Self {
        Self::with_config(VaultConfig::default())
    }

    pub fn with_config(config: VaultConfig) -> Self {
        let clock = ManualClock::new(T0);
        let vault = Vault::new(
            KeyPairService::new(MemoryBlobStore::new(), SymmetricKey::from_bytes(TEST_WRAP_KEY)),
            MemoryBlobStore::new(),
            MemoryGrantRegistry::new(),
            clock.clone(),
            config,
        );
        Self { vault, clock }
    }

    /// A vault with each named principal already registered.
    pub async fn with_principals(names: &[&str]) -> Self {
        let t = Self::new();
        for name in names {
            t.vault
                .register_principal(t.principal(name))
                .await
                .expect("fresh principal registers");
        }
        t
    }

    pub fn principal(&self, name: &str) -> PrincipalId {
        PrincipalId::new(name).expect("fixture principal ids are valid")
    }

    pub fn now(&self) -> i64 {
        self.vault.proxy().now()
    }

    pub fn advance(&self, millis: i64) {
        self.clock.advance(millis);
    }
}

impl Default for TestVault {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TestVault {
    type Target = MemoryVault;

    fn deref(&self) -> &Self::Target {
        &self.vault
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_keypairs_are_stable() {
        let a = keypair_from_seed("alice", 7);
        let b = keypair_from_seed("alice", 7);
        assert_eq!(a.public_key(), b.public_key());
        assert_ne!(keypair_from_seed("alice", 8).public_key(), a.public_key());
    }

    #[test]
    fn test_multi_party_distinct() {
        let parties = multi_party_fixtures(&["alice", "bob", "carol"]);
        assert_eq!(parties.len(), 3);
        assert_eq!(parties[1].principal_id().as_str(), "bob");
        assert_ne!(parties[0].public_key(), parties[1].public_key());
        assert_ne!(parties[1].public_key(), parties[2].public_key());
    }

    #[tokio::test]
    async fn test_vault_fixture() {
        let t = TestVault::with_principals(&["alice"]).await;
        assert_eq!(t.now(), T0);
        t.advance(DAY_MS);
        assert_eq!(t.now(), T0 + DAY_MS);

        let capsule_id = t.seal(&t.principal("alice"), RECEIPT_JSON).await.unwrap();
        assert_eq!(
            t.open_own(&t.principal("alice"), &capsule_id).await.unwrap(),
            RECEIPT_JSON
        );
    }
}
