//! Proptest generators for property-based testing.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use receipt_vault_core::{CapsuleId, FragmentId, KeyPair, PrincipalId};

/// Generate a valid principal id.
pub fn principal_id() -> impl Strategy<Value = PrincipalId> {
    "[a-z][a-z0-9_.@-]{0,31}".prop_map(|s| PrincipalId::new(s).expect("pattern yields valid ids"))
}

/// Generate a key pair from a random seed.
pub fn keypair() -> impl Strategy<Value = KeyPair> {
    (principal_id(), any::<u64>()).prop_map(|(principal, seed)| {
        KeyPair::generate_with_rng(principal, &mut StdRng::seed_from_u64(seed))
            .expect("seeded rng does not fail")
    })
}

/// Generate two key pairs with distinct principals.
pub fn keypair_pair() -> impl Strategy<Value = (KeyPair, KeyPair)> {
    (any::<u64>(), any::<u64>()).prop_map(|(a, b)| {
        let mut rng = StdRng::seed_from_u64(a ^ b.rotate_left(17));
        let owner = PrincipalId::new("owner").expect("valid id");
        let recipient = PrincipalId::new("recipient").expect("valid id");
        (
            KeyPair::generate_with_rng(owner, &mut rng).expect("seeded rng does not fail"),
            KeyPair::generate_with_rng(recipient, &mut rng).expect("seeded rng does not fail"),
        )
    })
}

pub fn capsule_id() -> impl Strategy<Value = CapsuleId> {
    any::<[u8; 32]>().prop_map(CapsuleId::from_bytes)
}

pub fn fragment_id() -> impl Strategy<Value = FragmentId> {
    any::<[u8; 32]>().prop_map(FragmentId::from_bytes)
}

/// Generate plaintext bytes of at most `max_len`.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a JSON receipt body.
pub fn receipt_json() -> impl Strategy<Value = Vec<u8>> {
    ("[A-Za-z ]{1,24}", 0u32..1_000_000).prop_map(|(merchant, cents)| {
        format!(
            r#"{{"merchant":"{}","total":{}.{:02}}}"#,
            merchant.trim(),
            cents / 100,
            cents % 100
        )
        .into_bytes()
    })
}

/// Generate an optional expiry relative to `now`: none, past or future.
pub fn valid_until(now: i64) -> impl Strategy<Value = Option<i64>> {
    prop_oneof![
        Just(None),
        (1i64..1_000_000).prop_map(move |d| Some(now - d)),
        (1i64..1_000_000).prop_map(move |d| Some(now + d)),
    ]
}

/// Generate arbitrary strings shaped like capsule wire strings.
pub fn wire_like() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<String>(),
        "v[0-9]:[A-Za-z0-9_-]{0,60}:[A-Za-z0-9_-]{0,220}",
        "v1:[A-Za-z0-9_=+/-]{40,48}:[A-Za-z0-9_=+/-]{80,90}",
    ]
}
