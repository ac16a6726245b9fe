//! Property tests over the full grant lifecycle.

use proptest::prelude::*;
use receipt_vault::DenyReason;
use receipt_vault_testkit::fixtures::TestVault;
use receipt_vault_testkit::generators::receipt_json;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn access_follows_validity_window(
        body in receipt_json(),
        ttl in 1i64..100_000,
        elapsed in 0i64..200_000,
    ) {
        runtime().block_on(async {
            let t = TestVault::with_principals(&["alice", "bob"]).await;
            let (alice, bob) = (t.principal("alice"), t.principal("bob"));
            let capsule_id = t.seal(&alice, &body).await.unwrap();
            let fragment_id = t
                .grant_access(&alice, capsule_id, &bob, Some(t.now() + ttl))
                .await
                .unwrap();

            t.advance(elapsed);
            let result = t.open_shared(&bob, &capsule_id, &fragment_id).await;
            if elapsed < ttl {
                assert_eq!(result.unwrap(), body);
            } else {
                assert_eq!(result.unwrap_err().deny_reason(), Some(DenyReason::Expired));
            }
        });
    }

    #[test]
    fn revoking_one_recipient_leaves_others(
        body in receipt_json(),
        revoke_index in 0usize..3,
    ) {
        runtime().block_on(async {
            let names = ["bob", "carol", "dave"];
            let t = TestVault::with_principals(&["alice", "bob", "carol", "dave"]).await;
            let alice = t.principal("alice");
            let capsule_id = t.seal(&alice, &body).await.unwrap();

            let mut fragments = Vec::new();
            for name in names {
                fragments.push(
                    t.grant_access(&alice, capsule_id, &t.principal(name), None)
                        .await
                        .unwrap(),
                );
            }
            t.revoke_access(&fragments[revoke_index]).await.unwrap();

            for (i, name) in names.iter().enumerate() {
                let result = t.open_shared(&t.principal(name), &capsule_id, &fragments[i]).await;
                if i == revoke_index {
                    assert_eq!(result.unwrap_err().deny_reason(), Some(DenyReason::Revoked));
                } else {
                    assert_eq!(result.unwrap(), body);
                }
            }
            assert!(t.share_state(&capsule_id).unwrap().is_shared());
        });
    }
}
