//! The proxy transform.
//!
//! Pure and synchronous. Policy checks (revocation, expiry, ownership) live
//! with whoever holds the grant registry; this only does the group math.

use crate::capsule::{Capsule, TransformedCapsule};
use crate::error::{CoreError, Result};
use crate::rekey::ReEncryptionKeyFragment;

/// Re-encapsulate an original capsule under a fragment: `E' = rk·E`,
/// `V' = rk·V`.
///
/// Single hop only. Transformed capsules and capsules that fail their
/// validity check are rejected with [`CoreError::InvalidCapsule`].
pub fn re_encapsulate(capsule: &Capsule, fragment: &ReEncryptionKeyFragment) -> Result<Capsule> {
    let original = match capsule {
        Capsule::Original(c) => c,
        Capsule::Transformed(_) => {
            return Err(CoreError::InvalidCapsule(
                "capsule has already been re-encrypted".into(),
            ))
        }
    };
    if !original.verify() {
        return Err(CoreError::InvalidCapsule("capsule failed its validity check".into()));
    }

    let rk = fragment.rekey();
    Ok(Capsule::Transformed(TransformedCapsule {
        original: original.clone(),
        point_e1: original.point_e * rk,
        point_v1: original.point_v * rk,
        precursor: *fragment.precursor(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypt::Encryptor;
    use crate::keys::KeyPair;
    use crate::rekey::generate_fragment;
    use crate::types::PrincipalId;
    use curve25519_dalek::scalar::Scalar;

    fn setup() -> (Capsule, ReEncryptionKeyFragment) {
        let alice = KeyPair::generate(PrincipalId::new("alice").unwrap()).unwrap();
        let bob = KeyPair::generate(PrincipalId::new("bob").unwrap()).unwrap();
        let (capsule, _) = Encryptor::default().encrypt(b"data", alice.public_key()).unwrap();
        let frag = generate_fragment(
            alice.principal_id(),
            alice.secret_key(),
            alice.public_key(),
            bob.public_key(),
            None,
        )
        .unwrap();
        (capsule, frag)
    }

    #[test]
    fn test_transform_keeps_capsule_id() {
        let (capsule, frag) = setup();
        let transformed = re_encapsulate(&capsule, &frag).unwrap();
        assert!(transformed.is_transformed());
        assert_eq!(transformed.id(), capsule.id());
    }

    #[test]
    fn test_single_hop() {
        let (capsule, frag) = setup();
        let transformed = re_encapsulate(&capsule, &frag).unwrap();
        assert!(matches!(
            re_encapsulate(&transformed, &frag),
            Err(CoreError::InvalidCapsule(_))
        ));
    }

    #[test]
    fn test_rejects_tampered_capsule() {
        let (capsule, frag) = setup();
        let Capsule::Original(mut original) = capsule else {
            panic!("expected original capsule");
        };
        original.signature += Scalar::ONE;
        assert!(matches!(
            re_encapsulate(&Capsule::Original(original), &frag),
            Err(CoreError::InvalidCapsule(_))
        ));
    }
}
