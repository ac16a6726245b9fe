//! Capsule wire-format vectors.
//!
//! Each [`WireVector`] is a malformed wire string together with the exact
//! [`DecodeError`] a conforming decoder returns for it. The vectors are
//! derived from a capsule built with a fixed seed, so they are stable across
//! runs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::StdRng;
use rand::SeedableRng;

use receipt_vault_core::{
    generate_fragment_with_rng, re_encapsulate, CapsuleCodec, DecodeError, Encryptor,
};

use crate::fixtures::{keypair_from_seed, RECEIPT_JSON};

/// A malformed wire string and the error it must produce.
#[derive(Debug, Clone)]
pub struct WireVector {
    pub name: &'static str,
    pub input: String,
    pub expected: DecodeError,
}

/// Wire strings of a deterministic original capsule and its transform.
pub fn valid_wire() -> (String, String) {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let owner = keypair_from_seed("alice", 1);
    let recipient = keypair_from_seed("bob", 2);

    let (capsule, _) = Encryptor::default()
        .encrypt_with_rng(RECEIPT_JSON, owner.public_key(), &mut rng)
        .expect("fixture encrypts");
    let fragment = generate_fragment_with_rng(
        owner.principal_id(),
        owner.secret_key(),
        owner.public_key(),
        recipient.public_key(),
        None,
        &mut rng,
    )
    .expect("fixture fragment");
    let transformed = re_encapsulate(&capsule, &fragment).expect("fixture transform");

    (
        CapsuleCodec::serialize(&capsule),
        CapsuleCodec::serialize(&transformed),
    )
}

fn segments(wire: &str) -> (Vec<u8>, Vec<u8>) {
    let parts: Vec<&str> = wire.split(':').collect();
    let decode = |s: &str| URL_SAFE_NO_PAD.decode(s).expect("fixture wire is valid");
    (decode(parts[1]), decode(parts[2]))
}

fn assemble(params: &[u8], ephemeral: &[u8]) -> String {
    format!(
        "v1:{}:{}",
        URL_SAFE_NO_PAD.encode(params),
        URL_SAFE_NO_PAD.encode(ephemeral)
    )
}

/// All malformed vectors.
pub fn malformed_vectors() -> Vec<WireVector> {
    let (original, transformed) = valid_wire();
    let (params, ephemeral) = segments(&original);
    let (t_params, t_ephemeral) = segments(&transformed);
    let parts: Vec<&str> = original.split(':').collect();
    let (p64, e64) = (parts[1], parts[2]);

    let with_kind = |kind: u8| {
        let mut p = params.clone();
        p[0] = kind;
        p
    };
    let with_point = |eph: &[u8], index: usize| {
        let mut e = eph.to_vec();
        e[index * 32..(index + 1) * 32].copy_from_slice(&[0xff; 32]);
        e
    };
    let mut bad_scalar = params.clone();
    bad_scalar[1..].copy_from_slice(&[0xff; 32]);

    vec![
        WireVector {
            name: "empty string",
            input: String::new(),
            expected: DecodeError::Segments { expected: 3, found: 1 },
        },
        WireVector {
            name: "unknown version",
            input: format!("v2:{p64}:{e64}"),
            expected: DecodeError::UnsupportedVersion("v2".into()),
        },
        WireVector {
            name: "version is case sensitive",
            input: format!("V1:{p64}:{e64}"),
            expected: DecodeError::UnsupportedVersion("V1".into()),
        },
        WireVector {
            name: "missing ephemeral segment",
            input: format!("v1:{p64}"),
            expected: DecodeError::Segments { expected: 3, found: 2 },
        },
        WireVector {
            name: "trailing segment",
            input: format!("{original}:"),
            expected: DecodeError::Segments { expected: 3, found: 4 },
        },
        WireVector {
            name: "padded base64",
            input: format!("v1:{p64}=:{e64}"),
            expected: DecodeError::Base64("scheme parameters"),
        },
        WireVector {
            name: "non-url-safe base64",
            input: format!("v1:{p64}:{e64}+/"),
            expected: DecodeError::Base64("ephemeral material"),
        },
        WireVector {
            name: "truncated scheme parameters",
            input: assemble(&params[..32], &ephemeral),
            expected: DecodeError::Length {
                what: "scheme parameters",
                expected: 33,
                actual: 32,
            },
        },
        WireVector {
            name: "unknown kind",
            input: assemble(&with_kind(0x03), &ephemeral),
            expected: DecodeError::UnknownKind(0x03),
        },
        WireVector {
            name: "non-canonical scalar",
            input: assemble(&bad_scalar, &ephemeral),
            expected: DecodeError::InvalidScalar("s"),
        },
        WireVector {
            name: "truncated ephemeral material",
            input: assemble(&params, &ephemeral[..40]),
            expected: DecodeError::Length {
                what: "ephemeral material",
                expected: 64,
                actual: 40,
            },
        },
        WireVector {
            name: "transformed kind with original points",
            input: assemble(&with_kind(0x02), &ephemeral),
            expected: DecodeError::Length {
                what: "ephemeral material",
                expected: 160,
                actual: 64,
            },
        },
        WireVector {
            name: "invalid point E",
            input: assemble(&params, &with_point(&ephemeral, 0)),
            expected: DecodeError::InvalidPoint("E"),
        },
        WireVector {
            name: "invalid point V",
            input: assemble(&params, &with_point(&ephemeral, 1)),
            expected: DecodeError::InvalidPoint("V"),
        },
        WireVector {
            name: "invalid precursor X",
            input: assemble(&t_params, &with_point(&t_ephemeral, 4)),
            expected: DecodeError::InvalidPoint("X"),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::wire_like;
    use proptest::prelude::*;
    use receipt_vault_core::Capsule;

    #[test]
    fn test_valid_wire_decodes() {
        let (original, transformed) = valid_wire();
        assert!(matches!(
            CapsuleCodec::deserialize(&original),
            Ok(Capsule::Original(_))
        ));
        let decoded = CapsuleCodec::deserialize(&transformed).unwrap();
        assert!(decoded.is_transformed());
        assert_eq!(CapsuleCodec::serialize(&decoded), transformed);
    }

    #[test]
    fn test_valid_wire_is_deterministic() {
        assert_eq!(valid_wire(), valid_wire());
    }

    #[test]
    fn test_all_vectors_rejected() {
        for vector in malformed_vectors() {
            assert_eq!(
                CapsuleCodec::deserialize(&vector.input),
                Err(vector.expected.clone()),
                "vector: {}",
                vector.name
            );
        }
    }

    proptest! {
        #[test]
        fn arbitrary_wire_never_panics(wire in wire_like()) {
            if let Ok(capsule) = CapsuleCodec::deserialize(&wire) {
                let canonical = CapsuleCodec::serialize(&capsule);
                prop_assert_eq!(CapsuleCodec::deserialize(&canonical), Ok(capsule));
            }
        }
    }
}
