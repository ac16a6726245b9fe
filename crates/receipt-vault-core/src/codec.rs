//! Capsule wire format.
//!
//! ```text
//! v1:<base64url(kind || s)>:<base64url(ephemeral points)>
//! ```
//!
//! `kind` is `0x01` for an original capsule, whose ephemeral segment is
//! `E || V`, and `0x02` for a transformed one, carrying
//! `E || V || E' || V' || X`. Points are compressed Ristretto, scalars are
//! canonical little-endian. Base64 is URL-safe without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use curve25519_dalek::ristretto::RistrettoPoint;

use crate::capsule::{Capsule, OriginalCapsule, TransformedCapsule};
use crate::error::DecodeError;
use crate::keys::{decode_point, decode_scalar};

/// Current wire version tag.
pub const WIRE_VERSION: &str = "v1";

const KIND_ORIGINAL: u8 = 0x01;
const KIND_TRANSFORMED: u8 = 0x02;
const PARAMS_LEN: usize = 1 + 32;
const ORIGINAL_POINTS: usize = 2;
const TRANSFORMED_POINTS: usize = 5;

/// Serializes capsules to and from their wire string.
pub struct CapsuleCodec;

impl CapsuleCodec {
    pub fn serialize(capsule: &Capsule) -> String {
        let original = capsule.original();
        let (kind, points): (u8, Vec<&RistrettoPoint>) = match capsule {
            Capsule::Original(c) => (KIND_ORIGINAL, vec![&c.point_e, &c.point_v]),
            Capsule::Transformed(t) => (
                KIND_TRANSFORMED,
                vec![
                    &t.original.point_e,
                    &t.original.point_v,
                    &t.point_e1,
                    &t.point_v1,
                    &t.precursor,
                ],
            ),
        };

        let mut params = Vec::with_capacity(PARAMS_LEN);
        params.push(kind);
        params.extend_from_slice(original.signature.as_bytes());

        let mut ephemeral = Vec::with_capacity(points.len() * 32);
        for point in points {
            ephemeral.extend_from_slice(point.compress().as_bytes());
        }

        format!(
            "{}:{}:{}",
            WIRE_VERSION,
            URL_SAFE_NO_PAD.encode(params),
            URL_SAFE_NO_PAD.encode(ephemeral)
        )
    }

    pub fn deserialize(s: &str) -> Result<Capsule, DecodeError> {
        let segments: Vec<&str> = s.split(':').collect();
        if segments.len() < 2 {
            return Err(DecodeError::Segments {
                expected: 3,
                found: segments.len(),
            });
        }
        if segments[0] != WIRE_VERSION {
            return Err(DecodeError::UnsupportedVersion(segments[0].to_string()));
        }
        if segments.len() != 3 {
            return Err(DecodeError::Segments {
                expected: 3,
                found: segments.len(),
            });
        }

        let params = URL_SAFE_NO_PAD
            .decode(segments[1])
            .map_err(|_| DecodeError::Base64("scheme parameters"))?;
        let ephemeral = URL_SAFE_NO_PAD
            .decode(segments[2])
            .map_err(|_| DecodeError::Base64("ephemeral material"))?;

        if params.len() != PARAMS_LEN {
            return Err(DecodeError::Length {
                what: "scheme parameters",
                expected: PARAMS_LEN,
                actual: params.len(),
            });
        }
        let kind = params[0];
        let point_count = match kind {
            KIND_ORIGINAL => ORIGINAL_POINTS,
            KIND_TRANSFORMED => TRANSFORMED_POINTS,
            other => return Err(DecodeError::UnknownKind(other)),
        };
        let signature = decode_scalar(&to_array(&params[1..]), "s")?;

        if ephemeral.len() != point_count * 32 {
            return Err(DecodeError::Length {
                what: "ephemeral material",
                expected: point_count * 32,
                actual: ephemeral.len(),
            });
        }
        const NAMES: [&str; TRANSFORMED_POINTS] = ["E", "V", "E'", "V'", "X"];
        let points = ephemeral
            .chunks_exact(32)
            .zip(NAMES)
            .map(|(chunk, name)| decode_point(&to_array(chunk), name))
            .collect::<Result<Vec<_>, _>>()?;

        let original = OriginalCapsule {
            point_e: points[0],
            point_v: points[1],
            signature,
        };
        Ok(match kind {
            KIND_ORIGINAL => Capsule::Original(original),
            _ => Capsule::Transformed(TransformedCapsule {
                original,
                point_e1: points[2],
                point_v1: points[3],
                precursor: points[4],
            }),
        })
    }
}

fn to_array(slice: &[u8]) -> [u8; 32] {
    let mut arr = [0u8; 32];
    arr.copy_from_slice(slice);
    arr
}
