//! Capsules: the encapsulated data key.
//!
//! An [`OriginalCapsule`] is produced by encryption and is bound to the
//! owner's public key. A proxy holding a re-encryption key fragment derives a
//! [`TransformedCapsule`] from it that only the fragment's recipient can open.
//! Neither form is ever modified in place.

use std::fmt;
use std::str::FromStr;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;

use crate::codec::CapsuleCodec;
use crate::error::{DecodeError, Result};
use crate::hashing::{hash_to_scalar, Transcript, CAPSULE_CHALLENGE, CAPSULE_ID, REKEY_BLINDING};
use crate::keys::{random_scalar, PublicKey, SecretKey};
use crate::types::CapsuleId;

/// Capsule produced at encryption time: `(E, V, s)` with `s·G = V + h·E`.
#[derive(Clone, PartialEq, Eq)]
pub struct OriginalCapsule {
    pub(crate) point_e: RistrettoPoint,
    pub(crate) point_v: RistrettoPoint,
    pub(crate) signature: Scalar,
}

impl OriginalCapsule {
    /// Encapsulate a fresh shared point for `recipient`.
    ///
    /// Returns the capsule and the shared point `(r + u)·A` from which the
    /// data key is derived.
    pub(crate) fn encapsulate<R: RngCore + CryptoRng>(
        recipient: &PublicKey,
        rng: &mut R,
    ) -> Result<(Self, RistrettoPoint)> {
        let r = random_scalar(rng)?;
        let u = random_scalar(rng)?;
        let point_e = RistrettoPoint::mul_base(&r);
        let point_v = RistrettoPoint::mul_base(&u);
        let h = hash_to_scalar(CAPSULE_CHALLENGE, &[&point_e, &point_v]);
        let capsule = Self {
            point_e,
            point_v,
            signature: u + r * h,
        };
        let shared = recipient.point() * (r + u);
        Ok((capsule, shared))
    }

    /// Check the capsule's internal consistency.
    pub fn verify(&self) -> bool {
        let h = hash_to_scalar(CAPSULE_CHALLENGE, &[&self.point_e, &self.point_v]);
        let lhs = RistrettoPoint::mul_base(&self.signature);
        let rhs = self.point_v + self.point_e * h;
        lhs.compress().ct_eq(&rhs.compress()).into()
    }

    pub fn id(&self) -> CapsuleId {
        CapsuleId::from_bytes(
            Transcript::new(CAPSULE_ID)
                .point(&self.point_e)
                .point(&self.point_v)
                .scalar(&self.signature)
                .digest(),
        )
    }

    /// Recover the shared point with the owner's secret key: `a·(E + V)`.
    pub(crate) fn open(&self, owner: &SecretKey) -> RistrettoPoint {
        (self.point_e + self.point_v) * owner.scalar()
    }
}

impl fmt::Debug for OriginalCapsule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OriginalCapsule({})", self.id())
    }
}

/// Capsule re-encrypted by a proxy: `(E', V', X)` over an original.
#[derive(Clone, PartialEq, Eq)]
pub struct TransformedCapsule {
    pub(crate) original: OriginalCapsule,
    pub(crate) point_e1: RistrettoPoint,
    pub(crate) point_v1: RistrettoPoint,
    pub(crate) precursor: RistrettoPoint,
}

impl TransformedCapsule {
    pub fn original(&self) -> &OriginalCapsule {
        &self.original
    }

    /// Recover the shared point with the recipient's secret key.
    ///
    /// `d = H(X, B, b·X)` undoes the blinding in the re-encryption key, so
    /// `d·(E' + V')` equals the owner's `a·(E + V)`.
    pub(crate) fn open(&self, recipient: &SecretKey) -> RistrettoPoint {
        let recipient_point = RistrettoPoint::mul_base(recipient.scalar());
        let dh = self.precursor * recipient.scalar();
        let d = hash_to_scalar(REKEY_BLINDING, &[&self.precursor, &recipient_point, &dh]);
        (self.point_e1 + self.point_v1) * d
    }
}

impl fmt::Debug for TransformedCapsule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransformedCapsule({})", self.original.id())
    }
}

/// Either form of capsule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capsule {
    Original(OriginalCapsule),
    Transformed(TransformedCapsule),
}

impl Capsule {
    /// Id of the original capsule, shared by both forms.
    pub fn id(&self) -> CapsuleId {
        self.original().id()
    }

    pub fn original(&self) -> &OriginalCapsule {
        match self {
            Capsule::Original(c) => c,
            Capsule::Transformed(t) => &t.original,
        }
    }

    pub fn is_transformed(&self) -> bool {
        matches!(self, Capsule::Transformed(_))
    }

    /// Serialize to the versioned wire string.
    pub fn to_wire(&self) -> String {
        CapsuleCodec::serialize(self)
    }

    pub fn from_wire(s: &str) -> std::result::Result<Self, DecodeError> {
        CapsuleCodec::deserialize(s)
    }
}

impl fmt::Display for Capsule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl FromStr for Capsule {
    type Err = DecodeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_wire(s)
    }
}

impl From<OriginalCapsule> for Capsule {
    fn from(c: OriginalCapsule) -> Self {
        Capsule::Original(c)
    }
}

impl From<TransformedCapsule> for Capsule {
    fn from(t: TransformedCapsule) -> Self {
        Capsule::Transformed(t)
    }
}
