//! Domain-separated hashing.
//!
//! Every hash use has its own BLAKE3 derive-key context. Scalars are derived
//! from 64 bytes of XOF output reduced modulo the group order.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;

pub(crate) const CAPSULE_CHALLENGE: &str = "receipt-vault 2026-01 capsule challenge";
pub(crate) const REKEY_BLINDING: &str = "receipt-vault 2026-01 re-encryption key blinding";
pub(crate) const DATA_KEY: &str = "receipt-vault 2026-01 data key";
pub(crate) const CAPSULE_ID: &str = "receipt-vault 2026-01 capsule id";
pub(crate) const FRAGMENT_ID: &str = "receipt-vault 2026-01 fragment id";

/// Incremental hasher bound to one context.
pub(crate) struct Transcript(blake3::Hasher);

impl Transcript {
    pub(crate) fn new(context: &str) -> Self {
        Self(blake3::Hasher::new_derive_key(context))
    }

    pub(crate) fn point(mut self, point: &RistrettoPoint) -> Self {
        self.0.update(point.compress().as_bytes());
        self
    }

    pub(crate) fn scalar(mut self, scalar: &Scalar) -> Self {
        self.0.update(scalar.as_bytes());
        self
    }

    pub(crate) fn bytes(mut self, bytes: &[u8]) -> Self {
        self.0.update(bytes);
        self
    }

    /// Length-prefixed variable input.
    pub(crate) fn field(mut self, bytes: &[u8]) -> Self {
        self.0.update(&(bytes.len() as u64).to_le_bytes());
        self.0.update(bytes);
        self
    }

    pub(crate) fn digest(self) -> [u8; 32] {
        *self.0.finalize().as_bytes()
    }

    pub(crate) fn to_scalar(self) -> Scalar {
        let mut wide = [0u8; 64];
        self.0.finalize_xof().fill(&mut wide);
        Scalar::from_bytes_mod_order_wide(&wide)
    }
}

pub(crate) fn hash_to_scalar(context: &str, points: &[&RistrettoPoint]) -> Scalar {
    points
        .iter()
        .fold(Transcript::new(context), |t, p| t.point(p))
        .to_scalar()
}
