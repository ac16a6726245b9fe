//! Re-encryption key fragments.
//!
//! A fragment lets a proxy turn capsules encrypted for the owner into
//! capsules the recipient can open. It is generated where the owner's secret
//! key lives and carries `rk = a·d⁻¹` together with the precursor `X = x·G`,
//! where `d = H(X, B, x·B)` can only be recomputed by the recipient.

use std::fmt;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{CoreError, DecodeError, Result};
use crate::hashing::{hash_to_scalar, Transcript, FRAGMENT_ID, REKEY_BLINDING};
use crate::keys::{random_scalar, PublicKey, SecretKey};
use crate::types::{FragmentId, PrincipalId};

/// Authorization for a proxy to re-encrypt the owner's capsules to one
/// recipient.
#[derive(Clone, Serialize, Deserialize)]
pub struct ReEncryptionKeyFragment {
    /// The owner who issued this fragment.
    pub from_principal: PrincipalId,
    pub from_public_key: PublicKey,
    /// The recipient able to open transformed capsules.
    pub to_public_key: PublicKey,
    rekey: Scalar,
    precursor: RistrettoPoint,
    /// Unix milliseconds after which the fragment is unusable.
    pub valid_until: Option<i64>,
    pub revoked: bool,
}

impl ReEncryptionKeyFragment {
    /// Content address over key material and validity window.
    pub fn id(&self) -> FragmentId {
        let mut validity = [0u8; 9];
        if let Some(until) = self.valid_until {
            validity[0] = 1;
            validity[1..].copy_from_slice(&until.to_le_bytes());
        }
        FragmentId::from_bytes(
            Transcript::new(FRAGMENT_ID)
                .field(self.from_principal.as_str().as_bytes())
                .bytes(self.from_public_key.as_bytes())
                .bytes(self.to_public_key.as_bytes())
                .scalar(&self.rekey)
                .point(&self.precursor)
                .bytes(&validity)
                .digest(),
        )
    }

    /// True once `now` reaches `valid_until`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.valid_until.map_or(false, |until| now >= until)
    }

    pub fn is_usable(&self, now: i64) -> bool {
        !self.revoked && !self.is_expired(now)
    }

    pub fn revoke(&mut self) {
        self.revoked = true;
    }

    pub(crate) fn rekey(&self) -> &Scalar {
        &self.rekey
    }

    pub(crate) fn precursor(&self) -> &RistrettoPoint {
        &self.precursor
    }

    /// Encode as CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        ciborium::from_reader(bytes).map_err(|e| DecodeError::Cbor(e.to_string()))
    }
}

impl Drop for ReEncryptionKeyFragment {
    fn drop(&mut self) {
        self.rekey.zeroize();
    }
}

impl fmt::Debug for ReEncryptionKeyFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReEncryptionKeyFragment")
            .field("id", &self.id())
            .field("from_principal", &self.from_principal)
            .field("to_public_key", &self.to_public_key)
            .field("valid_until", &self.valid_until)
            .field("revoked", &self.revoked)
            .finish_non_exhaustive()
    }
}

/// Generate a fragment delegating `owner_secret`'s capsules to `recipient`.
///
/// Fails with [`CoreError::InvalidKey`] when `owner_public` is not the public
/// key of `owner_secret`. Every call draws a fresh precursor, so repeated
/// grants to the same recipient yield independent fragments.
pub fn generate_fragment(
    from_principal: &PrincipalId,
    owner_secret: &SecretKey,
    owner_public: &PublicKey,
    recipient: &PublicKey,
    valid_until: Option<i64>,
) -> Result<ReEncryptionKeyFragment> {
    generate_fragment_with_rng(
        from_principal,
        owner_secret,
        owner_public,
        recipient,
        valid_until,
        &mut OsRng,
    )
}

pub fn generate_fragment_with_rng<R: RngCore + CryptoRng>(
    from_principal: &PrincipalId,
    owner_secret: &SecretKey,
    owner_public: &PublicKey,
    recipient: &PublicKey,
    valid_until: Option<i64>,
    rng: &mut R,
) -> Result<ReEncryptionKeyFragment> {
    if &owner_secret.public_key() != owner_public {
        return Err(CoreError::InvalidKey(
            "owner public key does not match secret key".into(),
        ));
    }

    let mut x = random_scalar(rng)?;
    let precursor = RistrettoPoint::mul_base(&x);
    let dh = recipient.point() * x;
    x.zeroize();
    let d = hash_to_scalar(REKEY_BLINDING, &[&precursor, recipient.point(), &dh]);
    let rekey = owner_secret.scalar() * d.invert();

    Ok(ReEncryptionKeyFragment {
        from_principal: from_principal.clone(),
        from_public_key: *owner_public,
        to_public_key: *recipient,
        rekey,
        precursor,
        valid_until,
        revoked: false,
    })
}
