//! Key pairs on the Ristretto group.
//!
//! A [`SecretKey`] is a non-zero scalar and never leaves its owner. The
//! matching [`PublicKey`] is always derived from it, never set independently.

use std::fmt;

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::dem::{self, SymmetricKey, NONCE_LEN, TAG_LEN};
use crate::error::{CoreError, DecodeError, DecryptionFailure, Result};
use crate::types::PrincipalId;

/// Draw a uniformly random non-zero scalar.
pub(crate) fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Scalar> {
    let mut wide = Zeroizing::new([0u8; 64]);
    rng.try_fill_bytes(&mut wide[..])
        .map_err(|e| CoreError::KeyGeneration(e.to_string()))?;
    let scalar = Scalar::from_bytes_mod_order_wide(&wide);
    if scalar == Scalar::ZERO {
        return Err(CoreError::KeyGeneration("random source produced zero scalar".into()));
    }
    Ok(scalar)
}

pub(crate) fn decode_point(
    bytes: &[u8; 32],
    what: &'static str,
) -> std::result::Result<RistrettoPoint, DecodeError> {
    CompressedRistretto(*bytes)
        .decompress()
        .ok_or(DecodeError::InvalidPoint(what))
}

pub(crate) fn decode_scalar(
    bytes: &[u8; 32],
    what: &'static str,
) -> std::result::Result<Scalar, DecodeError> {
    Option::from(Scalar::from_canonical_bytes(*bytes)).ok_or(DecodeError::InvalidScalar(what))
}

/// A secret key. Zeroized on drop, redacted in `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Scalar);

impl SecretKey {
    /// Generate from the OS random source.
    pub fn generate() -> Result<Self> {
        Self::generate_with_rng(&mut OsRng)
    }

    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        random_scalar(rng).map(Self)
    }

    /// Restore from canonical scalar bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let scalar = decode_scalar(bytes, "secret key")
            .map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        if scalar == Scalar::ZERO {
            return Err(CoreError::InvalidKey("zero secret key".into()));
        }
        Ok(Self(scalar))
    }

    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.0.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_point(RistrettoPoint::mul_base(&self.0))
    }

    pub(crate) fn scalar(&self) -> &Scalar {
        &self.0
    }

    /// Encrypt this key under a local wrap key for at-rest storage.
    ///
    /// `aad` binds the sealed blob to its owner; the same value must be
    /// supplied to [`SealedSecretKey::open`].
    pub fn seal_with_rng<R: RngCore + CryptoRng>(
        &self,
        wrap: &SymmetricKey,
        aad: &[u8],
        rng: &mut R,
    ) -> Result<SealedSecretKey> {
        let nonce = dem::random_nonce(rng)?;
        let bytes = self.to_bytes();
        let sealed = dem::seal(wrap, &nonce, &bytes[..], aad)?;
        Ok(SealedSecretKey { nonce, sealed })
    }

    pub fn seal(&self, wrap: &SymmetricKey, aad: &[u8]) -> Result<SealedSecretKey> {
        self.seal_with_rng(wrap, aad, &mut OsRng)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// A secret key sealed with ChaCha20-Poly1305.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecretKey {
    nonce: [u8; NONCE_LEN],
    sealed: Vec<u8>,
}

impl SealedSecretKey {
    const LEN: usize = NONCE_LEN + 32 + TAG_LEN;

    pub fn open(&self, wrap: &SymmetricKey, aad: &[u8]) -> Result<SecretKey> {
        let plain = Zeroizing::new(
            dem::open(wrap, &self.nonce, &self.sealed, aad).map_err(CoreError::Decryption)?,
        );
        let bytes: [u8; 32] = plain
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::Decryption(DecryptionFailure::Authentication))?;
        let bytes = Zeroizing::new(bytes);
        SecretKey::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.sealed);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        if bytes.len() != Self::LEN {
            return Err(DecodeError::Length {
                what: "sealed secret key",
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let (nonce, sealed) = bytes.split_at(NONCE_LEN);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(nonce);
        Ok(Self {
            nonce: nonce_bytes,
            sealed: sealed.to_vec(),
        })
    }
}

/// A public key: a non-identity Ristretto point.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "[u8; 32]", into = "[u8; 32]")]
pub struct PublicKey {
    point: RistrettoPoint,
    bytes: [u8; 32],
}

impl PublicKey {
    pub(crate) fn from_point(point: RistrettoPoint) -> Self {
        Self {
            point,
            bytes: point.compress().to_bytes(),
        }
    }

    /// Decode a compressed point, rejecting invalid encodings and the identity.
    pub fn from_bytes(bytes: &[u8; 32]) -> std::result::Result<Self, DecodeError> {
        let point = decode_point(bytes, "public key")?;
        if point.is_identity() {
            return Err(DecodeError::InvalidPoint("public key"));
        }
        Ok(Self {
            point,
            bytes: *bytes,
        })
    }

    pub fn from_hex(s: &str) -> std::result::Result<Self, DecodeError> {
        let raw = hex::decode(s).map_err(|e| DecodeError::Hex(e.to_string()))?;
        let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| DecodeError::Length {
            what: "public key",
            expected: 32,
            actual: raw.len(),
        })?;
        Self::from_bytes(&bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub(crate) fn point(&self) -> &RistrettoPoint {
        &self.point
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PublicKey {}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<[u8; 32]> for PublicKey {
    type Error = DecodeError;

    fn try_from(bytes: [u8; 32]) -> std::result::Result<Self, Self::Error> {
        Self::from_bytes(&bytes)
    }
}

impl From<PublicKey> for [u8; 32] {
    fn from(pk: PublicKey) -> Self {
        pk.bytes
    }
}

/// A principal's key pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    principal_id: PrincipalId,
    public_key: PublicKey,
    secret_key: SecretKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS random source.
    pub fn generate(principal_id: PrincipalId) -> Result<Self> {
        Self::generate_with_rng(principal_id, &mut OsRng)
    }

    pub fn generate_with_rng<R: RngCore + CryptoRng>(
        principal_id: PrincipalId,
        rng: &mut R,
    ) -> Result<Self> {
        Ok(Self::from_secret(principal_id, SecretKey::generate_with_rng(rng)?))
    }

    /// Build a pair around an existing secret, deriving the public key.
    pub fn from_secret(principal_id: PrincipalId, secret_key: SecretKey) -> Self {
        Self {
            principal_id,
            public_key: secret_key.public_key(),
            secret_key,
        }
    }

    pub fn principal_id(&self) -> &PrincipalId {
        &self.principal_id
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }
}
