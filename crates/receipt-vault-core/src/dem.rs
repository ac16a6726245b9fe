//! Data encapsulation: ChaCha20-Poly1305 under a capsule-derived key.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use curve25519_dalek::ristretto::RistrettoPoint;
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CoreError, DecodeError, DecryptionFailure, Result};
use crate::hashing::{Transcript, DATA_KEY};
use crate::types::CapsuleId;

/// ChaCha20-Poly1305 nonce length.
pub const NONCE_LEN: usize = 12;

/// Poly1305 tag length.
pub const TAG_LEN: usize = 16;

/// Current ciphertext encoding version.
pub const CIPHERTEXT_VERSION: u8 = 1;

const HEADER_LEN: usize = 1 + 32 + NONCE_LEN;

/// A 256-bit symmetric key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    /// Wrap existing key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random key.
    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let mut bytes = [0u8; 32];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|e| CoreError::KeyGeneration(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the data key for a capsule from its shared point.
    pub(crate) fn derive(shared: &RistrettoPoint, capsule_id: &CapsuleId) -> Self {
        Self(
            Transcript::new(DATA_KEY)
                .point(shared)
                .bytes(capsule_id.as_bytes())
                .digest(),
        )
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

pub(crate) fn random_nonce<R: RngCore + CryptoRng>(rng: &mut R) -> Result<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    rng.try_fill_bytes(&mut nonce)
        .map_err(|e| CoreError::KeyGeneration(e.to_string()))?;
    Ok(nonce)
}

pub(crate) fn seal(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_LEN],
    msg: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg, aad })
        .map_err(|e| CoreError::Encryption(e.to_string()))
}

pub(crate) fn open(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_LEN],
    sealed: &[u8],
    aad: &[u8],
) -> std::result::Result<Vec<u8>, DecryptionFailure> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: sealed, aad })
        .map_err(|_| DecryptionFailure::Authentication)
}

/// Symmetric payload paired with exactly one capsule.
///
/// Never modified by re-encryption. Encoded as
/// `version || capsule_id || nonce || aead_output`.
#[derive(Clone, PartialEq, Eq)]
pub struct Ciphertext {
    capsule_id: CapsuleId,
    nonce: [u8; NONCE_LEN],
    sealed: Vec<u8>,
}

impl Ciphertext {
    pub(crate) fn new(capsule_id: CapsuleId, nonce: [u8; NONCE_LEN], sealed: Vec<u8>) -> Self {
        Self {
            capsule_id,
            nonce,
            sealed,
        }
    }

    /// The capsule this ciphertext is paired with.
    pub fn capsule_id(&self) -> &CapsuleId {
        &self.capsule_id
    }

    pub(crate) fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub(crate) fn sealed(&self) -> &[u8] {
        &self.sealed
    }

    /// Length of the encrypted body including the tag.
    pub fn sealed_len(&self) -> usize {
        self.sealed.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.sealed.len());
        out.push(CIPHERTEXT_VERSION);
        out.extend_from_slice(self.capsule_id.as_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.sealed);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        let (&version, rest) = bytes
            .split_first()
            .ok_or(DecodeError::Truncated("ciphertext"))?;
        if version != CIPHERTEXT_VERSION {
            return Err(DecodeError::UnsupportedVersion(version.to_string()));
        }
        if rest.len() < HEADER_LEN - 1 + TAG_LEN {
            return Err(DecodeError::Truncated("ciphertext"));
        }
        let (id, rest) = rest.split_at(32);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);
        let mut id_bytes = [0u8; 32];
        id_bytes.copy_from_slice(id);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(nonce);
        Ok(Self {
            capsule_id: CapsuleId::from_bytes(id_bytes),
            nonce: nonce_bytes,
            sealed: sealed.to_vec(),
        })
    }
}

impl std::fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ciphertext")
            .field("capsule_id", &self.capsule_id)
            .field("len", &self.sealed.len())
            .finish()
    }
}
