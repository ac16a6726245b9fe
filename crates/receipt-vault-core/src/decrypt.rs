//! Decryption of original and transformed capsules.

use crate::capsule::Capsule;
use crate::dem::{self, Ciphertext, SymmetricKey};
use crate::error::{CoreError, DecryptionFailure, Result};
use crate::keys::SecretKey;

/// Recover the plaintext of `ciphertext`.
///
/// The same call serves the owner (original capsule) and a recipient
/// (transformed capsule). A wrong key or any tampering yields
/// [`CoreError::Decryption`] and no output.
pub fn decrypt(capsule: &Capsule, ciphertext: &Ciphertext, secret: &SecretKey) -> Result<Vec<u8>> {
    let capsule_id = capsule.id();
    if ciphertext.capsule_id() != &capsule_id {
        return Err(CoreError::Decryption(DecryptionFailure::CapsuleMismatch));
    }
    if !capsule.original().verify() {
        return Err(CoreError::Decryption(DecryptionFailure::CapsuleCheck));
    }

    let shared = match capsule {
        Capsule::Original(c) => c.open(secret),
        Capsule::Transformed(t) => t.open(secret),
    };
    let key = SymmetricKey::derive(&shared, &capsule_id);
    dem::open(&key, ciphertext.nonce(), ciphertext.sealed(), capsule_id.as_bytes())
        .map_err(CoreError::Decryption)
}
