//! Encryption under an owner's public key.

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::capsule::{Capsule, OriginalCapsule};
use crate::dem::{self, Ciphertext, SymmetricKey};
use crate::error::{CoreError, Result};
use crate::keys::PublicKey;

/// Default plaintext limit: 1 MiB.
pub const DEFAULT_MAX_PLAINTEXT: usize = 1024 * 1024;

/// Produces a fresh capsule and ciphertext for every call.
#[derive(Debug, Clone, Copy)]
pub struct Encryptor {
    max_plaintext: usize,
}

impl Encryptor {
    pub fn new(max_plaintext: usize) -> Self {
        Self { max_plaintext }
    }

    pub fn max_plaintext(&self) -> usize {
        self.max_plaintext
    }

    /// Encrypt `plaintext` so that only the holder of `owner`'s secret key,
    /// or a recipient of a fragment derived from it, can recover it.
    pub fn encrypt(&self, plaintext: &[u8], owner: &PublicKey) -> Result<(Capsule, Ciphertext)> {
        self.encrypt_with_rng(plaintext, owner, &mut OsRng)
    }

    pub fn encrypt_with_rng<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        owner: &PublicKey,
        rng: &mut R,
    ) -> Result<(Capsule, Ciphertext)> {
        if plaintext.len() > self.max_plaintext {
            return Err(CoreError::PayloadTooLarge {
                size: plaintext.len(),
                max: self.max_plaintext,
            });
        }

        let (capsule, shared) = OriginalCapsule::encapsulate(owner, rng)?;
        let capsule_id = capsule.id();
        let key = SymmetricKey::derive(&shared, &capsule_id);
        let nonce = dem::random_nonce(rng)?;
        let sealed = dem::seal(&key, &nonce, plaintext, capsule_id.as_bytes())?;

        Ok((
            Capsule::Original(capsule),
            Ciphertext::new(capsule_id, nonce, sealed),
        ))
    }
}

impl Default for Encryptor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PLAINTEXT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SecretKey;

    #[test]
    fn test_rejects_oversized_payload() {
        let pk = SecretKey::generate().unwrap().public_key();
        let err = Encryptor::new(8).encrypt(&[0; 9], &pk).unwrap_err();
        assert!(matches!(err, CoreError::PayloadTooLarge { size: 9, max: 8 }));
    }

    #[test]
    fn test_accepts_payload_at_limit() {
        let pk = SecretKey::generate().unwrap().public_key();
        let (capsule, ct) = Encryptor::new(8).encrypt(&[0; 8], &pk).unwrap();
        assert_eq!(ct.capsule_id(), &capsule.id());
        assert_eq!(ct.sealed_len(), 8 + dem::TAG_LEN);
    }

    #[test]
    fn test_fresh_randomness_per_call() {
        let pk = SecretKey::generate().unwrap().public_key();
        let enc = Encryptor::default();
        let (c1, t1) = enc.encrypt(b"same", &pk).unwrap();
        let (c2, t2) = enc.encrypt(b"same", &pk).unwrap();
        assert_ne!(c1, c2);
        assert_ne!(t1, t2);
    }
}
