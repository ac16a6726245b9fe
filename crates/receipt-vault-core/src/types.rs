//! Strong type definitions for Receipt Vault.
//!
//! Identifiers are newtypes so a capsule id can never be passed where a
//! fragment id is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, DecodeError};

macro_rules! digest_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from a 64 character hex string.
            pub fn from_hex(s: &str) -> Result<Self, DecodeError> {
                let bytes = hex::decode(s).map_err(|e| DecodeError::Hex(e.to_string()))?;
                let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| DecodeError::Length {
                    what: stringify!($name),
                    expected: 32,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", &self.to_hex()[..16])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

digest_id!(
    /// Content address of an original capsule.
    ///
    /// A transformed capsule reports the id of the original it was derived
    /// from, so ciphertexts stay paired with both forms.
    CapsuleId
);

digest_id!(
    /// Content address of a re-encryption key fragment.
    ///
    /// Computed over the key material and validity window. Revoking a
    /// fragment does not change its id.
    FragmentId
);

/// Identifies an owner or recipient.
///
/// Non-empty, at most [`PrincipalId::MAX_LEN`] bytes, and free of `/` so it
/// can be embedded in storage keys.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Longest accepted principal id, in bytes.
    pub const MAX_LEN: usize = 128;

    /// Validate and wrap a principal id.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::InvalidPrincipal("empty".into()));
        }
        if id.len() > Self::MAX_LEN {
            return Err(CoreError::InvalidPrincipal(format!(
                "{} bytes exceeds maximum of {}",
                id.len(),
                Self::MAX_LEN
            )));
        }
        if id.contains('/') || id.chars().any(char::is_control) {
            return Err(CoreError::InvalidPrincipal(format!("illegal character in {id:?}")));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrincipalId({})", self.0)
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PrincipalId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PrincipalId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PrincipalId> for String {
    fn from(id: PrincipalId) -> Self {
        id.0
    }
}
