//! Storage key layout.
//!
//! ```text
//! capsule/<capsule-id-hex>          capsule wire string
//! ciphertext/<capsule-id-hex>       ciphertext bytes
//! fragment/<fragment-id-hex>        fragment CBOR
//! principal/<principal-id>/public   compressed public key
//! principal/<principal-id>/sealed   sealed secret key
//! ```

use receipt_vault_core::{CapsuleId, FragmentId, PrincipalId};

pub const CAPSULE_PREFIX: &str = "capsule/";
pub const CIPHERTEXT_PREFIX: &str = "ciphertext/";
pub const FRAGMENT_PREFIX: &str = "fragment/";
pub const PRINCIPAL_PREFIX: &str = "principal/";

pub fn capsule(id: &CapsuleId) -> String {
    format!("{CAPSULE_PREFIX}{}", id.to_hex())
}

pub fn ciphertext(id: &CapsuleId) -> String {
    format!("{CIPHERTEXT_PREFIX}{}", id.to_hex())
}

pub fn fragment(id: &FragmentId) -> String {
    format!("{FRAGMENT_PREFIX}{}", id.to_hex())
}

pub fn public_key(principal: &PrincipalId) -> String {
    format!("{PRINCIPAL_PREFIX}{principal}/public")
}

pub fn sealed_secret_key(principal: &PrincipalId) -> String {
    format!("{PRINCIPAL_PREFIX}{principal}/sealed")
}
