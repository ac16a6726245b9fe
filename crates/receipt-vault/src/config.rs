//! Vault configuration.
//!
//! ```toml
//! max_plaintext_bytes = 1048576
//! default_grant_ttl_ms = 604800000   # 7 days
//! sqlite_path = "vault.db"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use receipt_vault_core::DEFAULT_MAX_PLAINTEXT;
use serde::{Deserialize, Serialize};

/// Runtime settings for a [`crate::Vault`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Largest plaintext accepted by `seal`.
    #[serde(default = "default_max_plaintext_bytes")]
    pub max_plaintext_bytes: usize,
    /// Validity window applied when a grant names no expiry. `None` = grants
    /// without an expiry never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_grant_ttl_ms: Option<i64>,
    /// Database file for [`crate::Vault::open_sqlite`]. `None` = in-memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            max_plaintext_bytes: default_max_plaintext_bytes(),
            default_grant_ttl_ms: None,
            sqlite_path: None,
        }
    }
}

impl VaultConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s).context("parsing vault config")?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("serializing vault config")
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.max_plaintext_bytes > 0,
            "max_plaintext_bytes must be positive"
        );
        if let Some(ttl) = self.default_grant_ttl_ms {
            anyhow::ensure!(ttl > 0, "default_grant_ttl_ms must be positive, got {ttl}");
        }
        Ok(())
    }
}

fn default_max_plaintext_bytes() -> usize {
    DEFAULT_MAX_PLAINTEXT
}
