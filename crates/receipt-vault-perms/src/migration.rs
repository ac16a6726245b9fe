//! Registry schema migrations.
//!
//! Versions are tracked in `registry_migrations` so the registry can share
//! a database file with the blob store.

use rusqlite::Connection;
use tracing::debug;

use crate::error::{PermsError, Result};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the registry schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS registry_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM registry_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;
        for version in (current + 1)..=CURRENT_VERSION {
            match version {
                1 => apply_v1(&tx)?,
                _ => {
                    return Err(PermsError::Migration(format!(
                        "unknown migration version: {}",
                        version
                    )))
                }
            }
            tx.execute(
                "INSERT INTO registry_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }
        tx.commit()?;
        debug!(from = current, to = CURRENT_VERSION, "grant registry schema migrated");
    }

    Ok(())
}

/// Migration v1: capsules, fragments, grants and the transfer log.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE capsules (
            capsule_id BLOB PRIMARY KEY,      -- 32 bytes
            owner TEXT NOT NULL,
            owner_key BLOB NOT NULL,          -- 32 bytes, key the capsule is sealed to
            registered_at INTEGER NOT NULL
        );

        CREATE TABLE fragments (
            fragment_id BLOB PRIMARY KEY,     -- 32 bytes, content address
            from_principal TEXT NOT NULL,
            from_public_key BLOB NOT NULL,    -- 32 bytes, compressed Ristretto
            to_public_key BLOB NOT NULL,      -- 32 bytes, compressed Ristretto
            valid_until INTEGER,              -- Unix ms, exclusive
            issued_at INTEGER NOT NULL,
            revoked_at INTEGER                -- NULL while active
        );

        CREATE TABLE grants (
            capsule_id BLOB NOT NULL REFERENCES capsules(capsule_id),
            fragment_id BLOB NOT NULL REFERENCES fragments(fragment_id),
            granted_at INTEGER NOT NULL,
            PRIMARY KEY (capsule_id, fragment_id)
        );

        CREATE TABLE ownership_transfers (
            capsule_id BLOB NOT NULL,
            from_owner TEXT NOT NULL,
            to_owner TEXT NOT NULL,
            transferred_at INTEGER NOT NULL
        );

        CREATE INDEX idx_grants_fragment ON grants(fragment_id);
        CREATE INDEX idx_fragments_from ON fragments(from_principal);
        "#,
    )?;
    Ok(())
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for table in ["capsules", "fragments", "grants", "ownership_transfers"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }
}
