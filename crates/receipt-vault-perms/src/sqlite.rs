//! SQLite-backed grant registry.
//!
//! One connection behind a mutex. Authorization runs the caller's transform
//! while the connection is held, which serializes it against revocation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use receipt_vault_core::{CapsuleId, FragmentId, PrincipalId, PublicKey, ReEncryptionKeyFragment};

use crate::error::{PermsError, Result};
use crate::grant::{AccessGrant, CapsuleRecord, FragmentRecord};
use crate::migration;
use crate::registry::{check_issuer, evaluate, AccessGrantRegistry};

pub struct SqliteGrantRegistry {
    conn: Mutex<Connection>,
}

impl SqliteGrantRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PermsError::Poisoned(format!("registry connection: {}", e)))
    }
}

fn id_bytes(blob: Vec<u8>, what: &str) -> Result<[u8; 32]> {
    blob.as_slice().try_into().map_err(|_| {
        PermsError::Serialization(format!("{what}: expected 32 bytes, got {}", blob.len()))
    })
}

fn principal(s: String) -> Result<PrincipalId> {
    PrincipalId::new(s).map_err(|e| PermsError::Serialization(e.to_string()))
}

fn public_key(blob: Vec<u8>, what: &str) -> Result<PublicKey> {
    PublicKey::from_bytes(&id_bytes(blob, what)?).map_err(|e| PermsError::Serialization(e.to_string()))
}

type RawFragment = (Vec<u8>, String, Vec<u8>, Vec<u8>, Option<i64>, i64, Option<i64>);

const FRAGMENT_COLUMNS: &str = "f.fragment_id, f.from_principal, f.from_public_key, \
     f.to_public_key, f.valid_until, f.issued_at, f.revoked_at";

fn raw_fragment(row: &Row<'_>, offset: usize) -> rusqlite::Result<RawFragment> {
    Ok((
        row.get(offset)?,
        row.get(offset + 1)?,
        row.get(offset + 2)?,
        row.get(offset + 3)?,
        row.get(offset + 4)?,
        row.get(offset + 5)?,
        row.get(offset + 6)?,
    ))
}

fn decode_fragment(raw: RawFragment) -> Result<FragmentRecord> {
    let (id, from, from_key, to, valid_until, issued_at, revoked_at) = raw;
    Ok(FragmentRecord {
        fragment_id: FragmentId::from_bytes(id_bytes(id, "fragment_id")?),
        from_principal: principal(from)?,
        from_public_key: public_key(from_key, "from_public_key")?,
        to_public_key: public_key(to, "to_public_key")?,
        valid_until,
        issued_at,
        revoked_at,
    })
}

fn load_capsule(conn: &Connection, capsule_id: &CapsuleId) -> Result<Option<CapsuleRecord>> {
    let raw = conn
        .query_row(
            "SELECT owner, owner_key, registered_at FROM capsules WHERE capsule_id = ?1",
            params![capsule_id.as_bytes().as_slice()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;
    raw.map(|(owner, owner_key, registered_at)| {
        Ok(CapsuleRecord {
            capsule_id: *capsule_id,
            owner: principal(owner)?,
            owner_key: public_key(owner_key, "owner_key")?,
            registered_at,
        })
    })
    .transpose()
}

fn load_fragment(conn: &Connection, fragment_id: &FragmentId) -> Result<Option<FragmentRecord>> {
    conn.query_row(
        &format!("SELECT {FRAGMENT_COLUMNS} FROM fragments f WHERE f.fragment_id = ?1"),
        params![fragment_id.as_bytes().as_slice()],
        |row| raw_fragment(row, 0),
    )
    .optional()?
    .map(decode_fragment)
    .transpose()
}

fn revoke_capsule_grants(conn: &Connection, capsule_id: &CapsuleId, at: i64) -> Result<Vec<FragmentId>> {
    let mut stmt = conn.prepare(
        "SELECT f.fragment_id FROM fragments f
         JOIN grants g ON g.fragment_id = f.fragment_id
         WHERE g.capsule_id = ?1 AND f.revoked_at IS NULL
         ORDER BY f.fragment_id",
    )?;
    let ids = stmt
        .query_map(params![capsule_id.as_bytes().as_slice()], |row| row.get::<_, Vec<u8>>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut revoked = Vec::with_capacity(ids.len());
    for id in ids {
        conn.execute(
            "UPDATE fragments SET revoked_at = ?2 WHERE fragment_id = ?1 AND revoked_at IS NULL",
            params![id.as_slice(), at],
        )?;
        revoked.push(FragmentId::from_bytes(id_bytes(id, "fragment_id")?));
    }
    Ok(revoked)
}

impl AccessGrantRegistry for SqliteGrantRegistry {
    fn register_capsule(
        &self,
        capsule_id: CapsuleId,
        owner: &PrincipalId,
        owner_key: &PublicKey,
        at: i64,
    ) -> Result<()> {
        let conn = self.lock()?;
        if let Some(existing) = load_capsule(&conn, &capsule_id)? {
            if &existing.owner == owner && &existing.owner_key == owner_key {
                return Ok(());
            }
            return Err(PermsError::CapsuleExists {
                capsule_id,
                owner: existing.owner,
            });
        }
        conn.execute(
            "INSERT INTO capsules (capsule_id, owner, owner_key, registered_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                capsule_id.as_bytes().as_slice(),
                owner.as_str(),
                owner_key.as_bytes().as_slice(),
                at
            ],
        )?;
        debug!(capsule_id = %capsule_id, owner = %owner, "Registered capsule");
        Ok(())
    }

    fn capsule(&self, capsule_id: &CapsuleId) -> Result<Option<CapsuleRecord>> {
        load_capsule(&*self.lock()?, capsule_id)
    }

    fn transfer_ownership(
        &self,
        capsule_id: &CapsuleId,
        new_owner: &PrincipalId,
        at: i64,
    ) -> Result<Vec<FragmentId>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let previous = load_capsule(&tx, capsule_id)?
            .ok_or(PermsError::CapsuleNotFound(*capsule_id))?
            .owner;

        let revoked = revoke_capsule_grants(&tx, capsule_id, at)?;
        tx.execute(
            "UPDATE capsules SET owner = ?2 WHERE capsule_id = ?1",
            params![capsule_id.as_bytes().as_slice(), new_owner.as_str()],
        )?;
        tx.execute(
            "INSERT INTO ownership_transfers (capsule_id, from_owner, to_owner, transferred_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                capsule_id.as_bytes().as_slice(),
                previous.as_str(),
                new_owner.as_str(),
                at
            ],
        )?;
        tx.commit()?;
        info!(
            capsule_id = %capsule_id,
            new_owner = %new_owner,
            revoked = revoked.len(),
            "Transferred capsule ownership"
        );
        Ok(revoked)
    }

    fn record_grant(
        &self,
        capsule_id: CapsuleId,
        fragment: &ReEncryptionKeyFragment,
        at: i64,
    ) -> Result<AccessGrant> {
        if fragment.revoked {
            return Err(PermsError::InvalidGrant("fragment is already revoked".into()));
        }
        let fragment_id = fragment.id();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let capsule = load_capsule(&tx, &capsule_id)?.ok_or(PermsError::CapsuleNotFound(capsule_id))?;
        check_issuer(&capsule, fragment)?;

        let record = FragmentRecord::from_fragment(fragment, at);
        tx.execute(
            "INSERT OR IGNORE INTO fragments
                (fragment_id, from_principal, from_public_key, to_public_key,
                 valid_until, issued_at, revoked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
            params![
                fragment_id.as_bytes().as_slice(),
                record.from_principal.as_str(),
                record.from_public_key.as_bytes().as_slice(),
                record.to_public_key.as_bytes().as_slice(),
                record.valid_until,
                record.issued_at
            ],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO grants (capsule_id, fragment_id, granted_at) VALUES (?1, ?2, ?3)",
            params![capsule_id.as_bytes().as_slice(), fragment_id.as_bytes().as_slice(), at],
        )?;
        let granted_at: i64 = tx.query_row(
            "SELECT granted_at FROM grants WHERE capsule_id = ?1 AND fragment_id = ?2",
            params![capsule_id.as_bytes().as_slice(), fragment_id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        tx.commit()?;
        debug!(capsule_id = %capsule_id, fragment_id = %fragment_id, "Recorded grant");

        Ok(AccessGrant {
            capsule_id,
            fragment_id,
            granted_at,
        })
    }

    fn fragment(&self, fragment_id: &FragmentId) -> Result<Option<FragmentRecord>> {
        load_fragment(&*self.lock()?, fragment_id)
    }

    fn grants_for_capsule(
        &self,
        capsule_id: &CapsuleId,
    ) -> Result<Vec<(AccessGrant, FragmentRecord)>> {
        let conn = self.lock()?;
        if load_capsule(&conn, capsule_id)?.is_none() {
            return Err(PermsError::CapsuleNotFound(*capsule_id));
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT g.granted_at, {FRAGMENT_COLUMNS} FROM grants g
             JOIN fragments f ON f.fragment_id = g.fragment_id
             WHERE g.capsule_id = ?1
             ORDER BY g.granted_at, g.fragment_id"
        ))?;
        let rows = stmt
            .query_map(params![capsule_id.as_bytes().as_slice()], |row| {
                Ok((row.get::<_, i64>(0)?, raw_fragment(row, 1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(granted_at, raw)| {
                let record = decode_fragment(raw)?;
                Ok((
                    AccessGrant {
                        capsule_id: *capsule_id,
                        fragment_id: record.fragment_id,
                        granted_at,
                    },
                    record,
                ))
            })
            .collect()
    }

    fn revoke_fragment(&self, fragment_id: &FragmentId, at: i64) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE fragments SET revoked_at = ?2 WHERE fragment_id = ?1 AND revoked_at IS NULL",
            params![fragment_id.as_bytes().as_slice(), at],
        )?;
        if changed > 0 {
            info!(fragment_id = %fragment_id, "Revoked fragment");
            return Ok(true);
        }
        match load_fragment(&conn, fragment_id)? {
            Some(_) => Ok(false),
            None => Err(PermsError::FragmentNotFound(*fragment_id)),
        }
    }

    fn revoke_all_for_capsule(&self, capsule_id: &CapsuleId, at: i64) -> Result<Vec<FragmentId>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if load_capsule(&tx, capsule_id)?.is_none() {
            return Err(PermsError::CapsuleNotFound(*capsule_id));
        }
        let revoked = revoke_capsule_grants(&tx, capsule_id, at)?;
        tx.commit()?;
        info!(capsule_id = %capsule_id, revoked = revoked.len(), "Revoked all grants for capsule");
        Ok(revoked)
    }

    fn authorize<T, F>(
        &self,
        capsule_id: &CapsuleId,
        fragment_id: &FragmentId,
        now: i64,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&FragmentRecord) -> T,
    {
        let conn = self.lock()?;
        let capsule = load_capsule(&conn, capsule_id)?;
        let record = load_fragment(&conn, fragment_id)?;
        let granted = conn
            .query_row(
                "SELECT 1 FROM grants WHERE capsule_id = ?1 AND fragment_id = ?2",
                params![capsule_id.as_bytes().as_slice(), fragment_id.as_bytes().as_slice()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        let record = evaluate(capsule.as_ref(), record.as_ref(), granted, now)
            .map_err(PermsError::AccessDenied)?;
        Ok(f(record))
    }
}
