//! Completed and pending Discord to Genius links (`verification.db`).

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::Database;
use crate::error::Result;

/// Pending states older than this are rejected.
pub const PENDING_TTL_SECS: i64 = 600;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS verifications (
    discord_id INTEGER PRIMARY KEY,
    genius_id INTEGER,
    genius_username TEXT,
    genius_display_name TEXT,
    genius_roles TEXT,
    access_token TEXT,
    verified_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS pending_verifications (
    state TEXT PRIMARY KEY,
    discord_id INTEGER,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub discord_id: u64,
    pub genius_id: u64,
    pub genius_username: String,
    pub genius_display_name: String,
    pub genius_roles: Vec<String>,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub verified_at: String,
}

impl Verification {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let roles: String = row.get(4)?;
        Ok(Self {
            discord_id: row.get::<_, i64>(0)? as u64,
            genius_id: row.get::<_, i64>(1)? as u64,
            genius_username: row.get(2)?,
            genius_display_name: row.get(3)?,
            genius_roles: split_roles(&roles),
            access_token: row.get(5)?,
            verified_at: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerificationStats {
    pub total_verified: i64,
    pub pending: i64,
    pub verified_last_24h: i64,
}

const SELECT_VERIFICATION: &str = "SELECT discord_id, COALESCE(genius_id, 0), COALESCE(genius_username, ''),
        COALESCE(genius_display_name, ''), COALESCE(genius_roles, ''), COALESCE(access_token, ''),
        COALESCE(verified_at, '')
 FROM verifications";

#[derive(Clone)]
pub struct VerificationDb {
    db: Database,
}

pub type SharedVerificationDb = Arc<VerificationDb>;

impl VerificationDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            db: Database::open(path, SCHEMA)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Database::open_in_memory(SCHEMA)?,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn create_pending_verification(&self, state: &str, discord_id: u64) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO pending_verifications (state, discord_id, created_at)
                 VALUES (?1, ?2, CURRENT_TIMESTAMP)",
                params![state, discord_id as i64],
            )?;
            Ok(())
        })?;
        debug!("Pending verification created for {}", discord_id);
        Ok(())
    }

    /// Consume a pending state. The row is deleted whether or not it is still
    /// fresh, so each state resolves at most once.
    pub fn take_pending_verification(&self, state: &str) -> Result<Option<u64>> {
        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let found: Option<(i64, bool)> = tx
                .query_row(
                    "SELECT discord_id, created_at >= datetime('now', ?2)
                     FROM pending_verifications WHERE state = ?1",
                    params![state, ttl_modifier()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if found.is_some() {
                tx.execute("DELETE FROM pending_verifications WHERE state = ?1", [state])?;
            }
            tx.commit()?;

            Ok(match found {
                Some((discord_id, true)) => Some(discord_id as u64),
                Some((discord_id, false)) => {
                    debug!("Pending verification for {} expired", discord_id);
                    None
                }
                None => None,
            })
        })
    }

    pub fn purge_expired_pending(&self) -> Result<usize> {
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM pending_verifications WHERE created_at < datetime('now', ?1)",
                [ttl_modifier()],
            )?)
        })?;
        if removed > 0 {
            info!("Purged {} expired pending verification(s)", removed);
        }
        Ok(removed)
    }

    /// Insert or overwrite the verification for `record.discord_id`.
    pub fn save_verification(&self, record: &Verification) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO verifications
                    (discord_id, genius_id, genius_username, genius_display_name, genius_roles,
                     access_token, verified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)",
                params![
                    record.discord_id as i64,
                    record.genius_id as i64,
                    record.genius_username,
                    record.genius_display_name,
                    record.genius_roles.join(","),
                    record.access_token,
                ],
            )?;
            Ok(())
        })?;
        info!(
            "Saved verification {} -> Genius '{}'",
            record.discord_id, record.genius_username
        );
        Ok(())
    }

    pub fn get_verification(&self, discord_id: u64) -> Result<Option<Verification>> {
        self.db.with_conn(|conn| {
            let sql = format!("{} WHERE discord_id = ?1", SELECT_VERIFICATION);
            Ok(conn
                .query_row(&sql, [discord_id as i64], Verification::from_row)
                .optional()?)
        })
    }

    pub fn is_verified(&self, discord_id: u64) -> Result<bool> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM verifications WHERE discord_id = ?1",
                    [discord_id as i64],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }

    /// Returns whether a row was deleted.
    pub fn remove_verification(&self, discord_id: u64) -> Result<bool> {
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM verifications WHERE discord_id = ?1",
                [discord_id as i64],
            )?)
        })?;
        Ok(removed > 0)
    }

    pub fn remove_verifications(&self, discord_ids: &[u64]) -> Result<usize> {
        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM verifications WHERE discord_id = ?1")?;
                for id in discord_ids {
                    removed += stmt.execute([*id as i64])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
    }

    /// Newest first.
    pub fn list_verifications(&self) -> Result<Vec<Verification>> {
        self.db.with_conn(|conn| {
            let sql = format!("{} ORDER BY verified_at DESC, discord_id DESC", SELECT_VERIFICATION);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], Verification::from_row)?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }

    pub fn verified_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM verifications")
    }

    pub fn pending_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM pending_verifications")
    }

    pub fn stats(&self) -> Result<VerificationStats> {
        Ok(VerificationStats {
            total_verified: self.verified_count()?,
            pending: self.pending_count()?,
            verified_last_24h: self.count(
                "SELECT COUNT(*) FROM verifications WHERE verified_at >= datetime('now', '-1 day')",
            )?,
        })
    }

    pub fn health_check(&self) -> Result<()> {
        self.db.ping()
    }

    fn count(&self, sql: &str) -> Result<i64> {
        self.db
            .with_conn(|conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
    }
}

fn ttl_modifier() -> String {
    format!("-{} seconds", PENDING_TTL_SECS)
}

fn split_roles(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect()
}
