//! SQLite key/value table behind the dynamic config.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::path::Path;

use super::keys::DefaultEntry;
use crate::error::Result;
use crate::state::Database;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY,
    value TEXT,
    description TEXT,
    required INTEGER DEFAULT 0,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);";

/// A persisted configuration row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub description: String,
    pub required: bool,
    pub updated_at: String,
}

#[derive(Clone)]
pub struct ConfigStore {
    db: Database,
}

impl ConfigStore {
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

    /// All rows ordered by key.
    pub fn load_all(&self) -> Result<Vec<ConfigEntry>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key, COALESCE(value, ''), COALESCE(description, ''), COALESCE(required, 0),
                        COALESCE(updated_at, '')
                 FROM config ORDER BY key",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ConfigEntry {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    description: row.get(2)?,
                    required: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.db.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT COALESCE(value, '') FROM config WHERE key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    /// Insert or update one row. `None` metadata keeps what is stored.
    pub fn upsert(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
        required: Option<bool>,
    ) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO config (key, value, description, required, updated_at)
                 VALUES (?1, ?2, COALESCE(?3, ''), COALESCE(?4, 0), CURRENT_TIMESTAMP)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    description = COALESCE(?3, config.description),
                    required = COALESCE(?4, config.required),
                    updated_at = CURRENT_TIMESTAMP",
                params![key, value, description, required],
            )?;
            Ok(())
        })
    }

    /// Write several values in a single transaction.
    pub fn upsert_many(&self, pairs: &[(String, String)]) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO config (key, value, updated_at)
                     VALUES (?1, ?2, CURRENT_TIMESTAMP)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = CURRENT_TIMESTAMP",
                )?;
                for (key, value) in pairs {
                    stmt.execute(params![key, value])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Seed rows that do not exist yet. Returns how many were added.
    pub fn insert_missing(&self, entries: &[DefaultEntry]) -> Result<usize> {
        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut added = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO config (key, value, description, required)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for entry in entries {
                    added += stmt.execute(params![
                        entry.key,
                        entry.value,
                        entry.description,
                        entry.required
                    ])?;
                }
            }
            tx.commit()?;
            Ok(added)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_get() {
        let store = ConfigStore::open_in_memory().unwrap();
        assert_eq!(store.get("A").unwrap(), None);

        store.upsert("A", "1", Some("first"), Some(true)).unwrap();
        store.upsert("A", "2", None, None).unwrap();

        assert_eq!(store.get("A").unwrap(), Some("2".to_string()));
        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description, "first");
        assert!(all[0].required);
    }

    #[test]
    fn test_insert_missing_keeps_existing() {
        let store = ConfigStore::open_in_memory().unwrap();
        store.upsert("CMD_PREFIX", "?", None, None).unwrap();

        let added = store
            .insert_missing(&[
                DefaultEntry {
                    key: "CMD_PREFIX",
                    value: "!!",
                    description: "Prefix",
                    required: false,
                },
                DefaultEntry {
                    key: "BASE_URL",
                    value: "",
                    description: "Url",
                    required: true,
                },
            ])
            .unwrap();

        assert_eq!(added, 1);
        assert_eq!(store.get("CMD_PREFIX").unwrap(), Some("?".to_string()));
    }

    #[test]
    fn test_upsert_many_ordered_load() {
        let store = ConfigStore::open_in_memory().unwrap();
        store
            .upsert_many(&[
                ("B".to_string(), "2".to_string()),
                ("A".to_string(), "1".to_string()),
            ])
            .unwrap();

        let keys: Vec<_> = store.load_all().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }
}
