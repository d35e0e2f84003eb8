//! Shared SQLite handle.
//!
//! Every store (config, signals, verifications) lives in its own file and
//! gets its own handle. The bot and the panel may run as separate processes
//! on the same files, so each connection runs in WAL mode with a busy timeout.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

use crate::error::{BotError, Result};

/// Thread-safe handle wrapping a single SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database file and apply `schema`.
    pub fn open(path: impl AsRef<Path>, schema: &str) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| BotError::DatabaseOpen {
            path: path.display().to_string(),
            source,
        })?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.configure()?;
        db.with_conn(|conn| Ok(conn.execute_batch(schema)?))?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory(schema: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.with_conn(|conn| Ok(conn.execute_batch(schema)?))?;
        Ok(db)
    }

    pub fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Mutable access, needed for transactions.
    pub fn with_conn_mut<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }

    /// Cheap round trip used by health endpoints.
    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }

    fn configure(&self) -> Result<()> {
        self.with_conn(|conn| {
            // journal_mode returns a row, so it cannot go through execute()
            conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (k TEXT PRIMARY KEY, v TEXT);";

    #[test]
    fn test_open_applies_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let db = Database::open(&path, SCHEMA).unwrap();
        db.with_conn(|conn| {
            conn.execute("INSERT INTO kv (k, v) VALUES ('a', '1')", [])?;
            Ok(())
        })
        .unwrap();

        // A second handle on the same file sees the row
        let other = Database::open(&path, SCHEMA).unwrap();
        let value: String = other
            .with_conn(|conn| Ok(conn.query_row("SELECT v FROM kv WHERE k = 'a'", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(value, "1");
    }

    #[test]
    fn test_ping() {
        let db = Database::open_in_memory(SCHEMA).unwrap();
        assert!(db.ping().is_ok());
    }
}
