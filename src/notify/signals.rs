//! Cross-process signals over a polling table.
//!
//! The panel and the bot can run as separate processes, so config changes are
//! also appended to `signals.db`. The bot polls the table, hands each new row
//! to its subscribers and marks it processed. Delivery is at-least-once: the
//! watermark starts at zero, so rows a crashed process never marked are
//! delivered again on the next start.

use parking_lot::RwLock;
use rusqlite::params;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::state::Database;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    signal_type TEXT NOT NULL,
    data TEXT,
    timestamp REAL NOT NULL,
    processed BOOLEAN DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_signals_pending ON signals (processed, id);";

/// How often the poller reaps old processed rows.
const CLEANUP_EVERY: Duration = Duration::from_secs(3600);
const MAX_SIGNAL_AGE: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone)]
pub struct Signal {
    pub id: i64,
    pub signal_type: String,
    pub data: Option<Value>,
    /// Unix seconds.
    pub timestamp: f64,
}

pub type SignalListener = Arc<dyn Fn(&Signal) -> anyhow::Result<()> + Send + Sync>;

pub struct SignalQueue {
    db: Database,
    listeners: RwLock<HashMap<String, Vec<SignalListener>>>,
    watermark: AtomicI64,
    running: AtomicBool,
}

pub type SharedSignalQueue = Arc<SignalQueue>;

impl SignalQueue {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_database(Database::open(path, SCHEMA)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::with_database(Database::open_in_memory(SCHEMA)?))
    }

    fn with_database(db: Database) -> Self {
        Self {
            db,
            listeners: RwLock::new(HashMap::new()),
            watermark: AtomicI64::new(0),
            running: AtomicBool::new(false),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Append a signal. A null or empty payload is stored as NULL.
    pub fn emit_signal(&self, signal_type: &str, data: &Value) -> Result<i64> {
        let encoded = match data {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            other => Some(serde_json::to_string(other)?),
        };
        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO signals (signal_type, data, timestamp) VALUES (?1, ?2, ?3)",
                params![signal_type, encoded, unix_now()],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        debug!("Emitted signal '{}' (id {})", signal_type, id);
        Ok(id)
    }

    pub fn subscribe<F>(&self, signal_type: &str, listener: F)
    where
        F: Fn(&Signal) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .entry(signal_type.to_string())
            .or_default()
            .push(Arc::new(listener));
    }

    /// Deliver every unprocessed row above the watermark. Returns how many
    /// rows this call marked processed.
    pub fn poll_once(&self) -> Result<usize> {
        let after = self.watermark.load(Ordering::SeqCst);
        let pending = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, signal_type, data, timestamp FROM signals
                 WHERE processed = 0 AND id > ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map([after], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })?;

        let mut delivered = 0;
        for (id, signal_type, raw, timestamp) in pending {
            let data = match raw.as_deref().map(serde_json::from_str::<Value>) {
                Some(Ok(value)) => Some(value),
                Some(Err(e)) => {
                    warn!("Signal {} has undecodable data: {}", id, e);
                    None
                }
                None => None,
            };
            let signal = Signal {
                id,
                signal_type,
                data,
                timestamp,
            };

            self.dispatch(&signal);

            let marked = self.db.with_conn(|conn| {
                Ok(conn.execute(
                    "UPDATE signals SET processed = 1 WHERE id = ?1 AND processed = 0",
                    [id],
                )?)
            })?;
            delivered += marked;
            self.watermark.fetch_max(id, Ordering::SeqCst);
        }

        Ok(delivered)
    }

    fn dispatch(&self, signal: &Signal) {
        let listeners: Vec<SignalListener> = self
            .listeners
            .read()
            .get(&signal.signal_type)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            if let Err(e) = listener(signal) {
                error!(
                    "Signal listener for '{}' failed on id {}: {:#}",
                    signal.signal_type, signal.id, e
                );
            }
        }
    }

    /// Delete processed rows older than `max_age`.
    pub fn cleanup_old_signals(&self, max_age: Duration) -> Result<usize> {
        let cutoff = unix_now() - max_age.as_secs_f64();
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM signals WHERE processed = 1 AND timestamp < ?1",
                [cutoff],
            )?)
        })?;
        if removed > 0 {
            info!("Removed {} old signal(s)", removed);
        }
        Ok(removed)
    }

    pub fn pending_count(&self) -> Result<i64> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM signals WHERE processed = 0", [], |r| {
                r.get(0)
            })?)
        })
    }

    pub fn is_polling(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the polling loop. The returned handle ends after [`stop_polling`].
    ///
    /// [`stop_polling`]: SignalQueue::stop_polling
    pub fn start_polling(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let queue = self.clone();
        info!("Signal polling started (every {:?})", interval);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last_cleanup = tokio::time::Instant::now();

            while queue.running.load(Ordering::SeqCst) {
                ticker.tick().await;

                let worker = queue.clone();
                match tokio::task::spawn_blocking(move || worker.poll_once()).await {
                    Ok(Ok(0)) => {}
                    Ok(Ok(n)) => debug!("Processed {} signal(s)", n),
                    Ok(Err(e)) => error!("Signal polling failed: {}", e),
                    Err(e) => error!("Signal polling task panicked: {}", e),
                }

                if last_cleanup.elapsed() >= CLEANUP_EVERY {
                    last_cleanup = tokio::time::Instant::now();
                    if let Err(e) = queue.cleanup_old_signals(MAX_SIGNAL_AGE) {
                        warn!("Signal cleanup failed: {}", e);
                    }
                }
            }
            info!("Signal polling stopped");
        })
    }

    pub fn stop_polling(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

pub fn create_signal_queue(path: impl AsRef<Path>) -> Result<SharedSignalQueue> {
    Ok(Arc::new(SignalQueue::open(path)?))
}

fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_signal_delivered_and_marked_once() {
        let queue = SignalQueue::open_in_memory().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        queue.subscribe("config_updated", move |signal| {
            sink.lock().push(signal.data.clone());
            Ok(())
        });

        queue
            .emit_signal("config_updated", &json!({"key": "BASE_URL"}))
            .unwrap();

        assert_eq!(queue.poll_once().unwrap(), 1);
        assert_eq!(queue.poll_once().unwrap(), 0);
        assert_eq!(queue.pending_count().unwrap(), 0);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_ref().unwrap()["key"], "BASE_URL");
    }

    #[test]
    fn test_empty_payload_stored_as_null() {
        let queue = SignalQueue::open_in_memory().unwrap();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        queue.subscribe("bot_restart_required", move |signal| {
            *sink.lock() = Some(signal.data.is_none());
            Ok(())
        });

        queue.emit_signal("bot_restart_required", &json!({})).unwrap();
        queue.poll_once().unwrap();
        assert_eq!(*seen.lock(), Some(true));
    }

    #[test]
    fn test_unprocessed_rows_redelivered_to_new_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.db");

        // Panel process writes, never polls
        let panel = SignalQueue::open(&path).unwrap();
        panel
            .emit_signal("role_config_changed", &json!({"role_key": "ROLE_STAFF"}))
            .unwrap();

        // Bot process starts later and still sees it
        let bot = SignalQueue::open(&path).unwrap();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        bot.subscribe("role_config_changed", move |_| {
            *counter.lock() += 1;
            Ok(())
        });

        assert_eq!(bot.poll_once().unwrap(), 1);
        assert_eq!(*hits.lock(), 1);
        assert_eq!(panel.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_failing_listener_still_marks_processed() {
        let queue = SignalQueue::open_in_memory().unwrap();
        queue.subscribe("config_updated", |_| anyhow::bail!("listener broke"));
        queue.emit_signal("config_updated", &json!({"k": 1})).unwrap();

        assert_eq!(queue.poll_once().unwrap(), 1);
        assert_eq!(queue.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_cleanup_only_removes_old_processed() {
        let queue = SignalQueue::open_in_memory().unwrap();
        queue.emit_signal("config_updated", &json!({"k": 1})).unwrap();
        queue.emit_signal("config_updated", &json!({"k": 2})).unwrap();
        queue.poll_once().unwrap();
        queue.emit_signal("config_updated", &json!({"k": 3})).unwrap();

        // Age the processed rows by two days
        queue
            .database()
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE signals SET timestamp = timestamp - 172800 WHERE processed = 1",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        assert_eq!(queue.cleanup_old_signals(MAX_SIGNAL_AGE).unwrap(), 2);
        assert_eq!(queue.pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_polling_loop_delivers_within_interval() {
        let queue = Arc::new(SignalQueue::open_in_memory().unwrap());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        queue.subscribe("discord_token_changed", move |signal| {
            tx.send(signal.id)?;
            Ok(())
        });

        let handle = queue.start_polling(Duration::from_millis(50));
        let id = queue
            .emit_signal("discord_token_changed", &json!({"changed": true}))
            .unwrap();

        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, id);

        queue.stop_polling();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!queue.is_polling());
    }
}
