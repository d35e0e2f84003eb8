//! Runtime configuration backed by `config.db`.
//!
//! Reads hit an in-memory cache, falling back to the process environment.
//! Writes go straight to SQLite and are announced on the event bus (this
//! process) and the signal queue (other processes sharing the data dir).

use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::keys::{self, default_entries, is_role_key, is_secret};
use super::store::{ConfigEntry, ConfigStore};
use crate::error::Result;
use crate::notify::{topics, SharedEventBus, SharedSignalQueue};

const SECRET_MASK: &str = "********";

pub struct DynamicConfig {
    store: ConfigStore,
    cache: RwLock<HashMap<String, String>>,
    events: SharedEventBus,
    signals: SharedSignalQueue,
}

pub type SharedConfig = Arc<DynamicConfig>;

impl DynamicConfig {
    pub fn new(store: ConfigStore, events: SharedEventBus, signals: SharedSignalQueue) -> Result<Self> {
        let config = Self {
            store,
            cache: RwLock::new(HashMap::new()),
            events,
            signals,
        };
        config.reload()?;
        Ok(config)
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn signals(&self) -> &SharedSignalQueue {
        &self.signals
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Cached value, else environment variable, else `default`.
    pub fn get(&self, key: &str, default: &str) -> String {
        self.get_opt(key).unwrap_or_else(|| default.to_string())
    }

    /// Like [`get`](Self::get) but `None` when nothing non-empty is set.
    pub fn get_opt(&self, key: &str) -> Option<String> {
        if let Some(value) = self.cache.read().get(key) {
            if !value.is_empty() {
                return Some(value.clone());
            }
        }
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_opt(key) {
            Some(value) => parse_bool(&value).unwrap_or(default),
            None => default,
        }
    }

    /// Discord snowflake stored under `key`. Non-numeric values read as unset.
    pub fn get_id(&self, key: &str) -> Option<u64> {
        self.get_opt(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|id| *id != 0)
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get_opt(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn command_enabled(&self, flag: &str) -> bool {
        self.get_bool(flag, true)
    }

    pub fn prefix(&self) -> String {
        self.get(keys::CMD_PREFIX, keys::DEFAULT_PREFIX)
    }

    /// Discord token with any `Bot ` prefix and quotes removed.
    pub fn discord_token(&self) -> Option<String> {
        self.get_opt(keys::DISCORD_TOKEN)
            .map(|raw| normalize_token(&raw))
            .filter(|t| !t.is_empty())
    }

    pub fn base_url(&self) -> String {
        self.get(keys::BASE_URL, "").trim_end_matches('/').to_string()
    }

    /// Write one value. Returns whether the stored value changed.
    pub fn set(&self, key: &str, value: &str) -> Result<bool> {
        self.write(key, value, None, None)
    }

    pub fn set_with_meta(&self, key: &str, value: &str, description: &str, required: bool) -> Result<bool> {
        self.write(key, value, Some(description), Some(required))
    }

    fn write(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
        required: Option<bool>,
    ) -> Result<bool> {
        // Compare, upsert and insert under one write guard
        let old = {
            let mut cache = self.cache.write();
            let old = cache.get(key).cloned().unwrap_or_default();
            let has_meta = description.is_some() || required.is_some();
            if old == value && !has_meta {
                return Ok(false);
            }
            self.store.upsert(key, value, description, required)?;
            cache.insert(key.to_string(), value.to_string());
            old
        };

        if old == value {
            return Ok(false);
        }

        info!("Config '{}' updated", key);
        self.announce(
            topics::CONFIG_UPDATED,
            json!({
                "key": key,
                "old_value": masked(key, &old),
                "new_value": masked(key, value),
            }),
        );
        if key == keys::DISCORD_TOKEN {
            self.announce(topics::DISCORD_TOKEN_CHANGED, json!({ "key": key }));
        }
        if is_role_key(key) {
            self.announce(
                topics::ROLE_CONFIG_CHANGED,
                json!({
                    "role_key": key,
                    "old_value": old,
                    "new_value": value,
                }),
            );
        }
        Ok(true)
    }

    /// Write several values in one transaction. Only keys whose value differs
    /// from the cache are written or announced.
    pub fn update_multiple(&self, updates: &BTreeMap<String, String>) -> Result<bool> {
        let diff: Vec<(String, String, String)> = {
            let mut cache = self.cache.write();
            let diff: Vec<(String, String, String)> = updates
                .iter()
                .filter_map(|(key, new)| {
                    let old = cache.get(key).cloned().unwrap_or_default();
                    (old != *new).then(|| (key.clone(), old, new.clone()))
                })
                .collect();
            if diff.is_empty() {
                debug!("update_multiple: nothing changed");
                return Ok(false);
            }

            let pairs: Vec<(String, String)> =
                diff.iter().map(|(k, _, v)| (k.clone(), v.clone())).collect();
            self.store.upsert_many(&pairs)?;
            for (key, value) in pairs {
                cache.insert(key, value);
            }
            diff
        };

        let changed_keys: Vec<&str> = diff.iter().map(|(k, _, _)| k.as_str()).collect();
        info!("Config updated: {}", changed_keys.join(", "));

        let mut changes = Map::new();
        let mut role_changes = Map::new();
        for (key, old, new) in &diff {
            changes.insert(
                key.clone(),
                json!({ "old": masked(key, old), "new": masked(key, new) }),
            );
            if is_role_key(key) {
                role_changes.insert(key.clone(), json!({ "old": old, "new": new }));
            }
        }

        self.announce(
            topics::CONFIG_UPDATED,
            json!({ "multiple": true, "changes": changes }),
        );

        let critical: Vec<&str> = changed_keys
            .iter()
            .copied()
            .filter(|k| keys::CRITICAL_KEYS.contains(k))
            .collect();
        if !critical.is_empty() {
            self.announce(
                topics::BOT_RESTART_REQUIRED,
                json!({ "reason": "critical_config_changed", "changed_keys": critical }),
            );
        }
        if !role_changes.is_empty() {
            self.announce(
                topics::ROLE_CONFIG_CHANGED,
                json!({ "multiple": true, "role_changes": role_changes }),
            );
        }
        if changed_keys.contains(&keys::DISCORD_TOKEN) {
            self.announce(topics::DISCORD_TOKEN_CHANGED, json!({ "key": keys::DISCORD_TOKEN }));
        }
        Ok(true)
    }

    pub fn get_all(&self) -> Result<Vec<ConfigEntry>> {
        self.store.load_all()
    }

    /// Refresh the cache from SQLite.
    pub fn reload(&self) -> Result<()> {
        let entries = self.store.load_all()?;
        let mut cache = self.cache.write();
        cache.clear();
        cache.extend(entries.into_iter().map(|e| (e.key, e.value)));
        debug!("Config cache loaded with {} keys", cache.len());
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        keys::REQUIRED_KEYS.iter().all(|k| self.get_opt(k).is_some())
    }

    /// Required and recommended keys that have no value.
    pub fn missing_configs(&self) -> Vec<&'static str> {
        keys::REQUIRED_KEYS
            .iter()
            .chain(keys::RECOMMENDED_KEYS)
            .copied()
            .filter(|k| self.get_opt(k).is_none())
            .collect()
    }

    /// Seed every known key that is not stored yet.
    pub fn init_default_configs(&self) -> Result<usize> {
        let added = self.store.insert_missing(&default_entries())?;
        if added > 0 {
            info!("Seeded {} default config entries", added);
            self.reload()?;
        }
        Ok(added)
    }

    /// Copy credentials from the environment into empty stored slots.
    pub fn import_environment(&self) -> Result<Vec<&'static str>> {
        let mut imported = Vec::new();
        for key in keys::REQUIRED_KEYS {
            if !self.cached(key).is_empty() {
                continue;
            }
            let Some(raw) = std::env::var(key).ok().filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            let value = if *key == keys::DISCORD_TOKEN {
                normalize_token(&raw)
            } else {
                raw.trim().to_string()
            };
            self.store.upsert(key, &value, None, None)?;
            self.cache.write().insert(key.to_string(), value);
            imported.push(*key);
        }
        if !imported.is_empty() {
            info!("Imported from environment: {}", imported.join(", "));
        }
        Ok(imported)
    }

    fn cached(&self, key: &str) -> String {
        self.cache.read().get(key).cloned().unwrap_or_default()
    }

    fn announce(&self, topic: &str, payload: Value) {
        if let Err(e) = self.signals.emit_signal(topic, &payload) {
            warn!("Failed to write '{}' signal: {}", topic, e);
        }
        self.events.emit(topic, payload);
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn normalize_token(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    trimmed.strip_prefix("Bot ").unwrap_or(trimmed).trim().to_string()
}

/// Secret values shown as a fixed mask. Empty stays empty.
pub fn masked(key: &str, value: &str) -> String {
    if is_secret(key) && !value.is_empty() {
        SECRET_MASK.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{EventBus, SignalQueue};
    use parking_lot::Mutex;

    fn config() -> DynamicConfig {
        DynamicConfig::new(
            ConfigStore::open_in_memory().unwrap(),
            Arc::new(EventBus::new()),
            Arc::new(SignalQueue::open_in_memory().unwrap()),
        )
        .unwrap()
    }

    fn record(config: &DynamicConfig, topic: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        config.events().subscribe(topic, move |payload| {
            sink.lock().push(payload.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn test_racing_sets_announce_once() {
        let config = config();
        let updates = record(&config, topics::CONFIG_UPDATED);

        let changed: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| config.set(keys::CMD_PREFIX, "$").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap() as usize).sum()
        });

        assert_eq!(changed, 1);
        assert_eq!(updates.lock().len(), 1);
        assert_eq!(config.prefix(), "$");
    }

    #[test]
    fn test_set_and_get() {
        let config = config();
        let updates = record(&config, topics::CONFIG_UPDATED);

        assert!(config.set(keys::CMD_PREFIX, "?").unwrap());
        assert!(!config.set(keys::CMD_PREFIX, "?").unwrap());

        assert_eq!(config.prefix(), "?");
        assert_eq!(config.store().get(keys::CMD_PREFIX).unwrap(), Some("?".into()));
        let updates = updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["old_value"], "");
        assert_eq!(updates[0]["new_value"], "?");
    }

    #[test]
    fn test_secret_masked_in_payloads() {
        let config = config();
        let updates = record(&config, topics::CONFIG_UPDATED);
        let token = record(&config, topics::DISCORD_TOKEN_CHANGED);

        config.set(keys::DISCORD_TOKEN, "abc.def.ghi").unwrap();

        assert_eq!(updates.lock()[0]["new_value"], SECRET_MASK);
        assert_eq!(token.lock().len(), 1);
        let stored = config.signals().database().with_conn(|conn| {
            Ok(conn.query_row("SELECT group_concat(data) FROM signals", [], |r| r.get::<_, String>(0))?)
        });
        assert!(!stored.unwrap().contains("abc.def.ghi"));
    }

    #[test]
    fn test_update_multiple_is_idempotent() {
        let config = config();
        let updates = record(&config, topics::CONFIG_UPDATED);
        let restarts = record(&config, topics::BOT_RESTART_REQUIRED);
        let roles = record(&config, topics::ROLE_CONFIG_CHANGED);

        let mut batch = BTreeMap::new();
        batch.insert(keys::GENIUS_CLIENT_ID.to_string(), "client".to_string());
        batch.insert("ROLE_STAFF".to_string(), "123".to_string());
        batch.insert(keys::CMD_PREFIX.to_string(), "!".to_string());

        assert!(config.update_multiple(&batch).unwrap());
        assert!(!config.update_multiple(&batch).unwrap());

        assert_eq!(updates.lock().len(), 1);
        assert_eq!(updates.lock()[0]["changes"].as_object().unwrap().len(), 3);
        assert_eq!(
            restarts.lock()[0]["changed_keys"],
            json!([keys::GENIUS_CLIENT_ID])
        );
        assert_eq!(roles.lock()[0]["role_changes"]["ROLE_STAFF"]["new"], "123");
        assert_eq!(config.get_id("ROLE_STAFF"), Some(123));
    }

    #[test]
    fn test_role_key_event() {
        let config = config();
        let roles = record(&config, topics::ROLE_CONFIG_CHANGED);

        config.set("ROLE_EDITOR", "555").unwrap();
        assert_eq!(roles.lock()[0]["role_key"], "ROLE_EDITOR");
    }

    #[test]
    fn test_env_fallback() {
        let config = config();
        std::env::set_var("GEEBOT_TEST_FALLBACK", "from-env");

        assert_eq!(config.get("GEEBOT_TEST_FALLBACK", "default"), "from-env");
        config.set("GEEBOT_TEST_FALLBACK", "stored").unwrap();
        assert_eq!(config.get("GEEBOT_TEST_FALLBACK", "default"), "stored");
        assert_eq!(config.get("GEEBOT_TEST_MISSING_KEY", "default"), "default");

        std::env::remove_var("GEEBOT_TEST_FALLBACK");
    }

    #[test]
    fn test_defaults_and_missing() {
        let config = config();
        assert!(config.init_default_configs().unwrap() > 0);
        assert_eq!(config.init_default_configs().unwrap(), 0);

        assert_eq!(config.prefix(), keys::DEFAULT_PREFIX);
        assert!(config.command_enabled("ENABLE_COMMAND_PING"));
        assert!(config.missing_configs().contains(&keys::VERIFIED_ROLE_ID));
    }

    #[test]
    fn test_get_id_rejects_garbage() {
        let config = config();
        config.set(keys::VERIFIED_ROLE_ID, "not-a-number").unwrap();
        assert_eq!(config.get_id(keys::VERIFIED_ROLE_ID), None);
    }

    #[test]
    fn test_reload_sees_other_writer() {
        let config = config();
        config.store().upsert(keys::BASE_URL, "https://bot.example", None, None).unwrap();

        assert_ne!(config.get(keys::BASE_URL, ""), "https://bot.example");
        config.reload().unwrap();
        assert_eq!(config.base_url(), "https://bot.example");
    }

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token("\"Bot abc.def\""), "abc.def");
        assert_eq!(normalize_token("  abc.def "), "abc.def");
        assert_eq!(normalize_token("'Bot x'"), "x");
    }
}
