use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Runtime facts about this process, shared by the gateway handlers and the
/// web server.
#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    pub instance_id: String,
    pub started_at: DateTime<Utc>,
    pub ready: bool,
    pub bot_name: Option<String>,
    pub guild_count: usize,
    pub latency_ms: Option<u64>,
}

impl BotStatus {
    pub fn new() -> Self {
        Self {
            instance_id: new_instance_id(),
            started_at: Utc::now(),
            ready: false,
            bot_name: None,
            guild_count: 0,
            latency_ms: None,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }

    pub fn status_label(&self) -> &'static str {
        if self.ready {
            "online"
        } else {
            "offline"
        }
    }
}

impl Default for BotStatus {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedBotStatus = Arc<RwLock<BotStatus>>;

pub fn create_shared_bot_status() -> SharedBotStatus {
    Arc::new(RwLock::new(BotStatus::new()))
}

/// First eight characters of a v4 uuid.
pub fn new_instance_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_shape() {
        let id = new_instance_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_instance_id());
    }

    #[test]
    fn test_new_status_is_offline() {
        let status = BotStatus::new();
        assert_eq!(status.status_label(), "offline");
        assert!(status.uptime_seconds() < 5);
    }
}
