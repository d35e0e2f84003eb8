//! Tracing setup plus an in-memory capture of recent log lines for the panel.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Lines kept for `/panel/logs`.
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(serialize_with = "serialize_level")]
    pub level: Level,
    pub target: String,
    pub message: String,
}

fn serialize_level<S: serde::Serializer>(level: &Level, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(level.as_str())
}

impl LogEntry {
    pub fn new(level: Level, target: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            level,
            target: target.to_string(),
            message: message.into(),
        }
    }

    pub fn format(&self) -> String {
        format!(
            "{} {:>5} [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.target,
            self.message
        )
    }

    /// CSS class used by the panel.
    pub fn css_class(&self) -> &'static str {
        match self.level {
            Level::ERROR => "log-error",
            Level::WARN => "log-warn",
            Level::INFO => "log-info",
            _ => "log-debug",
        }
    }
}

/// Ring of recent entries plus a live broadcast of new ones.
pub struct LogBuffer {
    tx: broadcast::Sender<LogEntry>,
    recent: RwLock<VecDeque<LogEntry>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, entry: LogEntry) {
        {
            let mut recent = self.recent.write();
            while recent.len() >= self.capacity {
                recent.pop_front();
            }
            recent.push_back(entry.clone());
        }
        // No receivers is fine
        let _ = self.tx.send(entry);
    }

    /// Up to `count` most recent entries, oldest first.
    pub fn recent(&self, count: usize) -> Vec<LogEntry> {
        let recent = self.recent.read();
        let skip = recent.len().saturating_sub(count);
        recent.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.recent.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }
}

pub type SharedLogBuffer = Arc<LogBuffer>;

pub fn create_log_buffer(capacity: usize) -> SharedLogBuffer {
    Arc::new(LogBuffer::new(capacity))
}

/// Layer that copies every event into a [`LogBuffer`].
pub struct LogCaptureLayer {
    buffer: SharedLogBuffer,
}

impl LogCaptureLayer {
    pub fn new(buffer: SharedLogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S> Layer<S> for LogCaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        self.buffer
            .push(LogEntry::new(*metadata.level(), metadata.target(), visitor.finish()));
    }
}

/// Collects the `message` field, then any other fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields.join(" "),
            (false, false) => format!("{} {}", self.message, self.fields.join(" ")),
        }
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }
}

/// Install the global subscriber: stdout formatting, INFO filter and capture.
pub fn init(buffer: SharedLogBuffer) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .with(LogCaptureLayer::new(buffer))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_keeps_order() {
        let buffer = create_log_buffer(3);
        buffer.push(LogEntry::new(Level::INFO, "test", "Message 1"));
        buffer.push(LogEntry::new(Level::WARN, "test", "Message 2"));

        let recent = buffer.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "Message 1");
        assert_eq!(recent[1].css_class(), "log-warn");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let buffer = create_log_buffer(2);
        for i in 1..=5 {
            buffer.push(LogEntry::new(Level::INFO, "test", format!("Message {}", i)));
        }

        let recent = buffer.recent(10);
        assert_eq!(buffer.len(), 2);
        assert_eq!(recent[0].message, "Message 4");
        assert_eq!(recent[1].message, "Message 5");
        assert_eq!(buffer.recent(1)[0].message, "Message 5");
    }

    #[test]
    fn test_layer_captures_fields() {
        let buffer = create_log_buffer(10);
        let subscriber = tracing_subscriber::registry().with(LogCaptureLayer::new(buffer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(guild = 7, "Role missing");
        });

        let recent = buffer.recent(1);
        assert_eq!(recent[0].level, Level::WARN);
        assert_eq!(recent[0].message, "Role missing guild=7");
    }

    #[tokio::test]
    async fn test_subscribers_receive_new_entries() {
        let buffer = create_log_buffer(10);
        let mut rx = buffer.subscribe();
        buffer.push(LogEntry::new(Level::ERROR, "test", "boom"));

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.message, "boom");
        assert_eq!(serde_json::to_value(&entry).unwrap()["level"], "ERROR");
    }
}
