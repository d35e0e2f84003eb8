//! In-process publish/subscribe.
//!
//! Synchronous listeners run inline on the emitting thread in registration
//! order. Asynchronous listeners are spawned on the runtime bound through
//! [`EventBus::bind_runtime`], so `emit` can be called from any thread
//! (including blocking SQLite work) and still reach async code.

use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

pub type SyncListener = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;
pub type AsyncListener = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct EventBus {
    listeners: DashMap<String, Vec<(SubscriptionId, SyncListener)>>,
    async_listeners: DashMap<String, Vec<(SubscriptionId, AsyncListener)>>,
    runtime: RwLock<Option<Handle>>,
    next_id: AtomicU64,
}

pub type SharedEventBus = Arc<EventBus>;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            async_listeners: DashMap::new(),
            runtime: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Runtime that async listeners are scheduled on.
    pub fn bind_runtime(&self, handle: Handle) {
        *self.runtime.write() = Some(handle);
    }

    pub fn subscribe<F>(&self, event: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        debug!("Subscribed listener {:?} to '{}'", id, event);
        id
    }

    pub fn subscribe_async<F, Fut>(&self, event: &str, listener: F) -> SubscriptionId
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.next_id();
        let boxed: AsyncListener = Arc::new(move |payload| Box::pin(listener(payload)));
        self.async_listeners
            .entry(event.to_string())
            .or_default()
            .push((id, boxed));
        debug!("Subscribed async listener {:?} to '{}'", id, event);
        id
    }

    /// Remove a listener. Returns false when the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for mut entry in self.listeners.iter_mut() {
            let before = entry.len();
            entry.retain(|(sub, _)| *sub != id);
            removed |= entry.len() != before;
        }
        for mut entry in self.async_listeners.iter_mut() {
            let before = entry.len();
            entry.retain(|(sub, _)| *sub != id);
            removed |= entry.len() != before;
        }
        removed
    }

    pub fn emit(&self, event: &str, payload: Value) {
        // Clone out of the maps so listeners may subscribe or emit themselves
        let sync: Vec<SyncListener> = self
            .listeners
            .get(event)
            .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();
        let asynchronous: Vec<AsyncListener> = self
            .async_listeners
            .get(event)
            .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();

        for listener in sync {
            if let Err(e) = listener(&payload) {
                error!("Listener for '{}' failed: {:#}", event, e);
            }
        }

        if asynchronous.is_empty() {
            return;
        }

        let runtime = self.runtime.read().clone();
        let Some(handle) = runtime else {
            warn!(
                "No runtime bound, dropping {} async listener(s) for '{}'",
                asynchronous.len(),
                event
            );
            return;
        };

        for listener in asynchronous {
            let fut = listener(payload.clone());
            let event = event.to_string();
            handle.spawn(async move {
                if let Err(e) = fut.await {
                    error!("Async listener for '{}' failed: {:#}", event, e);
                }
            });
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        let sync = self.listeners.get(event).map(|l| l.len()).unwrap_or(0);
        let asynchronous = self.async_listeners.get(event).map(|l| l.len()).unwrap_or(0);
        sync + asynchronous
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

pub fn create_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_sync_listeners_run_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            bus.subscribe("config_updated", move |payload| {
                seen.lock().push(format!("{}:{}", tag, payload["key"].as_str().unwrap_or("")));
                Ok(())
            });
        }

        bus.emit("config_updated", json!({"key": "CMD_PREFIX"}));
        assert_eq!(
            *seen.lock(),
            vec!["first:CMD_PREFIX".to_string(), "second:CMD_PREFIX".to_string()]
        );
    }

    #[test]
    fn test_failing_listener_does_not_stop_others() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicU64::new(0));

        bus.subscribe("role_config_changed", |_| anyhow::bail!("boom"));
        let counter = hits.clone();
        bus.subscribe("role_config_changed", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit("role_config_changed", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        let id = bus.subscribe("config_updated", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit("config_updated", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count("config_updated"), 0);
    }

    #[tokio::test]
    async fn test_async_listener_runs_on_bound_runtime() {
        let bus = Arc::new(EventBus::new());
        bus.bind_runtime(Handle::current());

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe_async("bot_restart_required", move |payload| {
            let tx = tx.clone();
            async move {
                tx.send(payload)?;
                Ok(())
            }
        });

        // Emit from a plain thread, as blocking SQLite writers do
        let emitter = bus.clone();
        std::thread::spawn(move || {
            emitter.emit("bot_restart_required", json!({"reason": "test"}));
        })
        .join()
        .unwrap();

        let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload["reason"], "test");
    }
}
