//! Detects a second copy of the bot behind the same public URL.
//!
//! Every process answers `/ping` with its instance id. Pinging our own URL a
//! few times shows which instances the load balancer routes to; all but the
//! lexicographically smallest id step down.

use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;

const STARTUP_DELAY: Duration = Duration::from_secs(10);
const RECHECK_EVERY: Duration = Duration::from_secs(120);

pub struct InstanceGuard {
    instance_id: String,
    ping_url: String,
    http: reqwest::Client,
}

impl InstanceGuard {
    pub fn new(instance_id: &str, base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            instance_id: instance_id.to_string(),
            ping_url: format!("{}/ping?format=json", base_url.trim_end_matches('/')),
            http,
        })
    }

    /// Ping our own URL `count` times and collect the instance ids seen.
    pub async fn collect_instance_ids(&self, count: usize, gap: Duration) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        for attempt in 0..count {
            if attempt > 0 {
                tokio::time::sleep(gap).await;
            }
            match self.fetch_instance_id().await {
                Ok(Some(id)) => {
                    ids.insert(id);
                }
                Ok(None) => debug!("Ping response without instance id"),
                Err(e) => debug!("Instance ping failed: {}", e),
            }
        }
        ids
    }

    async fn fetch_instance_id(&self) -> Result<Option<String>> {
        let body: serde_json::Value = self.http.get(&self.ping_url).send().await?.json().await?;
        Ok(body
            .get("instance_id")
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    /// Resolves once this process is found to be a duplicate. Never resolves
    /// otherwise.
    pub async fn watch(self) {
        tokio::time::sleep(STARTUP_DELAY).await;
        info!("Checking for duplicate instances (this is {})", self.instance_id);

        let mut ids = self
            .collect_instance_ids(5, Duration::from_millis(500))
            .await;
        loop {
            if is_duplicate(&self.instance_id, &ids) {
                warn!(
                    "Multiple instances detected {:?}; {} is not the primary, stepping down",
                    ids, self.instance_id
                );
                return;
            }
            if ids.len() > 1 {
                info!("Multiple instances detected {:?}; this one is primary", ids);
            }

            tokio::time::sleep(RECHECK_EVERY).await;
            debug!("Periodic duplicate-instance check");
            ids = self.collect_instance_ids(3, Duration::from_secs(1)).await;
        }
    }
}

/// Whether `own` should step down given the ids observed.
pub fn is_duplicate(own: &str, observed: &BTreeSet<String>) -> bool {
    observed.len() > 1 && observed.iter().next().is_some_and(|primary| primary != own)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_smallest_id_is_primary() {
        assert!(!is_duplicate("aaaa0000", &ids(&["aaaa0000", "bbbb1111"])));
        assert!(is_duplicate("bbbb1111", &ids(&["aaaa0000", "bbbb1111"])));
    }

    #[test]
    fn test_single_or_no_instance_is_fine() {
        assert!(!is_duplicate("bbbb1111", &ids(&["bbbb1111"])));
        assert!(!is_duplicate("bbbb1111", &ids(&["aaaa0000"])));
        assert!(!is_duplicate("bbbb1111", &ids(&[])));
    }

    #[tokio::test]
    async fn test_collects_alternating_ids() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/ping",
            get(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    let id = if n % 2 == 0 { "aaaa0000" } else { "bbbb1111" };
                    Json(serde_json::json!({ "instance_id": id }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let guard = InstanceGuard::new("bbbb1111", &format!("http://{}", addr)).unwrap();
        let seen = guard.collect_instance_ids(4, Duration::from_millis(10)).await;

        assert_eq!(seen, ids(&["aaaa0000", "bbbb1111"]));
        assert!(is_duplicate("bbbb1111", &seen));
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }
}
