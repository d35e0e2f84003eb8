//! Periodic self-ping so the host does not idle the process.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::keys::MIN_KEEP_ALIVE_SECS;
use crate::error::{BotError, Result};
use crate::web::status::format_uptime;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, Serialize)]
pub struct KeepAliveStats {
    pub pings_sent: u64,
    pub pings_successful: u64,
    pub pings_failed: u64,
    pub last_ping: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
}

impl KeepAliveStats {
    /// Percentage of successful pings, 0 before the first ping.
    pub fn success_rate(&self) -> f64 {
        if self.pings_sent == 0 {
            0.0
        } else {
            self.pings_successful as f64 / self.pings_sent as f64 * 100.0
        }
    }
}

pub struct KeepAliveService {
    base_url: String,
    interval: Duration,
    http: reqwest::Client,
    stats: Mutex<KeepAliveStats>,
    running: AtomicBool,
}

pub type SharedKeepAlive = Arc<KeepAliveService>;

impl KeepAliveService {
    /// Intervals below [`MIN_KEEP_ALIVE_SECS`] are raised to it.
    pub fn new(base_url: &str, interval: Duration) -> Result<Self> {
        let floor = Duration::from_secs(MIN_KEEP_ALIVE_SECS);
        if interval < floor {
            warn!(
                "Keep-alive interval {}s is below {}s, using {}s",
                interval.as_secs(),
                MIN_KEEP_ALIVE_SECS,
                MIN_KEEP_ALIVE_SECS
            );
        }
        let interval = interval.max(floor);
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            interval,
            http,
            stats: Mutex::new(KeepAliveStats::default()),
            running: AtomicBool::new(false),
        })
    }

    pub fn ping_url(&self) -> String {
        format!("{}/ping?format=json", self.base_url)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> KeepAliveStats {
        self.stats.lock().clone()
    }

    /// Spawn the ping loop. Returns `None` when already running.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Keep-alive already running");
            return None;
        }
        self.stats.lock().start_time = Some(Utc::now());
        info!(
            "Keep-alive started: {} every {}s",
            self.ping_url(),
            self.interval.as_secs()
        );

        let service = self.clone();
        Some(tokio::spawn(async move {
            while service.is_running() {
                let wait = match service.ping_once().await {
                    Ok(()) => service.interval,
                    Err(_) => RETRY_AFTER.min(service.interval),
                };
                tokio::time::sleep(wait).await;
            }
            info!("Keep-alive stopped");
        }))
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// One ping, recorded in the stats.
    pub async fn ping_once(&self) -> Result<()> {
        {
            let mut stats = self.stats.lock();
            stats.pings_sent += 1;
            stats.last_ping = Some(Utc::now());
        }

        let outcome = self.send_ping().await;

        let mut stats = self.stats.lock();
        match &outcome {
            Ok(uptime) => {
                stats.pings_successful += 1;
                stats.last_success = Some(Utc::now());
                match uptime {
                    Some(secs) => info!("Keep-alive ping ok, server uptime {}", format_uptime(*secs)),
                    None => info!("Keep-alive ping ok"),
                }
            }
            Err(e) => {
                stats.pings_failed += 1;
                stats.last_error = Some(e.to_string());
                error!("Keep-alive ping failed: {}", e);
            }
        }
        outcome.map(|_| ())
    }

    async fn send_ping(&self) -> Result<Option<u64>> {
        let url = self.ping_url();
        debug!("Pinging {}", url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BotError::Internal {
                message: format!("HTTP {}", status.as_u16()),
            });
        }
        // A 200 without JSON still counts as alive
        let uptime = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body.get("uptime_seconds").and_then(|v| v.as_u64()));
        Ok(uptime)
    }

    /// Single ping outside the loop.
    pub async fn health_check(&self) -> bool {
        self.ping_once().await.is_ok()
    }
}

pub fn create_keep_alive(base_url: &str, interval: Duration) -> Result<SharedKeepAlive> {
    Ok(Arc::new(KeepAliveService::new(base_url, interval)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_successful_ping_updates_stats() {
        let base = serve(Router::new().route(
            "/ping",
            get(|| async { Json(serde_json::json!({"status": "alive", "uptime_seconds": 90})) }),
        ))
        .await;
        let service = KeepAliveService::new(&base, Duration::from_secs(300)).unwrap();

        assert!(service.health_check().await);
        let stats = service.stats();
        assert_eq!(stats.pings_sent, 1);
        assert_eq!(stats.pings_successful, 1);
        assert!(stats.last_success.is_some());
        assert_eq!(stats.success_rate(), 100.0);
    }

    #[tokio::test]
    async fn test_failed_ping_records_error() {
        let base = serve(Router::new().route(
            "/ping",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;
        let service = KeepAliveService::new(&base, Duration::from_secs(300)).unwrap();

        assert!(service.ping_once().await.is_err());
        let stats = service.stats();
        assert_eq!(stats.pings_failed, 1);
        assert_eq!(stats.last_error.as_deref(), Some("Internal error: HTTP 503"));
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn test_ping_url() {
        let service = KeepAliveService::new("https://bot.example/", Duration::from_secs(1)).unwrap();
        assert_eq!(service.ping_url(), "https://bot.example/ping?format=json");
    }

    #[test]
    fn test_interval_floor() {
        let zero = KeepAliveService::new("https://bot.example", Duration::ZERO).unwrap();
        assert_eq!(zero.interval(), Duration::from_secs(MIN_KEEP_ALIVE_SECS));

        let slow = KeepAliveService::new("https://bot.example", Duration::from_secs(600)).unwrap();
        assert_eq!(slow.interval(), Duration::from_secs(600));
    }
}
