//! Liveness and status endpoints, the success page and the request counter.

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use tracing::warn;

use super::pages;
use super::WebState;
use crate::config::keys;
use crate::services::KeepAliveStats;

#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    format: Option<String>,
}

impl FormatQuery {
    pub fn wants_json(&self) -> bool {
        self.format.as_deref() == Some("json")
    }
}

/// `/ping` and `/health`, served in every mode.
pub fn health_router() -> Router<WebState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
}

/// `/status` and `/success`, served next to the OAuth routes.
pub fn public_router() -> Router<WebState> {
    Router::new()
        .route("/status", get(status))
        .route("/success", get(success))
}

/// Counts every request for the status report.
pub async fn count_requests(State(state): State<WebState>, request: Request, next: Next) -> Response {
    state.requests.fetch_add(1, Ordering::Relaxed);
    next.run(request).await
}

/// `Xd Yh Zm`, `Yh Zm`, `Zm`, or `Ns`.
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds % 60)
    }
}

/// Resident set size in MB, 0 where `/proc` is unavailable.
pub fn memory_usage_mb() -> f64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<f64>().ok())
        })
        .map(|kb| kb / 1024.0)
        .unwrap_or(0.0)
}

#[derive(Debug, Serialize)]
pub struct PingReport {
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub instance_id: String,
}

#[derive(Debug, Serialize)]
pub struct BotSection {
    pub status: &'static str,
    pub name: Option<String>,
    pub guilds_count: usize,
    pub latency: String,
}

#[derive(Debug, Serialize)]
pub struct ServerSection {
    pub status: &'static str,
    pub requests_count: u64,
    pub memory_mb: f64,
}

#[derive(Debug, Serialize)]
pub struct DatabaseSection {
    pub status: &'static str,
    pub verified_users: i64,
    pub pending_verifications: i64,
    pub verified_last_24h: i64,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub uptime_human: String,
    pub start_time: String,
    pub instance_id: String,
    pub bot: BotSection,
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub configured: bool,
    pub keep_alive: Option<KeepAliveStats>,
}

pub async fn ping_report(state: &WebState) -> PingReport {
    let status = state.bot_status.read().await;
    PingReport {
        status: "alive",
        message: "Bot server is running",
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_seconds: status.uptime_seconds(),
        instance_id: status.instance_id.clone(),
    }
}

pub async fn status_report(state: &WebState) -> StatusReport {
    let (bot, uptime_seconds, start_time, instance_id) = {
        let status = state.bot_status.read().await;
        let bot = BotSection {
            status: if status.ready { "ready" } else { "connecting" },
            name: status.bot_name.clone(),
            guilds_count: status.guild_count,
            latency: status
                .latency_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_else(|| "N/A".to_string()),
        };
        (
            bot,
            status.uptime_seconds(),
            status.started_at.format("%d/%m/%Y %H:%M:%S").to_string(),
            status.instance_id.clone(),
        )
    };

    let database = match state.verification_db.stats() {
        Ok(stats) => DatabaseSection {
            status: "connected",
            verified_users: stats.total_verified,
            pending_verifications: stats.pending,
            verified_last_24h: stats.verified_last_24h,
        },
        Err(e) => {
            warn!("Error getting verification stats: {}", e);
            DatabaseSection {
                status: "error",
                verified_users: 0,
                pending_verifications: 0,
                verified_last_24h: 0,
            }
        }
    };

    StatusReport {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_seconds,
        uptime_human: format_uptime(uptime_seconds),
        start_time,
        instance_id,
        bot,
        server: ServerSection {
            status: "running",
            requests_count: state.requests.load(Ordering::Relaxed),
            memory_mb: (memory_usage_mb() * 10.0).round() / 10.0,
        },
        database,
        configured: state.config.is_configured(),
        keep_alive: state.keep_alive.as_ref().map(|service| service.stats()),
    }
}

fn render<T: Serialize>(title: &str, query: &FormatQuery, report: T) -> Response {
    if query.wants_json() {
        return Json(report).into_response();
    }
    match serde_json::to_value(&report) {
        Ok(value) => Html(pages::report_page(title, &value)).into_response(),
        Err(e) => {
            warn!("Failed to render {} page: {}", title, e);
            Json(report).into_response()
        }
    }
}

/// GET /ping
async fn ping(State(state): State<WebState>, Query(query): Query<FormatQuery>) -> Response {
    render("Ping", &query, ping_report(&state).await)
}

/// GET /health
async fn health(State(state): State<WebState>, Query(query): Query<FormatQuery>) -> Response {
    render("Health", &query, status_report(&state).await)
}

/// GET /status
async fn status(State(state): State<WebState>, Query(query): Query<FormatQuery>) -> Response {
    render("Status", &query, status_report(&state).await)
}

/// GET /success
async fn success(State(state): State<WebState>) -> Html<String> {
    let message = state.config.get(
        keys::SUCCESS_VERIFICATION_MESSAGE,
        "Your Genius account has been verified.",
    );
    Html(pages::success_page(&message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "0s");
        assert_eq!(format_uptime(59), "59s");
        assert_eq!(format_uptime(60), "1m");
        assert_eq!(format_uptime(3_725), "1h 2m");
        assert_eq!(format_uptime(90_061), "1d 1h 1m");
        assert_eq!(format_uptime(86_400), "1d 0h 0m");
    }

    #[test]
    fn test_format_query() {
        let json = FormatQuery {
            format: Some("json".to_string()),
        };
        assert!(json.wants_json());
        assert!(!FormatQuery::default().wants_json());
    }

    #[tokio::test]
    async fn test_ping_json_and_request_counter() {
        let (state, db) = crate::web::test_support::test_state();
        db.create_pending_verification("S", 1).unwrap();
        let instance_id = state.bot_status.read().await.instance_id.clone();
        let base = crate::web::test_support::serve(state).await;

        let ping: serde_json::Value = reqwest::get(format!("{}/ping?format=json", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ping["status"], "alive");
        assert_eq!(ping["message"], "Bot server is running");
        assert_eq!(ping["instance_id"], instance_id.as_str());

        let html = reqwest::get(format!("{}/ping", base)).await.unwrap().text().await.unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));

        let health: serde_json::Value = reqwest::get(format!("{}/health?format=json", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["server"]["requests_count"], 3);
        assert_eq!(health["database"]["status"], "connected");
        assert_eq!(health["database"]["pending_verifications"], 1);
        assert_eq!(health["bot"]["status"], "connecting");
    }
}
