//! Web server: public OAuth and status routes plus the control panel.

use axum::{middleware, Router};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::auth::PanelCredentials;
use super::{oauth, panel, status};
use crate::config::SharedConfig;
use crate::logging::SharedLogBuffer;
use crate::managers::SharedVerificationManager;
use crate::services::SharedKeepAlive;
use crate::state::{SharedBotStatus, SharedVerificationDb};

pub const DEFAULT_PORT: u16 = 8000;

/// Which surfaces this process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    /// Discord client plus the public OAuth and status routes
    Bot,
    /// Control panel only
    Panel,
    /// Everything in one process
    Unified,
}

impl RunMode {
    pub fn serves_public(self) -> bool {
        matches!(self, RunMode::Bot | RunMode::Unified)
    }

    pub fn serves_panel(self) -> bool {
        matches!(self, RunMode::Panel | RunMode::Unified)
    }

    pub fn runs_bot(self) -> bool {
        self.serves_public()
    }
}

/// Web server configuration
pub struct WebServerConfig {
    pub port: u16,
    /// Certificate PEM file; HTTPS is used when both paths exist
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cert_path: None,
            key_path: None,
        }
    }
}

impl WebServerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            cert_path: std::env::var("TLS_CERT_PATH").ok().map(PathBuf::from),
            key_path: std::env::var("TLS_KEY_PATH").ok().map(PathBuf::from),
        }
    }

    /// Certificate and key when both are configured and present on disk.
    pub fn tls_paths(&self) -> Option<(&PathBuf, &PathBuf)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) if cert.exists() && key.exists() => Some((cert, key)),
            (Some(cert), Some(key)) => {
                warn!(
                    "TLS paths configured but missing ({} / {}), serving plain HTTP",
                    cert.display(),
                    key.display()
                );
                None
            }
            _ => None,
        }
    }
}

/// Shared state for web handlers
#[derive(Clone)]
pub struct WebState {
    pub config: SharedConfig,
    pub verification_db: SharedVerificationDb,
    pub verifications: SharedVerificationManager,
    pub bot_status: SharedBotStatus,
    pub log_buffer: SharedLogBuffer,
    pub keep_alive: Option<SharedKeepAlive>,
    pub credentials: Arc<PanelCredentials>,
    pub requests: Arc<AtomicU64>,
}

/// Build the router for `mode`.
pub fn build_router(mode: RunMode, state: WebState) -> Router {
    let mut app = Router::new().merge(status::health_router());
    if mode.serves_public() {
        app = app
            .merge(status::public_router())
            .merge(oauth::oauth_router());
    }
    if mode.serves_panel() {
        app = app.nest("/panel", panel::panel_router(state.clone()));
    }

    app.layer(middleware::from_fn_with_state(
        state.clone(),
        status::count_requests,
    ))
    .layer(CorsLayer::permissive())
    .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(config: WebServerConfig, mode: RunMode, state: WebState) -> anyhow::Result<()> {
    let base_url = state.config.base_url();
    let app = build_router(mode, state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    if mode.serves_public() {
        info!("=== Genius OAuth Configuration ===");
        info!("Redirect URI to register with Genius: {}/callback", base_url);
    }
    if mode.serves_panel() {
        info!("Control panel available at /panel");
    }

    match config.tls_paths() {
        Some((cert_path, key_path)) => {
            info!("Loading TLS certificates:");
            info!("  Certificate: {}", cert_path.display());
            info!("  Private key: {}", key_path.display());
            let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .map_err(|e| anyhow::anyhow!(
                    "Failed to load TLS certificates: {}\n  Certificate: {}\n  Private key: {}",
                    e, cert_path.display(), key_path.display()
                ))?;
            info!("Web server listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Web server listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
