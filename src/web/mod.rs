//! Web server for the Genius OAuth flow, status endpoints and control panel
//!
//! Runs alongside the Discord bot, or alone in panel mode sharing the SQLite
//! files with the bot process.

mod auth;
mod oauth;
mod pages;
mod panel;
mod server;
pub mod status;

pub use auth::{hash_password, PanelCredentials};
pub use server::{build_router, serve, RunMode, WebServerConfig, WebState};

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    use super::{build_router, PanelCredentials, RunMode, WebState};
    use crate::config::{keys, ConfigStore, DynamicConfig};
    use crate::error::{BotError, Result};
    use crate::genius::{GeniusAccount, GeniusApi, GeniusUser};
    use crate::logging::create_log_buffer;
    use crate::managers::{create_shared_verification_manager, MemberRoleSync, RoleSyncReport};
    use crate::notify::{EventBus, SignalQueue};
    use crate::state::{create_shared_bot_status, SharedVerificationDb, VerificationDb};

    struct FakeGenius;

    #[async_trait]
    impl GeniusApi for FakeGenius {
        async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<String> {
            match code {
                "good" => Ok("token".to_string()),
                _ => Err(BotError::GeniusStatus {
                    endpoint: "/oauth/token",
                    status: 400,
                    body: "bad code".to_string(),
                }),
            }
        }

        async fn fetch_account(&self, _access_token: &str) -> Result<GeniusAccount> {
            GeniusUser {
                id: Some(9),
                login: Some("lyricist".to_string()),
                ..Default::default()
            }
            .into_account()
        }
    }

    struct NoopSync;

    #[async_trait]
    impl MemberRoleSync for NoopSync {
        async fn apply_verification(&self, _discord_id: u64, _account: &GeniusAccount) -> Result<RoleSyncReport> {
            Ok(RoleSyncReport::default())
        }
    }

    /// Unified-mode state over in-memory stores with Genius configured.
    pub fn test_state() -> (WebState, SharedVerificationDb) {
        let config = Arc::new(
            DynamicConfig::new(
                ConfigStore::open_in_memory().unwrap(),
                Arc::new(EventBus::new()),
                Arc::new(SignalQueue::open_in_memory().unwrap()),
            )
            .unwrap(),
        );
        config.init_default_configs().unwrap();
        config.set(keys::GENIUS_CLIENT_ID, "client").unwrap();
        config.set(keys::GENIUS_CLIENT_SECRET, "secret").unwrap();
        config.set(keys::BASE_URL, "https://bot.example").unwrap();

        let db = Arc::new(VerificationDb::open_in_memory().unwrap());
        let verifications = create_shared_verification_manager(
            db.clone(),
            config.clone(),
            Arc::new(FakeGenius),
            Arc::new(NoopSync),
        );

        let state = WebState {
            config,
            verification_db: db.clone(),
            verifications,
            bot_status: create_shared_bot_status(),
            log_buffer: create_log_buffer(16),
            keep_alive: None,
            credentials: Arc::new(PanelCredentials::new("admin", None)),
            requests: Arc::new(AtomicU64::new(0)),
        };
        (state, db)
    }

    /// Serve the unified router on an ephemeral port and return its base URL.
    pub async fn serve(state: WebState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_router(RunMode::Unified, state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }
}
