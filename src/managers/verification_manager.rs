use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::role_manager::MemberRoleSync;
use crate::config::{keys, SharedConfig};
use crate::error::{BotError, Result};
use crate::genius::{redirect_uri, GeniusAccount, GeniusApi};
use crate::state::{SharedVerificationDb, Verification};

/// Outcome of a successful OAuth callback.
pub struct CompletedVerification {
    pub discord_id: u64,
    pub account: GeniusAccount,
    /// Background role assignment. Dropping the handle detaches it.
    pub role_sync: JoinHandle<()>,
}

/// Drives the OAuth verification flow.
pub struct VerificationManager {
    db: SharedVerificationDb,
    config: SharedConfig,
    genius: Arc<dyn GeniusApi>,
    roles: Arc<dyn MemberRoleSync>,
}

impl VerificationManager {
    pub fn new(
        db: SharedVerificationDb,
        config: SharedConfig,
        genius: Arc<dyn GeniusApi>,
        roles: Arc<dyn MemberRoleSync>,
    ) -> Self {
        Self {
            db,
            config,
            genius,
            roles,
        }
    }

    pub fn db(&self) -> &SharedVerificationDb {
        &self.db
    }

    /// Create a single-use state for `discord_id` and return the link the
    /// member should open.
    pub fn begin(&self, discord_id: u64) -> Result<String> {
        if self.db.is_verified(discord_id)? {
            return Err(BotError::AlreadyVerified { discord_id });
        }
        let base_url = self.config.base_url();
        if base_url.is_empty() {
            return Err(BotError::ConfigMissing {
                key: keys::BASE_URL.to_string(),
            });
        }

        let state = uuid::Uuid::new_v4().to_string();
        self.db.create_pending_verification(&state, discord_id)?;
        debug!("Verification started for {}", discord_id);
        Ok(format!("{}/auth?state={}", base_url, state))
    }

    /// Finish a verification from the Genius callback parameters.
    ///
    /// The record is saved before roles are touched; role assignment runs on
    /// a background task and its failures are only logged.
    pub async fn complete(&self, code: &str, state: &str) -> Result<CompletedVerification> {
        let redirect = redirect_uri(&self.config.base_url());
        let access_token = self.genius.exchange_code(code, &redirect).await?;
        let account = self.genius.fetch_account(&access_token).await?;

        let discord_id = self
            .db
            .take_pending_verification(state)?
            .ok_or(BotError::UnknownState)?;

        self.db.save_verification(&Verification {
            discord_id,
            genius_id: account.id,
            genius_username: account.login.clone(),
            genius_display_name: account.name.clone(),
            genius_roles: account.roles.clone(),
            access_token,
            verified_at: String::new(),
        })?;
        info!(
            "Discord user {} verified as Genius '{}' ({:?})",
            discord_id, account.login, account.roles
        );

        let roles = self.roles.clone();
        let synced = account.clone();
        let role_sync = tokio::spawn(async move {
            if let Err(e) = roles.apply_verification(discord_id, &synced).await {
                error!("Role assignment for {} failed: {}", discord_id, e);
            }
        });

        Ok(CompletedVerification {
            discord_id,
            account,
            role_sync,
        })
    }
}

pub type SharedVerificationManager = Arc<VerificationManager>;

pub fn create_shared_verification_manager(
    db: SharedVerificationDb,
    config: SharedConfig,
    genius: Arc<dyn GeniusApi>,
    roles: Arc<dyn MemberRoleSync>,
) -> SharedVerificationManager {
    Arc::new(VerificationManager::new(db, config, genius, roles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, DynamicConfig};
    use crate::genius::GeniusUser;
    use crate::managers::role_manager::RoleSyncReport;
    use crate::notify::{EventBus, SignalQueue};
    use crate::state::VerificationDb;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FakeGenius;

    #[async_trait]
    impl GeniusApi for FakeGenius {
        async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String> {
            assert_eq!(redirect_uri, "https://bot.example/callback");
            match code {
                "good" => Ok("token-123".to_string()),
                _ => Err(BotError::GeniusStatus {
                    endpoint: "/oauth/token",
                    status: 400,
                    body: "bad code".to_string(),
                }),
            }
        }

        async fn fetch_account(&self, access_token: &str) -> Result<GeniusAccount> {
            assert_eq!(access_token, "token-123");
            GeniusUser {
                id: Some(77),
                login: Some("annotator".to_string()),
                name: Some("The Annotator".to_string()),
                roles_for_display: vec!["verified_artist".to_string(), "editor".to_string()],
                ..Default::default()
            }
            .into_account()
        }
    }

    #[derive(Default)]
    struct RecordingSync {
        calls: Mutex<Vec<(u64, Vec<String>)>>,
    }

    #[async_trait]
    impl MemberRoleSync for RecordingSync {
        async fn apply_verification(&self, discord_id: u64, account: &GeniusAccount) -> Result<RoleSyncReport> {
            self.calls.lock().push((discord_id, account.roles.clone()));
            Ok(RoleSyncReport::default())
        }
    }

    fn setup() -> (VerificationManager, SharedVerificationDb, Arc<RecordingSync>) {
        let config = DynamicConfig::new(
            ConfigStore::open_in_memory().unwrap(),
            Arc::new(EventBus::new()),
            Arc::new(SignalQueue::open_in_memory().unwrap()),
        )
        .unwrap();
        config.set(keys::BASE_URL, "https://bot.example/").unwrap();

        let db = Arc::new(VerificationDb::open_in_memory().unwrap());
        let sync = Arc::new(RecordingSync::default());
        let manager = VerificationManager::new(db.clone(), Arc::new(config), Arc::new(FakeGenius), sync.clone());
        (manager, db, sync)
    }

    #[tokio::test]
    async fn test_callback_end_to_end() {
        let (manager, db, sync) = setup();
        db.create_pending_verification("S", 42).unwrap();

        let done = manager.complete("good", "S").await.unwrap();
        done.role_sync.await.unwrap();

        assert_eq!(done.discord_id, 42);
        let stored = db.get_verification(42).unwrap().unwrap();
        assert_eq!(stored.genius_id, 77);
        assert_eq!(stored.genius_roles, vec!["Verified Artist", "Editor"]);
        assert_eq!(db.take_pending_verification("S").unwrap(), None);
        assert_eq!(
            *sync.calls.lock(),
            vec![(42, vec!["Verified Artist".to_string(), "Editor".to_string()])]
        );
    }

    #[tokio::test]
    async fn test_unknown_state_saves_nothing() {
        let (manager, db, sync) = setup();

        let result = manager.complete("good", "missing").await;
        assert!(matches!(result, Err(BotError::UnknownState)));
        assert_eq!(db.verified_count().unwrap(), 0);
        assert!(sync.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_bad_code_keeps_pending() {
        let (manager, db, _) = setup();
        db.create_pending_verification("S", 42).unwrap();

        assert!(manager.complete("bad", "S").await.is_err());
        assert_eq!(db.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_begin_builds_link_and_refuses_verified() {
        let (manager, db, _) = setup();

        let link = manager.begin(5).unwrap();
        assert!(link.starts_with("https://bot.example/auth?state="));
        assert_eq!(db.pending_count().unwrap(), 1);

        db.save_verification(&Verification {
            discord_id: 6,
            genius_id: 1,
            genius_username: "x".into(),
            genius_display_name: "x".into(),
            genius_roles: vec![],
            access_token: String::new(),
            verified_at: String::new(),
        })
        .unwrap();
        assert!(matches!(
            manager.begin(6),
            Err(BotError::AlreadyVerified { discord_id: 6 })
        ));
    }
}
