//! Genius OAuth and account API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use super::roles::map_genius_roles;
use crate::config::{keys, SharedConfig};
use crate::error::{BotError, Result};

pub const GENIUS_API_BASE: &str = "https://api.genius.com";

/// What the bot keeps from a Genius account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeniusAccount {
    pub id: u64,
    pub login: String,
    /// Display name, falling back to the login.
    pub name: String,
    pub roles: Vec<String>,
    pub iq: i64,
    pub avatar_url: Option<String>,
}

/// Raw `response.user` object from `GET /account`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeniusUser {
    pub id: Option<u64>,
    pub login: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub roles_for_display: Vec<String>,
    pub role_for_display: Option<String>,
    pub human_readable_role_for_display: Option<String>,
    pub staff: Option<bool>,
    pub is_staff: Option<bool>,
    pub artist: Option<GeniusArtist>,
    pub iq: Option<i64>,
    pub avatar: Option<GeniusAvatar>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeniusArtist {
    pub is_verified: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeniusAvatar {
    pub medium: Option<GeniusImage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeniusImage {
    pub url: Option<String>,
}

impl GeniusUser {
    pub fn into_account(self) -> Result<GeniusAccount> {
        let roles = map_genius_roles(&self);
        let id = self.id.ok_or(BotError::GeniusResponse { field: "id" })?;
        let login = self.login.unwrap_or_default();
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| login.clone());
        Ok(GeniusAccount {
            id,
            login,
            name,
            roles,
            iq: self.iq.unwrap_or(0),
            avatar_url: self.avatar.and_then(|a| a.medium).and_then(|m| m.url),
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct AccountEnvelope {
    response: AccountResponse,
}

#[derive(Deserialize)]
struct AccountResponse {
    user: GeniusUser,
}

/// Genius operations used by the OAuth callback.
#[async_trait]
pub trait GeniusApi: Send + Sync {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String>;
    async fn fetch_account(&self, access_token: &str) -> Result<GeniusAccount>;
}

pub struct GeniusClient {
    http: reqwest::Client,
    config: SharedConfig,
    api_base: String,
}

impl GeniusClient {
    pub fn new(config: SharedConfig) -> Result<Self> {
        Self::with_base(config, GENIUS_API_BASE)
    }

    pub fn with_base(config: SharedConfig, api_base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            config,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn credentials(&self) -> Result<(String, String)> {
        let client_id = self
            .config
            .get_opt(keys::GENIUS_CLIENT_ID)
            .ok_or_else(|| BotError::ConfigMissing {
                key: keys::GENIUS_CLIENT_ID.to_string(),
            })?;
        let secret = self
            .config
            .get_opt(keys::GENIUS_CLIENT_SECRET)
            .ok_or_else(|| BotError::ConfigMissing {
                key: keys::GENIUS_CLIENT_SECRET.to_string(),
            })?;
        Ok((client_id, secret))
    }
}

#[async_trait]
impl GeniusApi for GeniusClient {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String> {
        let (client_id, client_secret) = self.credentials()?;

        let response = self
            .http
            .post(format!("{}/oauth/token", self.api_base))
            .form(&[
                ("code", code),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Genius token exchange failed: {} - {}", status, body);
            return Err(BotError::GeniusStatus {
                endpoint: "/oauth/token",
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        debug!("Genius access token received");
        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(BotError::GeniusResponse {
                field: "access_token",
            })
    }

    async fn fetch_account(&self, access_token: &str) -> Result<GeniusAccount> {
        let response = self
            .http
            .get(format!("{}/account", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Genius account request failed: {} - {}", status, body);
            return Err(BotError::GeniusStatus {
                endpoint: "/account",
                status: status.as_u16(),
                body,
            });
        }

        let envelope: AccountEnvelope = response.json().await?;
        let account = envelope.response.user.into_account()?;
        info!(
            "Genius account '{}' (IQ {}) roles: {:?}",
            account.login, account.iq, account.roles
        );
        Ok(account)
    }
}

/// Authorization page the member is redirected to.
pub fn authorize_url(client_id: &str, redirect_uri: &str, state: &str) -> String {
    format!(
        "{}/oauth/authorize?client_id={}&redirect_uri={}&scope=me&state={}&response_type=code",
        GENIUS_API_BASE,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(state),
    )
}

pub fn redirect_uri(base_url: &str) -> String {
    format!("{}/callback", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_encodes_params() {
        let url = authorize_url("abc", "https://bot.example/callback", "s t");
        assert!(url.starts_with("https://api.genius.com/oauth/authorize?"));
        assert!(url.contains("client_id=abc"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fbot.example%2Fcallback"));
        assert!(url.contains("state=s%20t"));
        assert!(url.contains("scope=me"));
        assert!(url.ends_with("response_type=code"));
    }

    #[test]
    fn test_account_from_json() {
        let body = r#"{
            "response": {
                "user": {
                    "id": 99,
                    "login": "lyricist",
                    "name": "",
                    "iq": 1500,
                    "roles_for_display": ["editor"],
                    "avatar": {"medium": {"url": "https://img.example/a.png"}}
                }
            }
        }"#;
        let envelope: AccountEnvelope = serde_json::from_str(body).unwrap();
        let account = envelope.response.user.into_account().unwrap();

        assert_eq!(account.id, 99);
        assert_eq!(account.name, "lyricist");
        assert_eq!(account.roles, vec!["Editor"]);
        assert_eq!(account.avatar_url.as_deref(), Some("https://img.example/a.png"));
    }

    #[test]
    fn test_account_without_id_is_error() {
        let user = GeniusUser::default();
        assert!(matches!(
            user.into_account(),
            Err(BotError::GeniusResponse { field: "id" })
        ));
    }

    #[test]
    fn test_redirect_uri() {
        assert_eq!(redirect_uri("https://bot.example/"), "https://bot.example/callback");
    }
}
