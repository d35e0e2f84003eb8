//! HTTP Basic authentication for the control panel.

use argon2::password_hash::{
    rand_core::OsRng, Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier,
    SaltString,
};
use argon2::Argon2;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{error, warn};

use super::pages;
use super::WebState;
use crate::error::{BotError, Result};

pub const REALM: &str = "GeeBot Panel";
pub const DEFAULT_USERNAME: &str = "admin";

/// Panel login. Without a password hash every attempt is refused.
#[derive(Debug, Clone)]
pub struct PanelCredentials {
    username: String,
    password_hash: Option<String>,
}

impl PanelCredentials {
    pub fn new(username: &str, password_hash: Option<String>) -> Self {
        Self {
            username: username.to_string(),
            password_hash: password_hash.filter(|h| !h.trim().is_empty()),
        }
    }

    /// `PANEL_USERNAME` (default `admin`) and `PANEL_PASSWORD_HASH`.
    pub fn from_env() -> Self {
        let username = std::env::var("PANEL_USERNAME")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
        let credentials = Self::new(&username, std::env::var("PANEL_PASSWORD_HASH").ok());
        if !credentials.is_enabled() {
            warn!("PANEL_PASSWORD_HASH is not set; every panel login will be refused");
        }
        credentials
    }

    pub fn is_enabled(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        let Some(hash) = &self.password_hash else {
            return false;
        };
        if username != self.username {
            return false;
        }
        match verify_password(hash, password) {
            Ok(valid) => valid,
            Err(e) => {
                error!("PANEL_PASSWORD_HASH is not a valid password hash: {}", e);
                false
            }
        }
    }
}

/// PHC string for `PANEL_PASSWORD_HASH`.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| BotError::Internal {
            message: format!("failed to hash password: {}", e),
        })?;
    Ok(hash.to_string())
}

/// Hashes written by older tooling use the `$2a$`, `$2b$` or `$2y$` bcrypt
/// formats.
pub fn is_bcrypt_hash(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"].iter().any(|prefix| hash.starts_with(prefix))
}

/// Check `candidate` against an argon2 PHC string or a legacy bcrypt hash.
pub fn verify_password(expected_hash: &str, candidate: &str) -> Result<bool> {
    let expected_hash = expected_hash.trim();
    if is_bcrypt_hash(expected_hash) {
        return bcrypt::verify(candidate, expected_hash).map_err(|e| BotError::ConfigValidation {
            key: "PANEL_PASSWORD_HASH".to_string(),
            message: e.to_string(),
        });
    }

    let parsed = PasswordHash::new(expected_hash).map_err(|e| BotError::ConfigValidation {
        key: "PANEL_PASSWORD_HASH".to_string(),
        message: e.to_string(),
    })?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(e) => Err(BotError::Internal {
            message: format!("failed to verify password: {}", e),
        }),
    }
}

/// Username and password from an `Authorization: Basic` header.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", REALM))],
        Html(pages::unauthorized_page()),
    )
        .into_response()
}

/// Middleware guarding every panel route.
pub async fn require_basic_auth(State(state): State<WebState>, request: Request, next: Next) -> Response {
    match basic_credentials(request.headers()) {
        Some((username, password)) if state.credentials.verify(&username, &password) => {
            next.run(request).await
        }
        Some((username, _)) => {
            warn!("Rejected panel login for '{}'", username);
            unauthorized()
        }
        None => unauthorized(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "hunter2").unwrap());
        assert!(!verify_password(&hash, "hunter3").unwrap());
        assert!(verify_password("not-a-hash", "x").is_err());
    }

    #[test]
    fn test_verify_legacy_bcrypt() {
        let known = "$2a$05$CCCCCCCCCCCCCCCCCCCCC.E5YPO9kmyuRGyh0XouQYb4YMJKvyOeW";
        assert!(is_bcrypt_hash(known));
        assert!(verify_password(known, "U*U").unwrap());
        assert!(!verify_password(known, "U*V").unwrap());

        let hash = bcrypt::hash("hunter2", 4).unwrap();
        assert!(hash.starts_with("$2b$"));
        assert!(verify_password(&hash, "hunter2").unwrap());
        assert!(!verify_password(&hash, "hunter3").unwrap());

        let credentials = PanelCredentials::new("admin", Some(hash));
        assert!(credentials.verify("admin", "hunter2"));
    }

    #[test]
    fn test_credentials_without_hash_refuse_everything() {
        let credentials = PanelCredentials::new("admin", None);
        assert!(!credentials.is_enabled());
        assert!(!credentials.verify("admin", ""));
        assert!(!credentials.verify("admin", "admin"));

        let blank = PanelCredentials::new("admin", Some("  ".to_string()));
        assert!(!blank.is_enabled());
    }

    #[test]
    fn test_credentials_check_username() {
        let credentials = PanelCredentials::new("admin", Some(hash_password("pw").unwrap()));
        assert!(credentials.verify("admin", "pw"));
        assert!(!credentials.verify("root", "pw"));
    }

    #[test]
    fn test_basic_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(basic_credentials(&headers), None);

        let encoded = STANDARD.encode("admin:pa:ss");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
        );
        assert_eq!(
            basic_credentials(&headers),
            Some(("admin".to_string(), "pa:ss".to_string()))
        );

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer token"));
        assert_eq!(basic_credentials(&headers), None);
    }
}
