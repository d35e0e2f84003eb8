//! Genius OAuth2 redirect flow: `/auth` and `/callback`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::pages;
use super::WebState;
use crate::config::keys;
use crate::error::BotError;
use crate::genius::{authorize_url, redirect_uri};

pub fn oauth_router() -> Router<WebState> {
    Router::new()
        .route("/auth", get(auth))
        .route("/callback", get(callback))
}

/// Query parameters of the link handed out by the verify button
#[derive(Debug, Deserialize)]
pub struct AuthParams {
    state: Option<String>,
}

/// Query parameters from Genius OAuth callback
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Html(pages::error_page(message))).into_response()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// GET /auth - redirect to the Genius authorize page
async fn auth(State(state): State<WebState>, Query(params): Query<AuthParams>) -> Response {
    let Some(verification_state) = non_empty(params.state) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid or missing verification state.");
    };

    let client_id = state.config.get_opt(keys::GENIUS_CLIENT_ID);
    let has_secret = state.config.get_opt(keys::GENIUS_CLIENT_SECRET).is_some();
    let base_url = state.config.base_url();
    let client_id = match client_id {
        Some(id) if has_secret && !base_url.is_empty() => id,
        _ => {
            error!("Genius OAuth requested but credentials or BASE_URL are not configured");
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Genius API is not configured. Ask a server admin to finish the setup.",
            );
        }
    };

    let url = authorize_url(&client_id, &redirect_uri(&base_url), &verification_state);
    debug!("Redirecting state {} to Genius", verification_state);
    Redirect::to(&url).into_response()
}

/// GET /callback - finish the verification
async fn callback(State(state): State<WebState>, Query(params): Query<CallbackParams>) -> Response {
    if let Some(reason) = non_empty(params.error) {
        warn!("Genius returned an OAuth error: {}", reason);
        let message = state.config.get(
            keys::OAUTH_ERROR_MESSAGE,
            "Genius authorization was cancelled or failed.",
        );
        return error_response(StatusCode::BAD_REQUEST, &format!("{} ({})", message, reason));
    }

    let (Some(code), Some(verification_state)) = (non_empty(params.code), non_empty(params.state)) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid callback parameters.");
    };

    match state
        .verifications
        .complete(&code, &verification_state)
        .await
    {
        Ok(done) => {
            info!(
                "Verification complete for {} (Genius '{}')",
                done.discord_id, done.account.login
            );
            Redirect::to("/success").into_response()
        }
        Err(BotError::UnknownState) => {
            warn!("Callback with unknown or expired state {}", verification_state);
            let message = state.config.get(
                keys::VERIFICATION_TIMEOUT_MESSAGE,
                "This verification link has expired. Click the button again.",
            );
            error_response(StatusCode::BAD_REQUEST, &message)
        }
        Err(e) => {
            error!("Verification failed: {}", e);
            let message = state.config.get(
                keys::ERROR_VERIFICATION_MESSAGE,
                "Verification failed. Please try again.",
            );
            error_response(StatusCode::BAD_GATEWAY, &message)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::web::test_support::{serve, test_state};

    fn no_redirects() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_auth_requires_state() {
        let (state, _) = test_state();
        let base = serve(state).await;

        let response = no_redirects().get(format!("{}/auth", base)).send().await.unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_auth_redirects_to_genius() {
        let (state, _) = test_state();
        let base = serve(state).await;

        let response = no_redirects()
            .get(format!("{}/auth?state=abc", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 303);
        let location = response.headers()["location"].to_str().unwrap().to_string();
        assert!(location.starts_with("https://api.genius.com/oauth/authorize?"));
        assert!(location.contains("state=abc"));
        assert!(location.contains("redirect_uri=https%3A%2F%2Fbot.example%2Fcallback"));
    }

    #[tokio::test]
    async fn test_callback_success_redirects() {
        let (state, db) = test_state();
        db.create_pending_verification("S", 42).unwrap();
        let base = serve(state).await;

        let response = no_redirects()
            .get(format!("{}/callback?code=good&state=S", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 303);
        assert_eq!(response.headers()["location"], "/success");
        assert!(db.is_verified(42).unwrap());
    }

    #[tokio::test]
    async fn test_callback_unknown_state_and_oauth_error() {
        let (state, _) = test_state();
        let base = serve(state).await;
        let client = no_redirects();

        let unknown = client
            .get(format!("{}/callback?code=good&state=missing", base))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), 400);
        assert!(unknown.text().await.unwrap().contains("expired"));

        let denied = client
            .get(format!("{}/callback?error=access_denied", base))
            .send()
            .await
            .unwrap();
        assert_eq!(denied.status(), 400);
        assert!(denied.text().await.unwrap().contains("access_denied"));
    }
}
