use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // Configuration errors
    #[error("Missing configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid config value for '{key}': {message}")]
    ConfigValidation { key: String, message: String },

    #[error("Config key not found: {key}")]
    ConfigNotFound { key: String },

    // Storage errors
    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to open database '{path}': {source}")]
    DatabaseOpen {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invalid stored data: {message}")]
    InvalidData { message: String },

    // Verification errors
    #[error("Verification state is invalid or expired")]
    UnknownState,

    #[error("User already verified: {discord_id}")]
    AlreadyVerified { discord_id: u64 },

    // Upstream errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Genius API returned {status} for {endpoint}: {body}")]
    GeniusStatus {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("Genius API response missing field '{field}'")]
    GeniusResponse { field: &'static str },

    // Discord errors
    #[error("Discord API error: {message}")]
    Discord { message: String },

    #[error("Discord client is not connected")]
    DiscordUnavailable,

    #[error("Guild not found: {id}")]
    GuildNotFound { id: String },

    #[error("Member {user_id} not found in guild {guild_id}")]
    MemberNotFound { user_id: u64, guild_id: u64 },

    // Permission errors
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        BotError::Discord {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::InvalidData {
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for BotError {
    fn from(err: tokio::task::JoinError) -> Self {
        BotError::Internal {
            message: format!("background task failed: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

use poise::serenity_prelude as serenity;
