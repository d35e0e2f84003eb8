//! Known configuration keys, their descriptions and seeded defaults.

pub const DISCORD_TOKEN: &str = "DISCORD_TOKEN";
pub const GENIUS_CLIENT_ID: &str = "GENIUS_CLIENT_ID";
pub const GENIUS_CLIENT_SECRET: &str = "GENIUS_CLIENT_SECRET";
pub const BASE_URL: &str = "BASE_URL";
pub const VERIFICATION_CHANNEL_ID: &str = "VERIFICATION_CHANNEL_ID";
pub const VERIFIED_ROLE_ID: &str = "VERIFIED_ROLE_ID";
pub const KEEP_ALIVE_INTERVAL: &str = "KEEP_ALIVE_INTERVAL";
pub const KEEP_ALIVE_ENABLED: &str = "KEEP_ALIVE_ENABLED";
pub const CMD_PREFIX: &str = "CMD_PREFIX";
pub const WELCOME_REACTION_ENABLED: &str = "WELCOME_REACTION_ENABLED";

pub const WELCOME_MESSAGE_TEXT: &str = "WELCOME_MESSAGE_TEXT";
pub const SUCCESS_VERIFICATION_MESSAGE: &str = "SUCCESS_VERIFICATION_MESSAGE";
pub const ERROR_VERIFICATION_MESSAGE: &str = "ERROR_VERIFICATION_MESSAGE";
pub const OAUTH_ERROR_MESSAGE: &str = "OAUTH_ERROR_MESSAGE";
pub const ALREADY_VERIFIED_MESSAGE: &str = "ALREADY_VERIFIED_MESSAGE";
pub const VERIFICATION_TIMEOUT_MESSAGE: &str = "VERIFICATION_TIMEOUT_MESSAGE";
pub const ROLE_ASSIGNMENT_SUCCESS_MESSAGE: &str = "ROLE_ASSIGNMENT_SUCCESS_MESSAGE";
pub const ROLE_ASSIGNMENT_ERROR_MESSAGE: &str = "ROLE_ASSIGNMENT_ERROR_MESSAGE";

pub const VERIFICATION_EMBED_TITLE: &str = "VERIFICATION_EMBED_TITLE";
pub const VERIFICATION_EMBED_DESCRIPTION: &str = "VERIFICATION_EMBED_DESCRIPTION";
pub const VERIFICATION_BUTTON_LABEL: &str = "VERIFICATION_BUTTON_LABEL";

pub const DEFAULT_PREFIX: &str = "!!";
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 300;
pub const MIN_KEEP_ALIVE_SECS: u64 = 60;

/// Prefix shared by every Genius role id key.
pub const ROLE_KEY_PREFIX: &str = "ROLE_";

/// Genius role display name paired with the key holding its Discord role id.
pub const GENIUS_ROLE_KEYS: &[(&str, &str)] = &[
    ("Verified Artist", "ROLE_VERIFIED_ARTIST"),
    ("Staff", "ROLE_STAFF"),
    ("Moderator", "ROLE_MODERATOR"),
    ("Editor", "ROLE_EDITOR"),
    ("Transcriber", "ROLE_TRANSCRIBER"),
    ("Mediator", "ROLE_MEDIATOR"),
    ("Contributor", "ROLE_CONTRIBUTOR"),
];

/// Keys whose change only takes effect after a restart.
pub const CRITICAL_KEYS: &[&str] = &[DISCORD_TOKEN, GENIUS_CLIENT_ID, GENIUS_CLIENT_SECRET];

/// Keys whose values must never leave the store.
pub const SECRET_KEYS: &[&str] = &[DISCORD_TOKEN, GENIUS_CLIENT_SECRET];

/// Keys needed before the bot can run at all.
pub const REQUIRED_KEYS: &[&str] = &[DISCORD_TOKEN, GENIUS_CLIENT_ID, GENIUS_CLIENT_SECRET, BASE_URL];

/// Keys needed for verification to be useful.
pub const RECOMMENDED_KEYS: &[&str] = &[VERIFICATION_CHANNEL_ID, VERIFIED_ROLE_ID];

/// Feature flag key and command name for every toggleable command.
pub const COMMAND_FLAGS: &[(&str, &str)] = &[
    ("ENABLE_COMMAND_PING", "ping"),
    ("ENABLE_COMMAND_TEST_WELCOME", "test_welcome"),
    ("ENABLE_COMMAND_HELP", "help"),
    ("ENABLE_COMMAND_TEST", "test"),
    ("ENABLE_COMMAND_SETUP_VERIFICATION", "setup_verification"),
    ("ENABLE_COMMAND_VERIFY_STATUS", "verify_status"),
    ("ENABLE_COMMAND_UNVERIFY", "unverify"),
    ("ENABLE_COMMAND_VERIFIED_LIST", "verified_list"),
    ("ENABLE_COMMAND_TEST_ROLES", "test_roles"),
    ("ENABLE_COMMAND_LIST_ROLES", "list_roles"),
    ("ENABLE_COMMAND_SHOW_CONFIG", "show_config"),
    ("ENABLE_COMMAND_CLEANUP_VERIFICATIONS", "cleanup_verifications"),
    ("ENABLE_COMMAND_SYNC", "sync"),
    ("ENABLE_COMMAND_BOT_STATS", "bot_stats"),
    ("ENABLE_COMMAND_CLEAN", "clean"),
    ("ENABLE_COMMAND_MESSAGE", "message"),
];

/// A row seeded into the store on first start.
#[derive(Debug, Clone, Copy)]
pub struct DefaultEntry {
    pub key: &'static str,
    pub value: &'static str,
    pub description: &'static str,
    pub required: bool,
}

const fn entry(
    key: &'static str,
    value: &'static str,
    description: &'static str,
    required: bool,
) -> DefaultEntry {
    DefaultEntry {
        key,
        value,
        description,
        required,
    }
}

const BASE_ENTRIES: &[DefaultEntry] = &[
    entry(DISCORD_TOKEN, "", "Discord bot token", true),
    entry(GENIUS_CLIENT_ID, "", "Genius API client id", true),
    entry(GENIUS_CLIENT_SECRET, "", "Genius API client secret", true),
    entry(BASE_URL, "", "Public URL of the OAuth server", true),
    entry(VERIFICATION_CHANNEL_ID, "", "Channel holding the verification message", false),
    entry(VERIFIED_ROLE_ID, "", "Role given to every verified member", false),
    entry("ROLE_VERIFIED_ARTIST", "", "Discord role for Genius verified artists", false),
    entry("ROLE_STAFF", "", "Discord role for Genius staff", false),
    entry("ROLE_MODERATOR", "", "Discord role for Genius moderators", false),
    entry("ROLE_EDITOR", "", "Discord role for Genius editors", false),
    entry("ROLE_TRANSCRIBER", "", "Discord role for Genius transcribers", false),
    entry("ROLE_MEDIATOR", "", "Discord role for Genius mediators", false),
    entry("ROLE_CONTRIBUTOR", "", "Discord role for Genius contributors", false),
    entry(KEEP_ALIVE_INTERVAL, "300", "Seconds between keep-alive pings", false),
    entry(KEEP_ALIVE_ENABLED, "true", "Ping the public URL to keep the host awake", false),
    entry(CMD_PREFIX, DEFAULT_PREFIX, "Prefix for text commands", false),
    entry(WELCOME_REACTION_ENABLED, "true", "React to join and boost messages", false),
    entry(WELCOME_MESSAGE_TEXT, "Welcome to the server!", "Welcome message text", false),
    entry(
        SUCCESS_VERIFICATION_MESSAGE,
        "Your Genius account has been verified.",
        "Shown after a successful verification",
        false,
    ),
    entry(
        ERROR_VERIFICATION_MESSAGE,
        "Verification failed. Please try again.",
        "Shown when verification fails",
        false,
    ),
    entry(
        OAUTH_ERROR_MESSAGE,
        "Genius authorization was cancelled or failed.",
        "Shown when Genius returns an OAuth error",
        false,
    ),
    entry(
        ALREADY_VERIFIED_MESSAGE,
        "Your account is already verified.",
        "Shown when a verified member clicks the button",
        false,
    ),
    entry(
        VERIFICATION_TIMEOUT_MESSAGE,
        "This verification link has expired. Click the button again.",
        "Shown when a verification link has expired",
        false,
    ),
    entry(
        ROLE_ASSIGNMENT_SUCCESS_MESSAGE,
        "Roles assigned.",
        "Shown when roles were assigned",
        false,
    ),
    entry(
        ROLE_ASSIGNMENT_ERROR_MESSAGE,
        "Some roles could not be assigned.",
        "Shown when role assignment failed",
        false,
    ),
    entry(
        VERIFICATION_EMBED_TITLE,
        "Genius verification",
        "Title of the verification embed",
        false,
    ),
    entry(
        VERIFICATION_EMBED_DESCRIPTION,
        "Verify your Genius account to unlock the server.",
        "Body of the verification embed",
        false,
    ),
    entry(
        VERIFICATION_BUTTON_LABEL,
        "Verify with Genius",
        "Label of the verification button",
        false,
    ),
];

/// Every key seeded on first start, command flags included.
pub fn default_entries() -> Vec<DefaultEntry> {
    let mut entries = BASE_ENTRIES.to_vec();
    entries.extend(COMMAND_FLAGS.iter().map(|&(flag, _)| DefaultEntry {
        key: flag,
        value: "true",
        description: "Enable this command",
        required: false,
    }));
    entries
}

pub fn is_role_key(key: &str) -> bool {
    key.starts_with(ROLE_KEY_PREFIX)
}

pub fn is_secret(key: &str) -> bool {
    SECRET_KEYS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_entries_unique() {
        let entries = default_entries();
        let keys: HashSet<_> = entries.iter().map(|e| e.key).collect();
        assert_eq!(keys.len(), entries.len());
    }

    #[test]
    fn test_required_keys_are_marked_required() {
        let entries = default_entries();
        for key in REQUIRED_KEYS {
            let entry = entries.iter().find(|e| e.key == *key).unwrap();
            assert!(entry.required, "{} should be required", key);
        }
    }

    #[test]
    fn test_role_keys() {
        assert!(is_role_key("ROLE_STAFF"));
        assert!(!is_role_key("VERIFIED_ROLE_ID"));
        for (_, key) in GENIUS_ROLE_KEYS {
            assert!(is_role_key(key));
        }
    }
}
