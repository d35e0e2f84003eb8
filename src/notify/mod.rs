//! Change notification: in-process events and cross-process signals.

pub mod events;
pub mod signals;

pub use events::{EventBus, SharedEventBus, SubscriptionId};
pub use signals::{SharedSignalQueue, Signal, SignalQueue};

/// Event and signal names. Both systems share the same vocabulary.
pub mod topics {
    pub const CONFIG_UPDATED: &str = "config_updated";
    pub const BOT_RESTART_REQUIRED: &str = "bot_restart_required";
    pub const ROLE_CONFIG_CHANGED: &str = "role_config_changed";
    pub const DISCORD_TOKEN_CHANGED: &str = "discord_token_changed";
}
