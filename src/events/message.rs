use poise::serenity_prelude as serenity;
use tracing::{debug, warn};

use crate::config::keys;
use crate::{Data, Error};

const WELCOME_EMOJI: &str = "👋🏻";

/// System messages announcing a join or a boost.
pub fn is_welcome_message(kind: serenity::MessageType) -> bool {
    matches!(
        kind,
        serenity::MessageType::MemberJoin
            | serenity::MessageType::NitroBoost
            | serenity::MessageType::NitroTier1
            | serenity::MessageType::NitroTier2
            | serenity::MessageType::NitroTier3
    )
}

/// React to join and boost announcements.
pub async fn handle_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    if msg.author.bot || msg.guild_id.is_none() || !is_welcome_message(msg.kind) {
        return Ok(());
    }
    if !data.config.get_bool(keys::WELCOME_REACTION_ENABLED, true) {
        return Ok(());
    }

    debug!("Welcome message {:?} from {}", msg.kind, msg.author.name);
    if let Err(e) = msg
        .react(&ctx.http, serenity::ReactionType::Unicode(WELCOME_EMOJI.to_string()))
        .await
    {
        warn!("Could not react to welcome message {}: {}", msg.id, e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_message_kinds() {
        assert!(is_welcome_message(serenity::MessageType::MemberJoin));
        assert!(is_welcome_message(serenity::MessageType::NitroBoost));
        assert!(is_welcome_message(serenity::MessageType::NitroTier3));
        assert!(!is_welcome_message(serenity::MessageType::Regular));
        assert!(!is_welcome_message(serenity::MessageType::InlineReply));
    }
}
