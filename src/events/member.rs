use poise::serenity_prelude as serenity;
use tracing::{debug, info, warn};

use crate::{Data, Error};

/// Leaving a guild other than the verification guild keeps the record.
pub fn forgets_verification(left: serenity::GuildId, target: Option<serenity::GuildId>) -> bool {
    target == Some(left)
}

/// Forget the verification of a member who left the verification guild.
pub async fn handle_member_removal(
    guild_id: serenity::GuildId,
    user: &serenity::User,
    data: &Data,
) -> Result<(), Error> {
    let target = match data.role_manager.target_guild().await {
        Ok(target) => Some(target),
        Err(e) => {
            warn!("Could not resolve the verification guild: {}", e);
            None
        }
    };
    if !forgets_verification(guild_id, target) {
        debug!("{} left guild {}, verification kept", user.name, guild_id);
        return Ok(());
    }

    if data.verification_db.remove_verification(user.id.get())? {
        info!(
            "Removed verification of {} ({}) after leaving guild {}",
            user.name, user.id, guild_id
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::serenity::GuildId;

    #[test]
    fn test_only_target_guild_forgets() {
        assert!(forgets_verification(GuildId::new(1), Some(GuildId::new(1))));
        assert!(!forgets_verification(GuildId::new(1), Some(GuildId::new(2))));
        assert!(!forgets_verification(GuildId::new(1), None));
    }
}
