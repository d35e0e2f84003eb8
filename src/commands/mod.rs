pub mod config;
pub mod general;
pub mod mentions;
pub mod message;
pub mod moderation;
pub mod verification;

use poise::serenity_prelude as serenity;

use crate::config::keys;
use crate::managers::{member_can_manage_messages, member_is_staff};
use crate::{Context, Data, Error};

pub use config::{list_roles, show_config};
pub use general::{bot_stats, help, ping, sync, test, test_welcome};
pub use message::message;
pub use moderation::clean;
pub use verification::{
    cleanup_verifications, setup_verification, test_roles, unverify, verified_list, verify_status,
};

pub const COLOR_INFO: u32 = 0x5865f2;
pub const COLOR_SUCCESS: u32 = 0x43b581;
pub const COLOR_ERROR: u32 = 0xf04747;
pub const COLOR_WARNING: u32 = 0xffa500;

/// Every command the framework registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        ping(),
        help(),
        test(),
        test_welcome(),
        sync(),
        bot_stats(),
        setup_verification(),
        verify_status(),
        unverify(),
        verified_list(),
        test_roles(),
        cleanup_verifications(),
        show_config(),
        list_roles(),
        clean(),
        message(),
    ]
}

/// Feature flag for `command`, `None` when the command has none.
pub fn command_flag(command: &str) -> Option<&'static str> {
    keys::COMMAND_FLAGS
        .iter()
        .find(|(_, name)| *name == command)
        .map(|(flag, _)| *flag)
}

/// Whether `command` is switched on. Disabled commands are ignored silently.
pub fn enabled(ctx: Context<'_>, command: &str) -> bool {
    command_flag(command)
        .map(|flag| ctx.data().config.command_enabled(flag))
        .unwrap_or(true)
}

pub async fn is_staff(ctx: Context<'_>) -> bool {
    let Some(guild_id) = ctx.guild_id() else {
        return false;
    };
    match ctx.author_member().await {
        Some(member) => member_is_staff(ctx.serenity_context(), guild_id, &member).await,
        None => false,
    }
}

/// MANAGE_MESSAGES holder or staff.
pub async fn can_manage_messages(ctx: Context<'_>) -> bool {
    let Some(guild_id) = ctx.guild_id() else {
        return false;
    };
    match ctx.author_member().await {
        Some(member) => member_can_manage_messages(ctx.serenity_context(), guild_id, &member).await,
        None => false,
    }
}

pub fn no_permission_embed(description: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("❌ No permission")
        .description(description)
        .color(COLOR_ERROR)
}

/// Flag check followed by the staff check. Replies with the no-permission
/// embed when the author is not staff.
pub async fn staff_guard(ctx: Context<'_>, command: &str) -> Result<bool, Error> {
    if !enabled(ctx, command) {
        return Ok(false);
    }
    if is_staff(ctx).await {
        return Ok(true);
    }
    ctx.send(
        poise::CreateReply::default()
            .embed(no_permission_embed(
                "This command is only available to administrators and staff.",
            ))
            .ephemeral(true),
    )
    .await?;
    Ok(false)
}

/// Flag check followed by the MANAGE_MESSAGES-or-staff check.
pub async fn manage_messages_guard(ctx: Context<'_>, command: &str) -> Result<bool, Error> {
    if !enabled(ctx, command) {
        return Ok(false);
    }
    if can_manage_messages(ctx).await {
        return Ok(true);
    }
    ctx.send(
        poise::CreateReply::default()
            .embed(no_permission_embed(
                "This command requires the Manage Messages permission or a staff role.",
            ))
            .ephemeral(true),
    )
    .await?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_command_has_a_flag() {
        for command in all() {
            assert!(
                command_flag(&command.name).is_some(),
                "{} has no ENABLE_COMMAND_* flag",
                command.name
            );
        }
        assert_eq!(all().len(), keys::COMMAND_FLAGS.len());
    }

    #[test]
    fn test_prefix_only_commands() {
        for command in all() {
            let prefix_only = matches!(command.name.as_str(), "test_welcome" | "sync");
            assert_eq!(command.slash_action.is_none(), prefix_only, "{}", command.name);
        }
        let message = all().into_iter().find(|c| c.name == "message").unwrap();
        assert!(message.prefix_action.is_none());
    }
}
