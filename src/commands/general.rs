use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::{error, info};

use super::{enabled, is_staff, staff_guard, COLOR_INFO, COLOR_SUCCESS};
use crate::web::status::{format_uptime, memory_usage_mb};
use crate::{Context, Error};

const HELP_TIMEOUT: Duration = Duration::from_secs(300);
const WELCOME_EMOJI: &str = "👋🏻";

/// Check if the bot is running
#[poise::command(prefix_command, slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    if !staff_guard(ctx, "ping").await? {
        return Ok(());
    }
    let instance_id = ctx.data().bot_status.read().await.instance_id.clone();
    info!("Ping from {} handled by instance {}", ctx.author().name, instance_id);
    ctx.say(format!("Pong! 🏓 (instance: `{}`)", instance_id)).await?;
    Ok(())
}

/// Simple liveness test
#[poise::command(prefix_command, slash_command)]
pub async fn test(ctx: Context<'_>) -> Result<(), Error> {
    if !staff_guard(ctx, "test").await? {
        return Ok(());
    }
    ctx.say("✅ **Test successful!** The bot is working correctly.").await?;
    Ok(())
}

/// React like the bot does to join and boost messages
#[poise::command(prefix_command)]
pub async fn test_welcome(ctx: Context<'_>) -> Result<(), Error> {
    if !staff_guard(ctx, "test_welcome").await? {
        return Ok(());
    }
    if let poise::Context::Prefix(prefix) = ctx {
        prefix
            .msg
            .react(ctx.http(), serenity::ReactionType::Unicode(WELCOME_EMOJI.to_string()))
            .await?;
    }

    let active = ctx
        .data()
        .config
        .get_bool(crate::config::keys::WELCOME_REACTION_ENABLED, true);
    let embed = serenity::CreateEmbed::new()
        .title("🧪 Welcome reaction test")
        .description(format!(
            "{}\n\nThe bot reacts with {} to:\n• New member messages\n• Server boost messages\n• Server level messages",
            if active { "✅ **Enabled**" } else { "⚠️ **Disabled** (`WELCOME_REACTION_ENABLED`)" },
            WELCOME_EMOJI
        ))
        .color(COLOR_SUCCESS);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Re-register slash commands
#[poise::command(prefix_command)]
pub async fn sync(ctx: Context<'_>) -> Result<(), Error> {
    if !staff_guard(ctx, "sync").await? {
        return Ok(());
    }
    let commands = &ctx.framework().options().commands;
    match poise::builtins::register_globally(ctx.http(), commands).await {
        Ok(()) => {
            info!("{} re-registered {} slash commands", ctx.author().name, commands.len());
            ctx.say(format!(
                "✅ Registered {} slash commands (may take up to an hour to propagate).",
                commands.len()
            ))
            .await?;
        }
        Err(e) => {
            error!("Failed to register commands: {}", e);
            ctx.say(format!("❌ Failed to register commands: {}", e)).await?;
        }
    }
    Ok(())
}

pub fn help_pages(prefix: &str, staff: bool) -> Vec<serenity::CreateEmbed> {
    let overview = serenity::CreateEmbed::new()
        .title("GeeBot - Help (1/4)")
        .description("GeeBot links your Discord account to your Genius.com account.")
        .field(
            "How to verify",
            "1. Find the verification message in the verification channel\n2. Click **Verify with Genius**\n3. Log in on Genius and authorize the app\n4. Your roles and nickname are updated automatically",
            false,
        )
        .footer(serenity::CreateEmbedFooter::new("Use the buttons to navigate • Page 1 of 4"))
        .color(COLOR_INFO);

    let commands = if staff {
        serenity::CreateEmbed::new()
            .title("GeeBot - Staff commands (2/4)")
            .field(
                "Verification",
                format!(
                    "`{p}setup_verification` post the verification message\n`{p}verify_status [user]` show a member's status\n`{p}unverify <user>` remove a verification\n`{p}verified_list` list verified members\n`{p}cleanup_verifications` drop members who left",
                    p = prefix
                ),
                false,
            )
            .field(
                "Configuration",
                format!(
                    "`{p}show_config` current roles and channel\n`{p}list_roles` server roles with ids\n`{p}test_roles [user]` try the role mapping",
                    p = prefix
                ),
                false,
            )
            .field(
                "Utilities",
                format!(
                    "`{p}ping` `{p}test` `{p}test_welcome` `{p}bot_stats`\n`{p}clean [amount]` bulk delete messages\n`{p}sync` re-register slash commands\n`/message [channel]` compose a plain or embed message",
                    p = prefix
                ),
                false,
            )
    } else {
        serenity::CreateEmbed::new()
            .title("GeeBot - Commands (2/4)")
            .field(
                "Available to everyone",
                format!("`{}verify_status` show your own verification", prefix),
                false,
            )
    }
    .footer(serenity::CreateEmbedFooter::new("Use the buttons to navigate • Page 2 of 4"))
    .color(COLOR_INFO);

    let roles = serenity::CreateEmbed::new()
        .title("GeeBot - Genius roles (3/4)")
        .field(
            "Supported roles",
            "**Verified Artist** artists verified on Genius\n**Staff** Genius staff\n**Moderator** community moderators\n**Editor** lyric editors\n**Transcriber** lyric transcribers\n**Mediator** dispute mediators\n**Contributor** everyone else",
            false,
        )
        .footer(serenity::CreateEmbedFooter::new("Use the buttons to navigate • Page 3 of 4"))
        .color(COLOR_INFO);

    let notes = serenity::CreateEmbed::new()
        .title("GeeBot - Notes (4/4)")
        .field(
            "Good to know",
            "• Roles follow your Genius account status\n• Verification links expire after 10 minutes\n• Staff can remove a verification if needed\n• Only public Genius profile data is read",
            false,
        )
        .footer(serenity::CreateEmbedFooter::new("Use the buttons to navigate • Page 4 of 4"))
        .color(COLOR_INFO);

    vec![overview, commands, roles, notes]
}

fn help_buttons(page: usize, pages: usize) -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new("help_prev")
            .label("◀️ Previous")
            .style(serenity::ButtonStyle::Secondary)
            .disabled(page == 0),
        serenity::CreateButton::new("help_next")
            .label("Next ▶️")
            .style(serenity::ButtonStyle::Secondary)
            .disabled(page + 1 >= pages),
        serenity::CreateButton::new("help_home")
            .label("🏠 Home")
            .style(serenity::ButtonStyle::Primary),
        serenity::CreateButton::new("help_close")
            .label("❌ Close")
            .style(serenity::ButtonStyle::Danger),
    ])]
}

/// Next page index for a help button press, `None` to close.
pub fn next_help_page(custom_id: &str, page: usize, pages: usize) -> Option<usize> {
    match custom_id {
        "help_prev" => Some(page.saturating_sub(1)),
        "help_next" => Some((page + 1).min(pages.saturating_sub(1))),
        "help_home" => Some(0),
        _ => None,
    }
}

/// Show help information
#[poise::command(prefix_command, slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    if !enabled(ctx, "help") {
        return Ok(());
    }
    let staff = is_staff(ctx).await;
    let pages = help_pages(&ctx.data().config.prefix(), staff);
    let mut page = 0;

    let reply = ctx
        .send(
            poise::CreateReply::default()
                .embed(pages[page].clone())
                .components(help_buttons(page, pages.len())),
        )
        .await?;
    let message = reply.message().await?;

    while let Some(press) = message
        .await_component_interaction(ctx.serenity_context().shard.clone())
        .author_id(ctx.author().id)
        .timeout(HELP_TIMEOUT)
        .await
    {
        let response = match next_help_page(&press.data.custom_id, page, pages.len()) {
            Some(next) => {
                page = next;
                serenity::CreateInteractionResponseMessage::new()
                    .embed(pages[page].clone())
                    .components(help_buttons(page, pages.len()))
            }
            None => {
                let closed = serenity::CreateEmbed::new()
                    .title("Help closed")
                    .description(format!(
                        "Use `{}help` whenever you need it again.",
                        ctx.data().config.prefix()
                    ))
                    .color(0x95a5a6);
                press
                    .create_response(
                        ctx.http(),
                        serenity::CreateInteractionResponse::UpdateMessage(
                            serenity::CreateInteractionResponseMessage::new()
                                .embed(closed)
                                .components(vec![]),
                        ),
                    )
                    .await?;
                return Ok(());
            }
        };
        press
            .create_response(ctx.http(), serenity::CreateInteractionResponse::UpdateMessage(response))
            .await?;
    }

    // Timed out
    reply
        .edit(
            ctx,
            poise::CreateReply::default()
                .embed(pages[page].clone())
                .components(vec![]),
        )
        .await?;
    Ok(())
}

/// Runtime statistics
#[poise::command(prefix_command, slash_command)]
pub async fn bot_stats(ctx: Context<'_>) -> Result<(), Error> {
    if !staff_guard(ctx, "bot_stats").await? {
        return Ok(());
    }
    let data = ctx.data();
    let status = data.bot_status.read().await.clone();
    let latency = ctx.ping().await;
    let bot_user = ctx.cache().current_user().clone();
    let guilds = ctx.cache().guilds();
    let total_members: u64 = guilds
        .iter()
        .filter_map(|id| ctx.cache().guild(*id).map(|g| g.member_count))
        .sum();

    let stats = data.verification_db.stats().unwrap_or_default();
    let uptime = status.uptime_seconds();

    let mut embed = serenity::CreateEmbed::new()
        .title("📊 Bot statistics")
        .description(format!("Statistics for **{}**", bot_user.name))
        .field(
            "🤖 Bot",
            format!(
                "• **Name:** {}\n• **ID:** {}\n• **Instance:** `{}`\n• **Latency:** {}ms",
                bot_user.name,
                bot_user.id,
                status.instance_id,
                latency.as_millis()
            ),
            true,
        )
        .field(
            "🏰 Servers",
            format!("• **Servers:** {}\n• **Members:** {}", guilds.len(), total_members),
            true,
        )
        .field(
            "✅ Verifications",
            format!(
                "• **Verified:** {}\n• **Pending:** {}\n• **Last 24h:** {}",
                stats.total_verified, stats.pending, stats.verified_last_24h
            ),
            false,
        )
        .field(
            "⚙️ System",
            format!(
                "• **Uptime:** {}\n• **Memory:** {:.1} MB\n• **Started:** {}",
                format_uptime(uptime),
                memory_usage_mb(),
                status.started_at.format("%d/%m/%Y %H:%M:%S UTC")
            ),
            false,
        )
        .color(COLOR_INFO);

    if let Some(keep_alive) = &data.keep_alive {
        let ka = keep_alive.stats();
        embed = embed.field(
            "🔄 Keep-alive",
            format!(
                "• **Pings:** {} ({} ok, {} failed)\n• **Success rate:** {:.1}%\n• **Last ping:** {}",
                ka.pings_sent,
                ka.pings_successful,
                ka.pings_failed,
                ka.success_rate(),
                ka.last_ping
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string())
            ),
            false,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_has_four_pages() {
        assert_eq!(help_pages("!!", true).len(), 4);
        assert_eq!(help_pages("!!", false).len(), 4);
    }

    #[test]
    fn test_help_navigation() {
        assert_eq!(next_help_page("help_prev", 0, 4), Some(0));
        assert_eq!(next_help_page("help_next", 2, 4), Some(3));
        assert_eq!(next_help_page("help_next", 3, 4), Some(3));
        assert_eq!(next_help_page("help_home", 3, 4), Some(0));
        assert_eq!(next_help_page("help_close", 1, 4), None);
    }
}
