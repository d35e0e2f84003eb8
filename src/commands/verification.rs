use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::{info, warn};

use super::{enabled, is_staff, no_permission_embed, staff_guard, COLOR_ERROR, COLOR_INFO, COLOR_SUCCESS, COLOR_WARNING};
use crate::config::{keys, DynamicConfig};
use crate::state::Verification;
use crate::{Context, Error};

/// Custom id of the persistent verification button.
pub const VERIFY_BUTTON_ID: &str = "verify_button";

const CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_LIMIT: usize = 10;

/// Roles exercised by `test_roles`.
const TEST_ROLES: &[&str] = &["Contributor", "Editor", "Staff", "Verified Artist"];

/// Embed and button posted by `setup_verification`.
pub fn verification_panel(config: &DynamicConfig) -> (serenity::CreateEmbed, serenity::CreateActionRow) {
    let embed = serenity::CreateEmbed::new()
        .title(config.get(keys::VERIFICATION_EMBED_TITLE, "🔐 Genius verification"))
        .description(config.get(
            keys::VERIFICATION_EMBED_DESCRIPTION,
            "Link your Genius.com account to get your roles on this server.",
        ))
        .field(
            "Why verify?",
            "• Get roles matching your Genius status\n• Show your Genius username\n• Access verified-only channels",
            false,
        )
        .footer(serenity::CreateEmbedFooter::new("Click the button below to start"))
        .color(0xffff64);
    let button = serenity::CreateButton::new(VERIFY_BUTTON_ID)
        .label(config.get(keys::VERIFICATION_BUTTON_LABEL, "Verify with Genius"))
        .style(serenity::ButtonStyle::Primary)
        .emoji(serenity::ReactionType::Unicode("🔗".to_string()));
    (embed, serenity::CreateActionRow::Buttons(vec![button]))
}

pub fn already_verified_embed(config: &DynamicConfig) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("⚠️ Already verified")
        .description(config.get(
            keys::ALREADY_VERIFIED_MESSAGE,
            "Your account is already verified.",
        ))
        .color(COLOR_WARNING)
}

/// Ephemeral response carrying the personal authorization link.
pub fn verification_link_embed(url: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("🔗 Genius verification")
        .field(
            "Instructions",
            "1. Click the link below\n2. Log in to Genius\n3. Authorize the application\n4. Come back to Discord",
            false,
        )
        .field("Link", format!("[Verify with Genius]({})", url), false)
        .footer(serenity::CreateEmbedFooter::new("This link expires in 10 minutes"))
        .color(0xffff64)
}

pub fn verification_embed(user: &serenity::User, record: &Verification) -> serenity::CreateEmbed {
    let roles = if record.genius_roles.is_empty() {
        "None".to_string()
    } else {
        record.genius_roles.join(", ")
    };
    serenity::CreateEmbed::new()
        .title("✅ Verified")
        .field("Discord", format!("<@{}>", user.id), true)
        .field("Genius Username", &record.genius_username, true)
        .field("Display Name", &record.genius_display_name, true)
        .field("Roles", roles, false)
        .field("Verified at", &record.verified_at, false)
        .color(COLOR_SUCCESS)
}

/// Post the verification message in this channel
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn setup_verification(ctx: Context<'_>) -> Result<(), Error> {
    if !staff_guard(ctx, "setup_verification").await? {
        return Ok(());
    }
    let (embed, row) = verification_panel(&ctx.data().config);
    ctx.channel_id()
        .send_message(ctx.http(), serenity::CreateMessage::new().embed(embed).components(vec![row]))
        .await?;
    info!("{} posted the verification message in {}", ctx.author().name, ctx.channel_id());

    if let poise::Context::Application(_) = ctx {
        ctx.send(
            poise::CreateReply::default()
                .content("✅ Verification message posted.")
                .ephemeral(true),
        )
        .await?;
    }
    Ok(())
}

/// Show the verification status of a member
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn verify_status(
    ctx: Context<'_>,
    #[description = "Member to look up (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    if !enabled(ctx, "verify_status") {
        return Ok(());
    }
    let target = user.unwrap_or_else(|| ctx.author().clone());
    if target.id != ctx.author().id && !is_staff(ctx).await {
        ctx.send(
            poise::CreateReply::default()
                .embed(no_permission_embed("Only staff can look up other members."))
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let embed = match ctx.data().verification_db.get_verification(target.id.get())? {
        Some(record) => verification_embed(&target, &record),
        None => serenity::CreateEmbed::new()
            .title("❌ Not verified")
            .description(format!("<@{}> has not linked a Genius account.", target.id))
            .color(COLOR_ERROR),
    };
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Remove a member's verification
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn unverify(
    ctx: Context<'_>,
    #[description = "Member to unverify"] user: serenity::User,
) -> Result<(), Error> {
    if !staff_guard(ctx, "unverify").await? {
        return Ok(());
    }
    let data = ctx.data();
    if !data.verification_db.remove_verification(user.id.get())? {
        ctx.say(format!("⚠️ <@{}> is not verified.", user.id)).await?;
        return Ok(());
    }

    let mut actions = vec!["• Verification record removed".to_string()];
    match data.role_manager.remove_genius_roles(user.id.get()).await {
        Ok(removed) => actions.push(format!("• {} role(s) removed and nickname reset", removed)),
        Err(e) => {
            warn!("Could not clean up roles for {}: {}", user.id, e);
            actions.push(format!("• Roles not removed: {}", e));
        }
    }
    info!("{} unverified {}", ctx.author().name, user.id);

    let embed = serenity::CreateEmbed::new()
        .title("✅ Verification removed")
        .description(format!("<@{}>\n\n{}", user.id, actions.join("\n")))
        .color(COLOR_SUCCESS);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Whether `user_id` is still a member of `guild_id`.
async fn is_member(ctx: Context<'_>, guild_id: serenity::GuildId, user_id: serenity::UserId) -> bool {
    let cached = ctx
        .cache()
        .guild(guild_id)
        .map(|guild| guild.members.contains_key(&user_id));
    match cached {
        Some(true) => true,
        _ => guild_id.member(ctx.http(), user_id).await.is_ok(),
    }
}

/// List verified members
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn verified_list(ctx: Context<'_>) -> Result<(), Error> {
    if !staff_guard(ctx, "verified_list").await? {
        return Ok(());
    }
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let records = ctx.data().verification_db.list_verifications()?;
    if records.is_empty() {
        ctx.say("No verified members yet.").await?;
        return Ok(());
    }

    let mut active = 0;
    let mut lines = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let present = is_member(ctx, guild_id, serenity::UserId::new(record.discord_id)).await;
        if present {
            active += 1;
        }
        if index < LIST_LIMIT {
            lines.push(format!(
                "{} <@{}> → **{}**",
                if present { "🟢" } else { "🔴" },
                record.discord_id,
                record.genius_username
            ));
        }
    }
    if records.len() > LIST_LIMIT {
        lines.push(format!("... and {} more", records.len() - LIST_LIMIT));
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!("✅ Verified members ({})", records.len()))
        .description(lines.join("\n"))
        .field("🟢 Active", active.to_string(), true)
        .field("🔴 Left the server", (records.len() - active).to_string(), true)
        .color(COLOR_SUCCESS);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Outcome line for one role in `test_roles`.
pub fn role_test_line(
    genius_role: &str,
    role_key: Option<&str>,
    role_id: Option<u64>,
    exists: bool,
) -> String {
    match (role_key, role_id) {
        (None, _) | (Some(_), None) => format!("⚠️ {} is not mapped", genius_role),
        (Some(_), Some(id)) if exists => format!("✅ {} → <@&{}>", genius_role, id),
        (Some(_), Some(id)) => format!("❌ {} → role `{}` not found", genius_role, id),
    }
}

/// Try the Genius role mapping on a member
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn test_roles(
    ctx: Context<'_>,
    #[description = "Member to receive the roles (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    if !staff_guard(ctx, "test_roles").await? {
        return Ok(());
    }
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let target = user.unwrap_or_else(|| ctx.author().clone());
    let config = &ctx.data().config;
    let guild_roles = guild_id.roles(ctx.http()).await?;

    let mut embed = serenity::CreateEmbed::new()
        .title("🧪 Role test")
        .description(format!("Testing the mapping for <@{}>", target.id))
        .color(COLOR_INFO);
    let mut to_add = Vec::new();
    for genius_role in TEST_ROLES {
        let key = keys::GENIUS_ROLE_KEYS
            .iter()
            .find(|(name, _)| name == genius_role)
            .map(|(_, key)| *key);
        let id = key.and_then(|key| config.get_id(key));
        let exists = id
            .map(|id| guild_roles.contains_key(&serenity::RoleId::new(id)))
            .unwrap_or(false);
        if exists {
            if let Some(id) = id {
                to_add.push(serenity::RoleId::new(id));
            }
        }
        embed = embed.field(*genius_role, role_test_line(genius_role, key, id, exists), false);
    }

    if to_add.is_empty() {
        embed = embed.footer(serenity::CreateEmbedFooter::new("No roles to assign"));
    } else {
        let member = guild_id.member(ctx.http(), target.id).await?;
        match member.add_roles(ctx.http(), &to_add).await {
            Ok(()) => {
                embed = embed.footer(serenity::CreateEmbedFooter::new(format!(
                    "Assigned {} role(s)",
                    to_add.len()
                )))
            }
            Err(e) => {
                warn!("test_roles could not assign roles to {}: {}", target.id, e);
                embed = embed.footer(serenity::CreateEmbedFooter::new(format!("Assignment failed: {}", e)))
            }
        }
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

enum Decision {
    Confirmed,
    Cancelled,
    Expired,
}

/// Wait for the author to confirm. Prefix invocations use ✅/❌ reactions,
/// slash invocations use buttons.
async fn await_confirmation(
    ctx: Context<'_>,
    reply: &poise::ReplyHandle<'_>,
    prefix: bool,
) -> Result<Decision, Error> {
    let message = reply.message().await?;
    if prefix {
        message.react(ctx.http(), serenity::ReactionType::Unicode("✅".to_string())).await?;
        message.react(ctx.http(), serenity::ReactionType::Unicode("❌".to_string())).await?;
        let reaction = message
            .await_reaction(ctx.serenity_context().shard.clone())
            .author_id(ctx.author().id)
            .timeout(CONFIRM_TIMEOUT)
            .await;
        return Ok(match reaction {
            Some(r) if r.emoji.unicode_eq("✅") => Decision::Confirmed,
            Some(_) => Decision::Cancelled,
            None => Decision::Expired,
        });
    }

    let press = message
        .await_component_interaction(ctx.serenity_context().shard.clone())
        .author_id(ctx.author().id)
        .timeout(CONFIRM_TIMEOUT)
        .await;
    Ok(match press {
        Some(press) => {
            press
                .create_response(ctx.http(), serenity::CreateInteractionResponse::Acknowledge)
                .await?;
            if press.data.custom_id == "cleanup_confirm" {
                Decision::Confirmed
            } else {
                Decision::Cancelled
            }
        }
        None => Decision::Expired,
    })
}

fn confirm_buttons() -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new("cleanup_confirm")
            .label("Confirm")
            .style(serenity::ButtonStyle::Danger),
        serenity::CreateButton::new("cleanup_cancel")
            .label("Cancel")
            .style(serenity::ButtonStyle::Secondary),
    ])]
}

/// Remove verifications of members who left the server
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn cleanup_verifications(ctx: Context<'_>) -> Result<(), Error> {
    if !staff_guard(ctx, "cleanup_verifications").await? {
        return Ok(());
    }
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    ctx.defer().await?;

    let mut departed = Vec::new();
    for record in ctx.data().verification_db.list_verifications()? {
        if !is_member(ctx, guild_id, serenity::UserId::new(record.discord_id)).await {
            departed.push(record);
        }
    }
    if departed.is_empty() {
        ctx.say("✅ Every verified member is still on the server.").await?;
        return Ok(());
    }

    let mut lines: Vec<String> = departed
        .iter()
        .take(LIST_LIMIT)
        .map(|r| format!("• {} (`{}`)", r.genius_username, r.discord_id))
        .collect();
    if departed.len() > LIST_LIMIT {
        lines.push(format!("... and {} more", departed.len() - LIST_LIMIT));
    }

    let prefix = matches!(ctx, poise::Context::Prefix(_));
    let embed = serenity::CreateEmbed::new()
        .title(format!("🧹 {} verification(s) to remove", departed.len()))
        .description(lines.join("\n"))
        .footer(serenity::CreateEmbedFooter::new(if prefix {
            "React with ✅ to confirm or ❌ to cancel (30s)"
        } else {
            "Confirm or cancel within 30 seconds"
        }))
        .color(COLOR_WARNING);
    let mut builder = poise::CreateReply::default().embed(embed);
    if !prefix {
        builder = builder.components(confirm_buttons());
    }
    let reply = ctx.send(builder).await?;

    let outcome = match await_confirmation(ctx, &reply, prefix).await? {
        Decision::Confirmed => {
            let ids: Vec<u64> = departed.iter().map(|r| r.discord_id).collect();
            let removed = ctx.data().verification_db.remove_verifications(&ids)?;
            info!("{} cleaned up {} verification(s)", ctx.author().name, removed);
            serenity::CreateEmbed::new()
                .title("✅ Cleanup completed")
                .description(format!("Removed {} verification(s).", removed))
                .color(COLOR_SUCCESS)
        }
        Decision::Cancelled => serenity::CreateEmbed::new()
            .title("❌ Cleanup cancelled")
            .color(COLOR_ERROR),
        Decision::Expired => serenity::CreateEmbed::new()
            .title("⏰ Confirmation expired")
            .description("Run the command again to retry.")
            .color(0x95a5a6),
    };
    reply
        .edit(ctx, poise::CreateReply::default().embed(outcome).components(vec![]))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_test_line() {
        assert_eq!(role_test_line("Editor", None, None, false), "⚠️ Editor is not mapped");
        assert_eq!(
            role_test_line("Editor", Some("ROLE_EDITOR"), None, false),
            "⚠️ Editor is not mapped"
        );
        assert_eq!(
            role_test_line("Editor", Some("ROLE_EDITOR"), Some(5), true),
            "✅ Editor → <@&5>"
        );
        assert_eq!(
            role_test_line("Editor", Some("ROLE_EDITOR"), Some(5), false),
            "❌ Editor → role `5` not found"
        );
    }

    #[test]
    fn test_test_roles_are_mapped() {
        for role in TEST_ROLES {
            assert!(keys::GENIUS_ROLE_KEYS.iter().any(|(name, _)| name == role), "{}", role);
        }
    }
}
