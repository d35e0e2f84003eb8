use poise::serenity_prelude as serenity;

use super::{staff_guard, COLOR_INFO};
use crate::config::keys;
use crate::{Context, Error};

const ROLES_PER_EMBED: usize = 10;
const MAX_EMBEDS_PER_MESSAGE: usize = 10;

fn role_mention(id: Option<u64>) -> String {
    id.map(|id| format!("<@&{}>", id))
        .unwrap_or_else(|| "❌ not configured".to_string())
}

/// Show the verification configuration
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn show_config(ctx: Context<'_>) -> Result<(), Error> {
    if !staff_guard(ctx, "show_config").await? {
        return Ok(());
    }
    let config = &ctx.data().config;

    let channel = config
        .get_id(keys::VERIFICATION_CHANNEL_ID)
        .map(|id| format!("<#{}>", id))
        .unwrap_or_else(|| "❌ not configured".to_string());

    let genius_roles: Vec<String> = keys::GENIUS_ROLE_KEYS
        .iter()
        .map(|(name, key)| format!("**{}**: {}", name, role_mention(config.get_id(key))))
        .collect();

    let missing = config.missing_configs();
    let embed = serenity::CreateEmbed::new()
        .title("⚙️ Bot configuration")
        .field("Verification channel", channel, false)
        .field("Verified role", role_mention(config.get_id(keys::VERIFIED_ROLE_ID)), false)
        .field("Genius roles", genius_roles.join("\n"), false)
        .field(
            "Status",
            if missing.is_empty() {
                "✅ All required settings are present".to_string()
            } else {
                format!("⚠️ Missing: {}", missing.join(", "))
            },
            false,
        )
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Change these at {}/panel",
            config.base_url().trim_end_matches('/')
        )))
        .color(COLOR_INFO);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// List the server roles with their ids
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn list_roles(ctx: Context<'_>) -> Result<(), Error> {
    if !staff_guard(ctx, "list_roles").await? {
        return Ok(());
    }
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };

    let mut roles: Vec<serenity::Role> = guild_id
        .roles(ctx.http())
        .await?
        .into_values()
        .filter(|role| role.id.get() != guild_id.get())
        .collect();
    roles.sort_by(|a, b| b.position.cmp(&a.position));

    if roles.is_empty() {
        ctx.say("This server has no roles besides @everyone.").await?;
        return Ok(());
    }

    let pages = roles.len().div_ceil(ROLES_PER_EMBED);
    let embeds: Vec<serenity::CreateEmbed> = roles
        .chunks(ROLES_PER_EMBED)
        .enumerate()
        .map(|(page, chunk)| {
            chunk.iter().fold(
                serenity::CreateEmbed::new()
                    .title(format!("📋 Server roles ({}/{})", page + 1, pages))
                    .color(COLOR_INFO),
                |embed, role| {
                    embed.field(
                        &role.name,
                        format!("**{}** - ID: `{}` (pos: {})", role.name, role.id, role.position),
                        false,
                    )
                },
            )
        })
        .collect();

    // A message carries at most ten embeds
    for batch in embeds.chunks(MAX_EMBEDS_PER_MESSAGE) {
        let reply = batch
            .iter()
            .cloned()
            .fold(poise::CreateReply::default(), |reply, embed| reply.embed(embed));
        ctx.send(reply).await?;
    }
    Ok(())
}
