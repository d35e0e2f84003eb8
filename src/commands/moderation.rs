use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::{info, warn};

use super::{manage_messages_guard, COLOR_ERROR, COLOR_SUCCESS, COLOR_WARNING};
use crate::{Context, Error};

const DEFAULT_AMOUNT: u8 = 10;
const MAX_AMOUNT: u8 = 100;
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

/// Bulk delete only accepts messages younger than two weeks.
const BULK_DELETE_MAX_AGE_DAYS: i64 = 14;

/// Requested amount clamped to 1..=100.
pub fn clamp_amount(amount: Option<u32>) -> u8 {
    // Bounded by MAX_AMOUNT, so the narrowing is lossless
    amount.unwrap_or(DEFAULT_AMOUNT as u32).clamp(1, MAX_AMOUNT as u32) as u8
}

/// Delete recent messages in this channel
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn clean(
    ctx: Context<'_>,
    #[description = "Number of messages to delete (max 100)"]
    amount: Option<u32>,
) -> Result<(), Error> {
    if !manage_messages_guard(ctx, "clean").await? {
        return Ok(());
    }
    let amount = clamp_amount(amount);
    let channel_id = ctx.channel_id();

    let embed = serenity::CreateEmbed::new()
        .title("🗑️ Confirm deletion")
        .description(format!("Delete the last **{}** message(s) in <#{}>?", amount, channel_id))
        .footer(serenity::CreateEmbedFooter::new("This expires in 30 seconds"))
        .color(COLOR_WARNING);
    let buttons = vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new("clean_confirm")
            .label("Delete")
            .style(serenity::ButtonStyle::Danger),
        serenity::CreateButton::new("clean_cancel")
            .label("Cancel")
            .style(serenity::ButtonStyle::Secondary),
    ])];
    let reply = ctx
        .send(poise::CreateReply::default().embed(embed).components(buttons))
        .await?;
    let prompt = reply.message().await?;

    let press = prompt
        .await_component_interaction(ctx.serenity_context().shard.clone())
        .author_id(ctx.author().id)
        .timeout(CONFIRM_TIMEOUT)
        .await;

    let outcome = match press {
        None => serenity::CreateEmbed::new()
            .title("⏰ Confirmation expired")
            .color(0x95a5a6),
        Some(press) if press.data.custom_id != "clean_confirm" => {
            press
                .create_response(ctx.http(), serenity::CreateInteractionResponse::Acknowledge)
                .await?;
            serenity::CreateEmbed::new()
                .title("❌ Deletion cancelled")
                .color(COLOR_ERROR)
        }
        Some(press) => {
            press
                .create_response(ctx.http(), serenity::CreateInteractionResponse::Acknowledge)
                .await?;

            // The invoking message is counted on top of the amount
            let before = match ctx {
                poise::Context::Prefix(prefix) => prefix.msg.id,
                _ => prompt.id,
            };
            let messages = channel_id
                .messages(ctx.http(), serenity::GetMessages::new().before(before).limit(amount))
                .await?;
            if let poise::Context::Prefix(prefix) = ctx {
                if let Err(e) = prefix.msg.delete(ctx.http()).await {
                    warn!("Could not delete the clean invocation: {}", e);
                }
            }

            let cutoff = chrono::Utc::now() - chrono::Duration::days(BULK_DELETE_MAX_AGE_DAYS);
            let (recent, old): (Vec<_>, Vec<_>) = messages
                .iter()
                .filter(|m| m.id != prompt.id)
                .partition(|m| m.timestamp.unix_timestamp() > cutoff.timestamp());
            let ids: Vec<serenity::MessageId> = recent.iter().map(|m| m.id).collect();

            let deleted = match ids.len() {
                0 => 0,
                1 => {
                    channel_id.delete_message(ctx.http(), ids[0]).await?;
                    1
                }
                n => {
                    channel_id.delete_messages(ctx.http(), &ids).await?;
                    n
                }
            };
            info!("{} deleted {} message(s) in {}", ctx.author().name, deleted, channel_id);

            let mut embed = serenity::CreateEmbed::new()
                .title("✅ Messages deleted")
                .description(format!("Deleted {} message(s).", deleted))
                .color(COLOR_SUCCESS);
            if !old.is_empty() {
                embed = embed.field(
                    "Skipped",
                    format!("{} message(s) older than 14 days", old.len()),
                    false,
                );
            }
            embed
        }
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
    fn test_clamp_amount() {
        assert_eq!(clamp_amount(None), 10);
        assert_eq!(clamp_amount(Some(0)), 1);
        assert_eq!(clamp_amount(Some(42)), 42);
        assert_eq!(clamp_amount(Some(250)), 100);
        assert_eq!(clamp_amount(Some(500)), 100);
        assert_eq!(clamp_amount(Some(u32::MAX)), 100);
    }
}
