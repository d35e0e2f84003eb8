pub mod interaction;
pub mod member;
pub mod message;

use poise::serenity_prelude as serenity;
use tracing::{error, info};

use crate::{Data, Error};

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!(
                "{} is connected to {} guild(s)",
                data_about_bot.user.name,
                data_about_bot.guilds.len()
            );
            let mut status = data.bot_status.write().await;
            status.ready = true;
            status.bot_name = Some(data_about_bot.user.name.clone());
            status.guild_count = data_about_bot.guilds.len();
        }
        serenity::FullEvent::CacheReady { guilds } => {
            data.bot_status.write().await.guild_count = guilds.len();
        }
        serenity::FullEvent::GuildCreate { guild, .. } => {
            info!("Available in guild: {} ({})", guild.name, guild.id);
            data.bot_status.write().await.guild_count = ctx.cache.guild_count();
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            info!("Removed from guild {}", incomplete.id);
            data.bot_status.write().await.guild_count = ctx.cache.guild_count();
        }
        serenity::FullEvent::ShardStageUpdate { event } => {
            let connected = event.new == serenity::ConnectionStage::Connected;
            data.bot_status.write().await.ready = connected;
            if !connected {
                info!("Shard {:?} is {:?}", event.shard_id, event.new);
            }
        }
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = message::handle_message(ctx, new_message, data).await {
                error!("Failed to handle message: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            if let Err(e) = member::handle_member_removal(*guild_id, user, data).await {
                error!("Failed to handle member removal: {}", e);
            }
        }
        serenity::FullEvent::InteractionCreate { interaction } => {
            if let serenity::Interaction::Component(component) = interaction {
                if let Err(e) = interaction::handle_component(ctx, component, data).await {
                    error!("Failed to handle component interaction: {}", e);
                }
            }
        }
        _ => {}
    }
    Ok(())
}
