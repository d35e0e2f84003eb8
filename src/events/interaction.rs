use poise::serenity_prelude as serenity;
use tracing::{info, warn};

use crate::commands::message::{edit_posted, EDIT_POSTED_ID};
use crate::commands::verification::{already_verified_embed, verification_link_embed, VERIFY_BUTTON_ID};
use crate::commands::COLOR_ERROR;
use crate::error::BotError;
use crate::{Data, Error};

/// Persistent buttons. Collector-driven buttons are handled by their command.
pub async fn handle_component(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    match component.data.custom_id.as_str() {
        VERIFY_BUTTON_ID => {}
        EDIT_POSTED_ID => return edit_posted(ctx, component, data).await,
        _ => return Ok(()),
    }

    let user = &component.user;
    let embed = match data.verifications.begin(user.id.get()) {
        Ok(url) => {
            info!("Started verification for {} ({})", user.name, user.id);
            verification_link_embed(&url)
        }
        Err(BotError::AlreadyVerified { .. }) => already_verified_embed(&data.config),
        Err(e) => {
            warn!("Could not start verification for {}: {}", user.id, e);
            serenity::CreateEmbed::new()
                .title("❌ Verification unavailable")
                .description(data.config.get(
                    crate::config::keys::ERROR_VERIFICATION_MESSAGE,
                    "Verification is not available right now. Please try again later.",
                ))
                .color(COLOR_ERROR)
        }
    };

    component
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}
