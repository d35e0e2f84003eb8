use poise::serenity_prelude as serenity;
use poise::Modal;
use std::time::Duration;
use tracing::{info, warn};

use super::mentions::{process_mentions, MentionDirectory};
use super::{command_flag, no_permission_embed, staff_guard, COLOR_INFO, COLOR_SUCCESS};
use crate::managers::member_is_staff;
use crate::{Context, Data, Error};

/// Button on posted messages that reopens their editor.
pub const EDIT_POSTED_ID: &str = "message_edit_posted";

const PLAIN_ID: &str = "message_plain";
const EMBED_ID: &str = "message_embed";
const EDIT_ID: &str = "message_edit";
const ADD_FIELD_ID: &str = "message_add_field";
const CLEAR_FIELDS_ID: &str = "message_clear_fields";
const ADD_LINK_ID: &str = "message_add_link";
const CHANNEL_ID: &str = "message_channel";
const SEND_ID: &str = "message_send";
const CANCEL_ID: &str = "message_cancel";

const COMPOSER_TIMEOUT: Duration = Duration::from_secs(300);
const MODAL_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_FIELDS: usize = 25;
/// One slot of the five-button row stays free for the edit button.
const MAX_LINK_BUTTONS: usize = 4;
const COLOR_PREVIEW: u32 = 0x95a5a6;

#[derive(Debug, Clone, poise::Modal)]
#[name = "Plain message"]
pub struct PlainModal {
    #[name = "Content"]
    #[placeholder = "@user, @role and #channel become mentions"]
    #[paragraph]
    #[max_length = 2000]
    pub content: String,
}

#[derive(Debug, Clone, poise::Modal)]
#[name = "Embed message"]
pub struct EmbedModal {
    #[name = "Title"]
    #[max_length = 256]
    pub title: Option<String>,
    #[name = "Description"]
    #[paragraph]
    #[max_length = 4000]
    pub description: String,
    #[name = "Color (hex)"]
    #[placeholder = "#5865F2"]
    #[max_length = 7]
    pub color: Option<String>,
    #[name = "Image URL"]
    #[placeholder = "https://example.com/image.png"]
    pub image_url: Option<String>,
    #[name = "Footer"]
    #[max_length = 2048]
    pub footer: Option<String>,
}

#[derive(Debug, Clone, poise::Modal)]
#[name = "Add field"]
pub struct FieldModal {
    #[name = "Name"]
    #[max_length = 256]
    pub name: String,
    #[name = "Value"]
    #[paragraph]
    #[max_length = 1024]
    pub value: String,
    #[name = "Inline? (yes/no)"]
    #[placeholder = "yes"]
    #[max_length = 3]
    pub inline: Option<String>,
}

#[derive(Debug, Clone, poise::Modal)]
#[name = "Add link button"]
pub struct LinkModal {
    #[name = "Label"]
    #[max_length = 80]
    pub label: String,
    #[name = "URL"]
    #[placeholder = "https://example.com"]
    pub url: String,
    #[name = "Emoji"]
    #[max_length = 64]
    pub emoji: Option<String>,
}

/// `#rrggbb` or `rrggbb` to a color value.
pub fn parse_color(raw: &str) -> Option<u32> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// Inline unless the answer is a clear no. Blank means yes.
pub fn parse_inline(raw: Option<&str>) -> bool {
    !matches!(
        raw.map(|r| r.trim().to_lowercase()).as_deref(),
        Some("no" | "n" | "false")
    )
}

fn is_http_url(raw: &str) -> bool {
    raw.starts_with("https://") || raw.starts_with("http://")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
    pub emoji: Option<String>,
}

impl LinkButton {
    pub fn from_form(form: LinkModal) -> Result<Self, &'static str> {
        let url = form.url.trim().to_string();
        if !is_http_url(&url) {
            return Err("Link buttons need an http(s) URL");
        }
        Ok(Self {
            label: form.label.trim().to_string(),
            url,
            emoji: non_empty(form.emoji),
        })
    }

    fn button(&self) -> serenity::CreateButton {
        let button = serenity::CreateButton::new_link(&self.url).label(&self.label);
        match self
            .emoji
            .as_deref()
            .and_then(|e| serenity::ReactionType::try_from(e).ok())
        {
            Some(emoji) => button.emoji(emoji),
            None => button,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedDraft {
    pub title: Option<String>,
    pub description: String,
    pub color: u32,
    pub image_url: Option<String>,
    pub footer: Option<String>,
    pub fields: Vec<DraftField>,
}

impl Default for EmbedDraft {
    fn default() -> Self {
        Self {
            title: None,
            description: String::new(),
            color: COLOR_INFO,
            image_url: None,
            footer: None,
            fields: Vec::new(),
        }
    }
}

impl EmbedDraft {
    /// Draft of an embed the bot posted earlier.
    pub fn from_embed(embed: &serenity::Embed) -> Self {
        Self {
            title: embed.title.clone(),
            description: embed.description.clone().unwrap_or_default(),
            color: embed.colour.map(|c| c.0).unwrap_or(COLOR_INFO),
            image_url: embed.image.as_ref().map(|i| i.url.clone()),
            footer: embed.footer.as_ref().map(|f| f.text.clone()),
            fields: embed
                .fields
                .iter()
                .map(|f| DraftField {
                    name: f.name.clone(),
                    value: f.value.clone(),
                    inline: f.inline,
                })
                .collect(),
        }
    }

    /// Take the form values, resolving mentions. Fields are kept. Returns a
    /// note when part of the form was rejected.
    pub fn apply_form(&mut self, form: EmbedModal, mentions: &MentionDirectory) -> Option<String> {
        let mut notes = Vec::new();

        self.title = non_empty(form.title).map(|t| process_mentions(&t, mentions));
        self.description = process_mentions(&form.description, mentions);
        self.color = match non_empty(form.color) {
            None => COLOR_INFO,
            Some(raw) => parse_color(&raw).unwrap_or_else(|| {
                notes.push(format!("`{}` is not a hex color, the default is used", raw));
                COLOR_INFO
            }),
        };
        self.image_url = match non_empty(form.image_url) {
            Some(url) if !is_http_url(&url) => {
                notes.push("The image URL must start with http(s)://".to_string());
                None
            }
            url => url,
        };
        self.footer = non_empty(form.footer).map(|f| process_mentions(&f, mentions));

        (!notes.is_empty()).then(|| notes.join("\n"))
    }

    pub fn to_form(&self) -> EmbedModal {
        EmbedModal {
            title: self.title.clone(),
            description: self.description.clone(),
            color: Some(format!("#{:06X}", self.color)),
            image_url: self.image_url.clone(),
            footer: self.footer.clone(),
        }
    }

    pub fn add_field(&mut self, form: FieldModal, mentions: &MentionDirectory) -> Result<(), &'static str> {
        if self.fields.len() >= MAX_FIELDS {
            return Err("An embed holds at most 25 fields");
        }
        self.fields.push(DraftField {
            name: process_mentions(form.name.trim(), mentions),
            value: process_mentions(&form.value, mentions),
            inline: parse_inline(form.inline.as_deref()),
        });
        Ok(())
    }

    pub fn build(&self) -> serenity::CreateEmbed {
        let mut embed = serenity::CreateEmbed::new()
            .description(&self.description)
            .color(self.color);
        if let Some(title) = &self.title {
            embed = embed.title(title);
        }
        if let Some(url) = &self.image_url {
            embed = embed.image(url);
        }
        if let Some(footer) = &self.footer {
            embed = embed.footer(serenity::CreateEmbedFooter::new(footer));
        }
        for field in &self.fields {
            embed = embed.field(&field.name, &field.value, field.inline);
        }
        embed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Plain(String),
    Embed(EmbedDraft),
}

/// Final message: the body, its link buttons and the edit button.
pub fn posted_message(body: &MessageBody, links: &[LinkButton]) -> serenity::CreateMessage {
    let message = match body {
        MessageBody::Plain(text) => serenity::CreateMessage::new().content(text),
        MessageBody::Embed(draft) => serenity::CreateMessage::new().embed(draft.build()),
    };
    let mut buttons: Vec<serenity::CreateButton> = links.iter().map(LinkButton::button).collect();
    buttons.push(
        serenity::CreateButton::new(EDIT_POSTED_ID)
            .label("🔄 Edit message")
            .style(serenity::ButtonStyle::Secondary),
    );
    message.components(vec![serenity::CreateActionRow::Buttons(buttons)])
}

#[derive(Debug, Default)]
struct Composer {
    body: Option<MessageBody>,
    links: Vec<LinkButton>,
    channel: Option<serenity::ChannelId>,
}

fn composer_intro() -> (serenity::CreateEmbed, Vec<serenity::CreateActionRow>) {
    let embed = serenity::CreateEmbed::new()
        .title("📨 Compose a message")
        .description("Choose the kind of message to write.")
        .field("📝 Plain text", "A text message without formatting.", false)
        .field(
            "🎨 Embed",
            "Title, description, color, image, footer, fields and link buttons.",
            false,
        )
        .field(
            "🏷️ Mentions",
            "• Users: `@user` or `@user#1234`\n• Channels: `#channel`\n• Roles: `@role`\n• `@everyone` and `@here` are kept",
            false,
        )
        .footer(serenity::CreateEmbedFooter::new(
            "Mentions work in every text input. Posted messages can be edited later.",
        ))
        .color(COLOR_INFO);
    let buttons = vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(PLAIN_ID)
            .label("📝 Plain text")
            .style(serenity::ButtonStyle::Primary),
        serenity::CreateButton::new(EMBED_ID)
            .label("🎨 Embed")
            .style(serenity::ButtonStyle::Success),
        serenity::CreateButton::new(CANCEL_ID)
            .label("Cancel")
            .style(serenity::ButtonStyle::Secondary),
    ])];
    (embed, buttons)
}

fn preview_components(composer: &Composer) -> Vec<serenity::CreateActionRow> {
    let is_embed = matches!(composer.body, Some(MessageBody::Embed(_)));
    let mut tools = vec![serenity::CreateButton::new(EDIT_ID)
        .label("📝 Edit")
        .style(serenity::ButtonStyle::Primary)];
    if is_embed {
        tools.push(
            serenity::CreateButton::new(ADD_FIELD_ID)
                .label("➕ Add field")
                .style(serenity::ButtonStyle::Secondary),
        );
        tools.push(
            serenity::CreateButton::new(CLEAR_FIELDS_ID)
                .label("🗑️ Clear fields")
                .style(serenity::ButtonStyle::Danger),
        );
    }
    tools.push(
        serenity::CreateButton::new(ADD_LINK_ID)
            .label("🔗 Add link button")
            .style(serenity::ButtonStyle::Secondary)
            .disabled(composer.links.len() >= MAX_LINK_BUTTONS),
    );

    let mut rows = vec![serenity::CreateActionRow::Buttons(tools)];
    if !composer.links.is_empty() {
        rows.push(serenity::CreateActionRow::Buttons(
            composer.links.iter().map(LinkButton::button).collect(),
        ));
    }
    rows.push(serenity::CreateActionRow::SelectMenu(
        serenity::CreateSelectMenu::new(
            CHANNEL_ID,
            serenity::CreateSelectMenuKind::Channel {
                channel_types: Some(vec![serenity::ChannelType::Text, serenity::ChannelType::News]),
                default_channels: composer.channel.map(|c| vec![c]),
            },
        )
        .placeholder("Channel to post in"),
    ));
    rows.push(serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(SEND_ID)
            .label("✅ Send")
            .style(serenity::ButtonStyle::Success),
        serenity::CreateButton::new(CANCEL_ID)
            .label("Cancel")
            .style(serenity::ButtonStyle::Secondary),
    ]));
    rows
}

fn preview(composer: &Composer, note: Option<&str>) -> serenity::CreateInteractionResponseMessage {
    let mut lines = vec!["👀 **Preview**".to_string()];
    lines.push(match composer.channel {
        Some(channel) => format!("Posting in <#{}>.", channel),
        None => "Pick a channel below.".to_string(),
    });
    if let Some(note) = note {
        lines.push(format!("⚠️ {}", note));
    }

    let embed = match &composer.body {
        Some(MessageBody::Plain(text)) => serenity::CreateEmbed::new()
            .title("Plain message")
            .description(text)
            .color(COLOR_PREVIEW),
        Some(MessageBody::Embed(draft)) => draft.build(),
        None => composer_intro().0,
    };
    serenity::CreateInteractionResponseMessage::new()
        .content(lines.join("\n"))
        .embed(embed)
        .components(preview_components(composer))
}

fn closed(text: String) -> serenity::CreateInteractionResponse {
    serenity::CreateInteractionResponse::UpdateMessage(
        serenity::CreateInteractionResponseMessage::new()
            .content(text)
            .embeds(vec![])
            .components(vec![]),
    )
}

fn mention_directory(ctx: &serenity::Context, guild_id: Option<serenity::GuildId>) -> MentionDirectory {
    guild_id
        .and_then(|id| ctx.cache.guild(id).map(|guild| MentionDirectory::from_guild(&guild)))
        .unwrap_or_default()
}

/// Answer a button press with a modal and wait for its submission.
async fn open_modal<M: Modal>(
    ctx: &serenity::Context,
    press: &serenity::ComponentInteraction,
    defaults: Option<M>,
) -> Result<Option<(M, serenity::ModalInteraction)>, Error> {
    let custom_id = uuid::Uuid::new_v4().to_string();
    press
        .create_response(&ctx.http, M::create(defaults, custom_id.clone()))
        .await?;

    let Some(submit) = serenity::ModalInteractionCollector::new(ctx.shard.clone())
        .author_id(press.user.id)
        .filter(move |m| m.data.custom_id == custom_id)
        .timeout(MODAL_TIMEOUT)
        .await
    else {
        return Ok(None);
    };
    let form = M::parse(submit.data.clone()).map_err(Error::from)?;
    Ok(Some((form, submit)))
}

/// Compose and post a plain or embed message
#[poise::command(slash_command, guild_only)]
pub async fn message(
    ctx: Context<'_>,
    #[description = "Channel to post in"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    if !staff_guard(ctx, "message").await? {
        return Ok(());
    }
    let discord = ctx.serenity_context();
    let mentions = mention_directory(discord, ctx.guild_id());
    let mut composer = Composer {
        channel: channel.map(|c| c.id),
        ..Default::default()
    };

    let (intro, buttons) = composer_intro();
    let reply = ctx
        .send(
            poise::CreateReply::default()
                .embed(intro)
                .components(buttons)
                .ephemeral(true),
        )
        .await?;
    let message = reply.message().await?;

    while let Some(press) = message
        .await_component_interaction(discord.shard.clone())
        .author_id(ctx.author().id)
        .timeout(COMPOSER_TIMEOUT)
        .await
    {
        let action = match (press.data.custom_id.as_str(), &composer.body) {
            (EDIT_ID, Some(MessageBody::Plain(_))) => PLAIN_ID,
            (EDIT_ID, Some(MessageBody::Embed(_))) => EMBED_ID,
            (id, _) => id,
        };

        match action {
            PLAIN_ID => {
                let defaults = match &composer.body {
                    Some(MessageBody::Plain(text)) => Some(PlainModal {
                        content: text.clone(),
                    }),
                    _ => None,
                };
                let Some((form, submit)) = open_modal::<PlainModal>(discord, &press, defaults).await? else {
                    continue;
                };
                composer.body = Some(MessageBody::Plain(process_mentions(&form.content, &mentions)));
                submit
                    .create_response(
                        ctx.http(),
                        serenity::CreateInteractionResponse::UpdateMessage(preview(&composer, None)),
                    )
                    .await?;
            }
            EMBED_ID => {
                let mut draft = match &composer.body {
                    Some(MessageBody::Embed(draft)) => draft.clone(),
                    _ => EmbedDraft::default(),
                };
                let defaults = composer.body.as_ref().map(|_| draft.to_form());
                let Some((form, submit)) = open_modal::<EmbedModal>(discord, &press, defaults).await? else {
                    continue;
                };
                let note = draft.apply_form(form, &mentions);
                composer.body = Some(MessageBody::Embed(draft));
                submit
                    .create_response(
                        ctx.http(),
                        serenity::CreateInteractionResponse::UpdateMessage(preview(
                            &composer,
                            note.as_deref(),
                        )),
                    )
                    .await?;
            }
            ADD_FIELD_ID => {
                if !matches!(composer.body, Some(MessageBody::Embed(_))) {
                    press
                        .create_response(ctx.http(), serenity::CreateInteractionResponse::Acknowledge)
                        .await?;
                    continue;
                }
                let Some((form, submit)) = open_modal::<FieldModal>(discord, &press, None).await? else {
                    continue;
                };
                let note = match &mut composer.body {
                    Some(MessageBody::Embed(draft)) => draft.add_field(form, &mentions).err(),
                    _ => None,
                };
                submit
                    .create_response(
                        ctx.http(),
                        serenity::CreateInteractionResponse::UpdateMessage(preview(&composer, note)),
                    )
                    .await?;
            }
            CLEAR_FIELDS_ID => {
                if let Some(MessageBody::Embed(draft)) = &mut composer.body {
                    draft.fields.clear();
                }
                press
                    .create_response(
                        ctx.http(),
                        serenity::CreateInteractionResponse::UpdateMessage(preview(&composer, None)),
                    )
                    .await?;
            }
            ADD_LINK_ID => {
                let Some((form, submit)) = open_modal::<LinkModal>(discord, &press, None).await? else {
                    continue;
                };
                let note = if composer.links.len() >= MAX_LINK_BUTTONS {
                    Some("A message holds at most 4 link buttons")
                } else {
                    match LinkButton::from_form(form) {
                        Ok(link) => {
                            composer.links.push(link);
                            None
                        }
                        Err(e) => Some(e),
                    }
                };
                submit
                    .create_response(
                        ctx.http(),
                        serenity::CreateInteractionResponse::UpdateMessage(preview(&composer, note)),
                    )
                    .await?;
            }
            CHANNEL_ID => {
                if let serenity::ComponentInteractionDataKind::ChannelSelect { values } = &press.data.kind {
                    composer.channel = values.first().copied();
                }
                press
                    .create_response(
                        ctx.http(),
                        serenity::CreateInteractionResponse::UpdateMessage(preview(&composer, None)),
                    )
                    .await?;
            }
            SEND_ID => {
                let (Some(body), Some(channel_id)) = (&composer.body, composer.channel) else {
                    let note = if composer.body.is_none() {
                        "Write the message first"
                    } else {
                        "Pick a channel first"
                    };
                    press
                        .create_response(
                            ctx.http(),
                            serenity::CreateInteractionResponse::UpdateMessage(preview(&composer, Some(note))),
                        )
                        .await?;
                    continue;
                };

                match channel_id
                    .send_message(ctx.http(), posted_message(body, &composer.links))
                    .await
                {
                    Ok(posted) => {
                        info!(
                            "{} posted message {} in {}",
                            ctx.author().name,
                            posted.id,
                            channel_id
                        );
                        press
                            .create_response(
                                ctx.http(),
                                closed(format!(
                                    "✅ Message posted in <#{}>.\n[Jump to message]({})",
                                    channel_id,
                                    posted.link()
                                )),
                            )
                            .await?;
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("Could not post composed message in {}: {}", channel_id, e);
                        let note = format!("Could not post in <#{}>: {}", channel_id, e);
                        press
                            .create_response(
                                ctx.http(),
                                serenity::CreateInteractionResponse::UpdateMessage(preview(
                                    &composer,
                                    Some(&note),
                                )),
                            )
                            .await?;
                    }
                }
            }
            CANCEL_ID => {
                press
                    .create_response(ctx.http(), closed("Message discarded.".to_string()))
                    .await?;
                return Ok(());
            }
            _ => {
                press
                    .create_response(ctx.http(), serenity::CreateInteractionResponse::Acknowledge)
                    .await?;
            }
        }
    }

    reply
        .edit(
            ctx,
            poise::CreateReply::default()
                .content("⏰ Message composer closed.")
                .components(vec![]),
        )
        .await?;
    Ok(())
}

/// The edit button on a posted message: staff reopen its form and the
/// message is updated in place.
pub async fn edit_posted(
    ctx: &serenity::Context,
    press: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let enabled = command_flag("message")
        .map(|flag| data.config.command_enabled(flag))
        .unwrap_or(true);
    let allowed = match (press.guild_id, press.member.as_ref()) {
        (Some(guild_id), Some(member)) => enabled && member_is_staff(ctx, guild_id, member).await,
        _ => false,
    };
    if !allowed {
        press
            .create_response(
                &ctx.http,
                serenity::CreateInteractionResponse::Message(
                    serenity::CreateInteractionResponseMessage::new()
                        .embed(no_permission_embed("Only administrators and staff can edit this message."))
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    }

    let mentions = mention_directory(ctx, press.guild_id);
    let posted = &press.message;
    let (submit, update, note) = match posted.embeds.first() {
        Some(existing) => {
            let mut draft = EmbedDraft::from_embed(existing);
            let Some((form, submit)) = open_modal(ctx, press, Some(draft.to_form())).await? else {
                return Ok(());
            };
            let note = draft.apply_form(form, &mentions);
            let update = serenity::CreateInteractionResponseMessage::new().embed(draft.build());
            (submit, update, note)
        }
        None => {
            let defaults = PlainModal {
                content: posted.content.clone(),
            };
            let Some((form, submit)) = open_modal(ctx, press, Some(defaults)).await? else {
                return Ok(());
            };
            let update = serenity::CreateInteractionResponseMessage::new()
                .content(process_mentions(&form.content, &mentions));
            (submit, update, None)
        }
    };

    submit
        .create_response(&ctx.http, serenity::CreateInteractionResponse::UpdateMessage(update))
        .await?;
    info!(
        "{} edited message {} in {}",
        press.user.name, posted.id, posted.channel_id
    );

    let followup = note.unwrap_or_else(|| "✅ Message updated.".to_string());
    submit
        .create_followup(
            &ctx.http,
            serenity::CreateInteractionResponseFollowup::new()
                .embed(
                    serenity::CreateEmbed::new()
                        .description(followup)
                        .color(COLOR_SUCCESS),
                )
                .ephemeral(true),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mentions() -> MentionDirectory {
        let mut directory = MentionDirectory::default();
        directory.add_member(1, "alice", "Alice", None);
        directory.add_channel(10, "general");
        directory
    }

    fn embed_form() -> EmbedModal {
        EmbedModal {
            title: Some("Hello @alice".into()),
            description: "See #general".into(),
            color: Some("#43B581".into()),
            image_url: Some("https://example.com/a.png".into()),
            footer: Some("  ".into()),
        }
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#5865F2"), Some(0x5865f2));
        assert_eq!(parse_color("ff0000"), Some(0xff0000));
        assert_eq!(parse_color("#fff"), None);
        assert_eq!(parse_color("zzzzzz"), None);
    }

    #[test]
    fn test_parse_inline() {
        assert!(parse_inline(None));
        assert!(parse_inline(Some("")));
        assert!(parse_inline(Some("yes")));
        assert!(!parse_inline(Some(" No ")));
        assert!(!parse_inline(Some("n")));
    }

    #[test]
    fn test_apply_form_resolves_mentions() {
        let mut draft = EmbedDraft::default();
        assert_eq!(draft.apply_form(embed_form(), &mentions()), None);

        assert_eq!(draft.title.as_deref(), Some("Hello <@1>"));
        assert_eq!(draft.description, "See <#10>");
        assert_eq!(draft.color, 0x43b581);
        assert_eq!(draft.image_url.as_deref(), Some("https://example.com/a.png"));
        assert_eq!(draft.footer, None);
    }

    #[test]
    fn test_apply_form_rejects_bad_color_and_image() {
        let mut draft = EmbedDraft::default();
        let mut form = embed_form();
        form.color = Some("blue".into());
        form.image_url = Some("ftp://example.com/a.png".into());

        let note = draft.apply_form(form, &mentions()).unwrap();
        assert!(note.contains("`blue`"));
        assert!(note.contains("image URL"));
        assert_eq!(draft.color, COLOR_INFO);
        assert_eq!(draft.image_url, None);
    }

    #[test]
    fn test_fields_survive_form_edits() {
        let mut draft = EmbedDraft::default();
        draft.apply_form(embed_form(), &mentions());
        draft
            .add_field(
                FieldModal {
                    name: "Where".into(),
                    value: "#general".into(),
                    inline: Some("no".into()),
                },
                &mentions(),
            )
            .unwrap();

        let mut form = draft.to_form();
        assert_eq!(form.color.as_deref(), Some("#43B581"));
        form.title = None;
        draft.apply_form(form, &mentions());

        assert_eq!(draft.title, None);
        assert_eq!(
            draft.fields,
            vec![DraftField {
                name: "Where".into(),
                value: "<#10>".into(),
                inline: false,
            }]
        );
    }

    #[test]
    fn test_field_limit() {
        let mut draft = EmbedDraft::default();
        let field = FieldModal {
            name: "n".into(),
            value: "v".into(),
            inline: None,
        };
        for _ in 0..MAX_FIELDS {
            draft.add_field(field.clone(), &mentions()).unwrap();
        }
        assert!(draft.add_field(field, &mentions()).is_err());
    }

    #[test]
    fn test_build_embed() {
        let mut draft = EmbedDraft::default();
        draft.apply_form(embed_form(), &mentions());
        draft.footer = Some("Footer".into());
        draft.fields.push(DraftField {
            name: "A".into(),
            value: "B".into(),
            inline: true,
        });

        let json = serde_json::to_value(draft.build()).unwrap();
        assert_eq!(json["title"], "Hello <@1>");
        assert_eq!(json["description"], "See <#10>");
        assert_eq!(json["color"], 0x43b581);
        assert_eq!(json["footer"]["text"], "Footer");
        assert_eq!(json["image"]["url"], "https://example.com/a.png");
        assert_eq!(json["fields"][0]["name"], "A");
        assert_eq!(json["fields"][0]["inline"], true);
    }

    #[test]
    fn test_draft_from_posted_embed() {
        let posted: serenity::Embed = serde_json::from_value(serde_json::json!({
            "title": "Rules",
            "description": "Be nice",
            "color": 0xf04747,
            "footer": { "text": "Staff" },
            "fields": [{ "name": "One", "value": "No spam", "inline": false }]
        }))
        .unwrap();

        let draft = EmbedDraft::from_embed(&posted);
        assert_eq!(draft.title.as_deref(), Some("Rules"));
        assert_eq!(draft.color, 0xf04747);
        assert_eq!(draft.footer.as_deref(), Some("Staff"));
        assert_eq!(draft.fields.len(), 1);
        assert_eq!(draft.to_form().color.as_deref(), Some("#F04747"));
    }

    #[test]
    fn test_link_button_needs_http_url() {
        let form = |url: &str| LinkModal {
            label: "Docs".into(),
            url: url.into(),
            emoji: Some(" ".into()),
        };
        let link = LinkButton::from_form(form(" https://genius.com ")).unwrap();
        assert_eq!(link.url, "https://genius.com");
        assert_eq!(link.emoji, None);
        assert!(LinkButton::from_form(form("genius.com")).is_err());
    }

    #[test]
    fn test_posted_message_has_links_and_edit_button() {
        let links = vec![LinkButton {
            label: "Genius".into(),
            url: "https://genius.com".into(),
            emoji: None,
        }];
        let message = posted_message(&MessageBody::Plain("Hi <@1>".into()), &links);
        let json = serde_json::to_string(&message).unwrap();

        assert!(json.contains("Hi <@1>"));
        assert!(json.contains("https://genius.com"));
        assert!(json.contains(EDIT_POSTED_ID));
    }
}
