//! Control panel form layout: which keys each section edits and how.

use super::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Password,
    Text,
    Url,
    Number,
    Checkbox,
    Textarea,
}

impl FieldKind {
    pub fn input_type(self) -> &'static str {
        match self {
            FieldKind::Password => "password",
            FieldKind::Text => "text",
            FieldKind::Url => "url",
            FieldKind::Number => "number",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Textarea => "textarea",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn field(key: &'static str, label: &'static str, kind: FieldKind, required: bool) -> Field {
    Field {
        key,
        label,
        kind,
        required,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    General,
    Commands,
    Messages,
    Verification,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::General,
        Section::Commands,
        Section::Messages,
        Section::Verification,
    ];

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.slug() == slug)
    }

    pub fn slug(self) -> &'static str {
        match self {
            Section::General => "general",
            Section::Commands => "commands",
            Section::Messages => "messages",
            Section::Verification => "verification",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Section::General => "General settings",
            Section::Commands => "Commands",
            Section::Messages => "Messages",
            Section::Verification => "Verification embed",
        }
    }

    /// Path of the form page. The general section lives at `/config`.
    pub fn path(self) -> String {
        match self {
            Section::General => "/config".to_string(),
            other => format!("/config/{}", other.slug()),
        }
    }

    pub fn fields(self) -> Vec<Field> {
        match self {
            Section::General => GENERAL.to_vec(),
            Section::Commands => keys::COMMAND_FLAGS
                .iter()
                .map(|&(flag, name)| Field {
                    key: flag,
                    label: name,
                    kind: FieldKind::Checkbox,
                    required: false,
                })
                .collect(),
            Section::Messages => MESSAGES.to_vec(),
            Section::Verification => VERIFICATION.to_vec(),
        }
    }
}

const GENERAL: &[Field] = &[
    field(keys::DISCORD_TOKEN, "Discord token", FieldKind::Password, true),
    field(keys::GENIUS_CLIENT_ID, "Genius client id", FieldKind::Text, true),
    field(keys::GENIUS_CLIENT_SECRET, "Genius client secret", FieldKind::Password, true),
    field(keys::BASE_URL, "Public base URL", FieldKind::Url, true),
    field(keys::VERIFICATION_CHANNEL_ID, "Verification channel id", FieldKind::Text, false),
    field(keys::VERIFIED_ROLE_ID, "Verified role id", FieldKind::Text, false),
    field("ROLE_VERIFIED_ARTIST", "Verified Artist role id", FieldKind::Text, false),
    field("ROLE_STAFF", "Staff role id", FieldKind::Text, false),
    field("ROLE_MODERATOR", "Moderator role id", FieldKind::Text, false),
    field("ROLE_EDITOR", "Editor role id", FieldKind::Text, false),
    field("ROLE_TRANSCRIBER", "Transcriber role id", FieldKind::Text, false),
    field("ROLE_MEDIATOR", "Mediator role id", FieldKind::Text, false),
    field("ROLE_CONTRIBUTOR", "Contributor role id", FieldKind::Text, false),
    field(keys::CMD_PREFIX, "Command prefix", FieldKind::Text, false),
    field(keys::KEEP_ALIVE_ENABLED, "Keep-alive enabled", FieldKind::Checkbox, false),
    field(keys::KEEP_ALIVE_INTERVAL, "Keep-alive interval (s)", FieldKind::Number, false),
    field(keys::WELCOME_REACTION_ENABLED, "Welcome reactions", FieldKind::Checkbox, false),
];

const MESSAGES: &[Field] = &[
    field(keys::WELCOME_MESSAGE_TEXT, "Welcome", FieldKind::Textarea, false),
    field(keys::SUCCESS_VERIFICATION_MESSAGE, "Verification succeeded", FieldKind::Textarea, false),
    field(keys::ERROR_VERIFICATION_MESSAGE, "Verification failed", FieldKind::Textarea, false),
    field(keys::OAUTH_ERROR_MESSAGE, "OAuth error", FieldKind::Textarea, false),
    field(keys::ALREADY_VERIFIED_MESSAGE, "Already verified", FieldKind::Textarea, false),
    field(keys::VERIFICATION_TIMEOUT_MESSAGE, "Link expired", FieldKind::Textarea, false),
    field(keys::ROLE_ASSIGNMENT_SUCCESS_MESSAGE, "Roles assigned", FieldKind::Textarea, false),
    field(keys::ROLE_ASSIGNMENT_ERROR_MESSAGE, "Role assignment failed", FieldKind::Textarea, false),
];

const VERIFICATION: &[Field] = &[
    field(keys::VERIFICATION_EMBED_TITLE, "Embed title", FieldKind::Text, false),
    field(keys::VERIFICATION_EMBED_DESCRIPTION, "Embed description", FieldKind::Textarea, false),
    field(keys::VERIFICATION_BUTTON_LABEL, "Button label", FieldKind::Text, false),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_round_trip() {
        for section in Section::ALL {
            assert_eq!(Section::from_slug(section.slug()), Some(section));
        }
        assert_eq!(Section::from_slug("nope"), None);
    }

    #[test]
    fn test_every_field_is_a_seeded_key() {
        let seeded: Vec<_> = keys::default_entries().into_iter().map(|e| e.key).collect();
        for section in Section::ALL {
            for field in section.fields() {
                assert!(seeded.contains(&field.key), "{} is not seeded", field.key);
            }
        }
    }

    #[test]
    fn test_general_path() {
        assert_eq!(Section::General.path(), "/config");
        assert_eq!(Section::Messages.path(), "/config/messages");
    }
}
