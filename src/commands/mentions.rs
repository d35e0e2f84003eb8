//! Plain-text `@user`, `@role` and `#channel` references to Discord mentions.

use poise::serenity_prelude as serenity;

#[derive(Debug, Clone)]
struct KnownMember {
    id: u64,
    name: String,
    display_name: String,
    discriminator: Option<u16>,
}

/// Names a guild's members, roles and channels can be mentioned by.
#[derive(Debug, Clone, Default)]
pub struct MentionDirectory {
    members: Vec<KnownMember>,
    roles: Vec<(u64, String)>,
    channels: Vec<(u64, String)>,
}

impl MentionDirectory {
    pub fn from_guild(guild: &serenity::Guild) -> Self {
        let mut directory = Self::default();
        for member in guild.members.values() {
            directory.add_member(
                member.user.id.get(),
                &member.user.name,
                member.display_name(),
                member.user.discriminator.map(|d| d.get()),
            );
        }
        for role in guild.roles.values() {
            if role.id.get() != guild.id.get() {
                directory.add_role(role.id.get(), &role.name);
            }
        }
        for channel in guild.channels.values() {
            directory.add_channel(channel.id.get(), &channel.name);
        }
        directory
    }

    pub fn add_member(&mut self, id: u64, name: &str, display_name: &str, discriminator: Option<u16>) {
        self.members.push(KnownMember {
            id,
            name: name.to_string(),
            display_name: display_name.to_string(),
            discriminator,
        });
    }

    pub fn add_role(&mut self, id: u64, name: &str) {
        self.roles.push((id, name.to_string()));
        // Longest names first so "Staff Team" wins over "Staff"
        self.roles.sort_by_key(|(_, name)| std::cmp::Reverse(name.chars().count()));
    }

    pub fn add_channel(&mut self, id: u64, name: &str) {
        self.channels.push((id, name.to_string()));
    }

    /// Mention for the text right after an `@`, with the bytes it consumed.
    fn resolve_at(&self, after: &str) -> Option<(String, usize)> {
        let token = take_while(after, |c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if token.is_empty() || matches!(token.to_lowercase().as_str(), "everyone" | "here") {
            return None;
        }

        if let Some(discriminator) = after[token.len()..]
            .strip_prefix('#')
            .map(|rest| take_while(rest, |c| c.is_ascii_digit()))
            .filter(|digits| digits.len() == 4)
        {
            let wanted = discriminator.parse::<u16>().ok();
            if let Some(member) = self
                .members
                .iter()
                .find(|m| m.discriminator == wanted && m.name.to_lowercase() == token.to_lowercase())
            {
                return Some((format!("<@{}>", member.id), token.len() + 1 + discriminator.len()));
            }
        }

        for candidate in [token, token.trim_end_matches('.')] {
            let lower = candidate.to_lowercase();
            let member = self
                .members
                .iter()
                .find(|m| m.display_name.to_lowercase() == lower)
                .or_else(|| self.members.iter().find(|m| m.name.to_lowercase() == lower));
            if let Some(member) = member {
                return Some((format!("<@{}>", member.id), candidate.len()));
            }
        }

        self.roles.iter().find_map(|(id, name)| {
            let rest = strip_prefix_ignore_case(after, name)?;
            let at_boundary = rest
                .chars()
                .next()
                .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
            at_boundary.then(|| (format!("<@&{}>", id), after.len() - rest.len()))
        })
    }

    fn resolve_hash(&self, after: &str) -> Option<(String, usize)> {
        let token = take_while(after, |c| c.is_alphanumeric() || matches!(c, '_' | '-'));
        if token.is_empty() {
            return None;
        }
        let lower = token.to_lowercase();
        self.channels
            .iter()
            .find(|(_, name)| name.to_lowercase() == lower)
            .map(|(id, _)| (format!("<#{}>", id), token.len()))
    }
}

fn take_while(text: &str, keep: impl Fn(char) -> bool) -> &str {
    let end = text.find(|c: char| !keep(c)).unwrap_or(text.len());
    &text[..end]
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = text.char_indices();
    for wanted in prefix.chars() {
        let (_, c) = chars.next()?;
        if !c.to_lowercase().eq(wanted.to_lowercase()) {
            return None;
        }
    }
    let end = chars.next().map_or(text.len(), |(i, _)| i);
    Some(&text[end..])
}

/// Rewrite `@name`, `@name#1234`, `@Role Name` and `#channel` into mentions.
///
/// Existing `<@id>`-style mentions, `@everyone`, `@here`, e-mail addresses and
/// unknown names are left as they are.
pub fn process_mentions(text: &str, directory: &MentionDirectory) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut prev: Option<char> = None;

    while let Some(c) = rest.chars().next() {
        let after = &rest[c.len_utf8()..];
        let starts_mention = prev.map_or(true, |p| p != '<' && !p.is_alphanumeric());
        let resolved = match c {
            '@' if starts_mention => directory.resolve_at(after),
            '#' if starts_mention => directory.resolve_hash(after),
            _ => None,
        };

        match resolved {
            Some((mention, used)) => {
                out.push_str(&mention);
                rest = &after[used..];
                prev = Some('>');
            }
            None => {
                out.push(c);
                rest = after;
                prev = Some(c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> MentionDirectory {
        let mut directory = MentionDirectory::default();
        directory.add_member(1, "alice", "Alice W", None);
        directory.add_member(2, "bob", "bob", Some(42));
        directory.add_member(3, "carol", "Bobby", None);
        directory.add_role(20, "Staff");
        directory.add_role(21, "Staff Team");
        directory.add_channel(10, "general");
        directory.add_channel(11, "rules-and-faq");
        directory
    }

    #[test]
    fn test_members() {
        let d = directory();
        assert_eq!(process_mentions("hi @alice!", &d), "hi <@1>!");
        assert_eq!(process_mentions("@BOB#0042 and @bobby", &d), "<@2> and <@3>");
        assert_eq!(process_mentions("thanks @alice.", &d), "thanks <@1>.");
    }

    #[test]
    fn test_roles_and_channels() {
        let d = directory();
        assert_eq!(
            process_mentions("@Staff Team read #Rules-and-FAQ", &d),
            "<@&21> read <#11>"
        );
        assert_eq!(process_mentions("ping @staff, see #general", &d), "ping <@&20>, see <#10>");
        assert_eq!(process_mentions("@Staffers", &d), "@Staffers");
    }

    #[test]
    fn test_left_alone() {
        let d = directory();
        for text in [
            "@everyone @here",
            "<@1> <@&20> <#10>",
            "mail alice@alice.example",
            "@nobody in #nowhere",
            "C# and #",
        ] {
            assert_eq!(process_mentions(text, &d), text);
        }
    }
}
