use poise::serenity_prelude::{self as serenity, GuildId, Http, Member, Permissions, Role, RoleId};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Role names that grant staff access, English and Spanish.
pub const STAFF_ROLE_NAMES: &[&str] = &["Staff", "Moderator", "Editor", "Moderador"];

/// Administrator, or holder of one of [`STAFF_ROLE_NAMES`].
pub fn is_staff_from_parts(is_admin: bool, role_names: &[String]) -> bool {
    is_admin || role_names.iter().any(|name| STAFF_ROLE_NAMES.contains(&name.as_str()))
}

fn member_role_names(roles: &HashMap<RoleId, Role>, member: &Member) -> Vec<String> {
    member
        .roles
        .iter()
        .filter_map(|id| roles.get(id))
        .map(|role| role.name.clone())
        .collect()
}

/// Guild-level permissions and role names of `member`. Uses the cache and
/// falls back to a guild fetch.
async fn member_permissions(
    ctx: &serenity::Context,
    guild_id: GuildId,
    member: &Member,
) -> Option<(Permissions, Vec<String>)> {
    let cached = ctx.cache.guild(guild_id).map(|guild| {
        #[allow(deprecated)]
        let permissions = guild.member_permissions(member);
        (permissions, member_role_names(&guild.roles, member))
    });
    if cached.is_some() {
        return cached;
    }

    match guild_id.to_partial_guild(&ctx.http).await {
        Ok(guild) => {
            #[allow(deprecated)]
            let permissions = guild.member_permissions(member);
            Some((permissions, member_role_names(&guild.roles, member)))
        }
        Err(e) => {
            warn!("Could not load guild {} for permission check: {}", guild_id, e);
            None
        }
    }
}

/// Staff predicate for a guild member.
pub async fn member_is_staff(ctx: &serenity::Context, guild_id: GuildId, member: &Member) -> bool {
    match member_permissions(ctx, guild_id, member).await {
        Some((permissions, names)) => is_staff_from_parts(permissions.administrator(), &names),
        None => false,
    }
}

/// MANAGE_MESSAGES holders and staff may bulk delete.
pub fn can_manage_messages_from_parts(permissions: Permissions, role_names: &[String]) -> bool {
    permissions.manage_messages() || is_staff_from_parts(permissions.administrator(), role_names)
}

pub async fn member_can_manage_messages(
    ctx: &serenity::Context,
    guild_id: GuildId,
    member: &Member,
) -> bool {
    match member_permissions(ctx, guild_id, member).await {
        Some((permissions, names)) => can_manage_messages_from_parts(permissions, &names),
        None => false,
    }
}

#[derive(Debug, Clone)]
pub struct PermissionStatus {
    pub name: &'static str,
    pub description: &'static str,
    pub has_permission: bool,
}

/// Permissions the bot needs for verification and moderation.
pub fn get_required_permissions() -> Vec<(&'static str, &'static str, Permissions)> {
    vec![
        ("MANAGE_ROLES", "Assign verification roles", Permissions::MANAGE_ROLES),
        ("MANAGE_NICKNAMES", "Set Genius display names", Permissions::MANAGE_NICKNAMES),
        ("MANAGE_MESSAGES", "Bulk delete with clean", Permissions::MANAGE_MESSAGES),
        ("ADD_REACTIONS", "Welcome reactions and confirmations", Permissions::ADD_REACTIONS),
        ("SEND_MESSAGES", "Reply to commands", Permissions::SEND_MESSAGES),
        ("EMBED_LINKS", "Send embeds", Permissions::EMBED_LINKS),
        ("READ_MESSAGE_HISTORY", "Read messages to clean", Permissions::READ_MESSAGE_HISTORY),
    ]
}

#[derive(Debug)]
pub struct GuildPermissionCheck {
    pub guild_id: GuildId,
    pub guild_name: String,
    pub permission_statuses: Vec<PermissionStatus>,
    pub has_all_permissions: bool,
    pub bot_role_position: Option<u16>,
    /// Configured roles at or above the bot's highest role.
    pub unmanageable_roles: Vec<(String, u16)>,
}

impl GuildPermissionCheck {
    pub fn missing(&self) -> Vec<&'static str> {
        self.permission_statuses
            .iter()
            .filter(|s| !s.has_permission)
            .map(|s| s.name)
            .collect()
    }

    pub fn is_ok(&self) -> bool {
        self.has_all_permissions && self.unmanageable_roles.is_empty()
    }
}

/// Check the bot's permissions in a guild and whether it can hand out
/// `managed_roles`.
pub async fn check_guild_permissions(
    http: &Http,
    guild_id: GuildId,
    managed_roles: &[RoleId],
) -> Result<GuildPermissionCheck, String> {
    let guild = guild_id
        .to_partial_guild(http)
        .await
        .map_err(|e| format!("Failed to fetch guild {}: {}", guild_id, e))?;

    let bot_user = http
        .get_current_user()
        .await
        .map_err(|e| format!("Failed to get bot user: {}", e))?;

    let bot_member = guild
        .member(http, bot_user.id)
        .await
        .map_err(|e| format!("Failed to get bot member in guild {}: {}", guild_id, e))?;

    #[allow(deprecated)]
    let bot_permissions = guild.member_permissions(&bot_member);
    let is_admin = bot_permissions.administrator();

    let permission_statuses: Vec<PermissionStatus> = get_required_permissions()
        .into_iter()
        .map(|(name, description, permission)| PermissionStatus {
            name,
            description,
            has_permission: is_admin || bot_permissions.contains(permission),
        })
        .collect();
    let has_all_permissions = permission_statuses.iter().all(|s| s.has_permission);

    let bot_role_position = bot_member
        .roles
        .iter()
        .filter_map(|id| guild.roles.get(id))
        .map(|role| role.position)
        .max();

    let mut unmanageable_roles: Vec<(String, u16)> = managed_roles
        .iter()
        .filter_map(|id| guild.roles.get(id))
        .filter(|role| bot_role_position.map_or(true, |bot_pos| role.position >= bot_pos))
        .map(|role| (role.name.clone(), role.position))
        .collect();
    unmanageable_roles.sort_by(|a, b| b.1.cmp(&a.1));

    Ok(GuildPermissionCheck {
        guild_id,
        guild_name: guild.name.clone(),
        permission_statuses,
        has_all_permissions,
        bot_role_position,
        unmanageable_roles,
    })
}

pub fn log_permission_check_results(results: &[GuildPermissionCheck]) {
    info!("========================================");
    info!("       BOT PERMISSION CHECK");
    info!("========================================");

    for check in results {
        info!("Guild: '{}' (ID: {})", check.guild_name, check.guild_id);
        for status in &check.permission_statuses {
            if status.has_permission {
                info!("  [YES] {:<20} - {}", status.name, status.description);
            } else {
                error!("  [NO]  {:<20} - {}", status.name, status.description);
            }
        }

        match check.bot_role_position {
            Some(pos) => info!("  Bot's highest role position: {}", pos),
            None => warn!("  Bot has no roles assigned!"),
        }
        for (name, pos) in &check.unmanageable_roles {
            warn!("  Cannot assign '{}' (position {}): move the bot's role above it", name, pos);
        }

        if check.is_ok() {
            info!("Status: ALL CHECKS PASSED");
        } else if !check.has_all_permissions {
            error!("  Missing permissions: {}", check.missing().join(", "));
        }
        info!("----------------------------------------");
    }
}

/// Check every guild and log the outcome. Returns true when nothing is missing.
pub async fn run_startup_permission_check(
    http: &Http,
    guild_ids: &[GuildId],
    managed_roles: &[RoleId],
) -> bool {
    let mut results = Vec::new();
    for guild_id in guild_ids {
        match check_guild_permissions(http, *guild_id, managed_roles).await {
            Ok(check) => results.push(check),
            Err(e) => error!("Failed to check permissions for guild {}: {}", guild_id, e),
        }
    }
    log_permission_check_results(&results);

    let all_ok = results.iter().all(GuildPermissionCheck::is_ok);
    if !all_ok {
        warn!("Permission issues detected; some commands may fail");
    }
    all_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_predicate() {
        assert!(is_staff_from_parts(true, &[]));
        assert!(is_staff_from_parts(false, &["Member".into(), "Moderador".into()]));
        assert!(!is_staff_from_parts(false, &["Member".into(), "staff".into()]));
        assert!(!is_staff_from_parts(false, &[]));
    }

    #[test]
    fn test_manage_messages_or_staff() {
        assert!(can_manage_messages_from_parts(Permissions::MANAGE_MESSAGES, &[]));
        assert!(can_manage_messages_from_parts(Permissions::ADMINISTRATOR, &[]));
        assert!(can_manage_messages_from_parts(Permissions::empty(), &["Editor".into()]));
        assert!(!can_manage_messages_from_parts(
            Permissions::SEND_MESSAGES | Permissions::READ_MESSAGE_HISTORY,
            &["Member".into()]
        ));
    }

    #[test]
    fn test_required_permissions_listed_once() {
        let perms = get_required_permissions();
        let names: std::collections::HashSet<_> = perms.iter().map(|p| p.0).collect();
        assert_eq!(names.len(), perms.len());
        assert!(names.contains("MANAGE_ROLES"));
    }
}
