//! Genius account flags to role names.

use tracing::{debug, warn};

use super::client::GeniusUser;

pub const VERIFIED_ARTIST: &str = "Verified Artist";
pub const STAFF: &str = "Staff";
pub const MODERATOR: &str = "Moderator";
pub const EDITOR: &str = "Editor";
pub const TRANSCRIBER: &str = "Transcriber";
pub const MEDIATOR: &str = "Mediator";
pub const CONTRIBUTOR: &str = "Contributor";

/// Every role the bot knows how to map, in display order.
pub const ALL_ROLES: &[&str] = &[
    VERIFIED_ARTIST,
    STAFF,
    MODERATOR,
    EDITOR,
    TRANSCRIBER,
    MEDIATOR,
    CONTRIBUTOR,
];

fn slug(role: &str) -> String {
    role.to_lowercase().replace(' ', "_")
}

/// Role name for a `roles_for_display` entry such as `verified_artist`.
pub fn role_from_slug(value: &str) -> Option<&'static str> {
    let normalized = slug(value.trim());
    ALL_ROLES.iter().copied().find(|role| slug(role) == normalized)
}

/// Every known role whose slug (or spaced name) occurs in a free-text
/// `role_for_display`, in display order.
pub fn roles_in_display_text(display: &str) -> Vec<&'static str> {
    let display = display.to_lowercase();
    ALL_ROLES
        .iter()
        .copied()
        .filter(|role| display.contains(&slug(role)) || display.contains(&role.to_lowercase()))
        .collect()
}

/// Resolve the role names for a Genius user.
///
/// `roles_for_display` wins when any entry maps. Otherwise the artist and
/// staff flags and the `role_for_display` text are consulted, and a user with
/// no signal at all is a Contributor.
pub fn map_genius_roles(user: &GeniusUser) -> Vec<String> {
    fn push(roles: &mut Vec<String>, role: &str) {
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
    }

    let mut roles: Vec<String> = Vec::new();

    for slug in &user.roles_for_display {
        match role_from_slug(slug) {
            Some(role) => push(&mut roles, role),
            None => warn!("Unmapped Genius role '{}'", slug),
        }
    }
    if !roles.is_empty() {
        debug!("Roles from roles_for_display: {:?}", roles);
        return roles;
    }

    if user.artist.as_ref().is_some_and(|a| a.is_verified.unwrap_or(false)) {
        push(&mut roles, VERIFIED_ARTIST);
    }
    if user.staff.unwrap_or(false) || user.is_staff.unwrap_or(false) {
        push(&mut roles, STAFF);
    }
    if let Some(display) = user.role_for_display.as_deref() {
        for role in roles_in_display_text(display) {
            push(&mut roles, role);
        }
    }
    if roles.is_empty() {
        push(&mut roles, CONTRIBUTOR);
    }

    debug!("Roles from account flags: {:?}", roles);
    roles
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::client::GeniusArtist;

    fn user() -> GeniusUser {
        GeniusUser {
            id: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_roles_for_display_exact() {
        let mut u = user();
        u.roles_for_display = vec!["verified_artist".into(), "editor".into()];
        u.staff = Some(true);

        assert_eq!(map_genius_roles(&u), vec![VERIFIED_ARTIST, EDITOR]);
    }

    #[test]
    fn test_no_signal_is_contributor() {
        assert_eq!(map_genius_roles(&user()), vec![CONTRIBUTOR]);
    }

    #[test]
    fn test_flags_when_display_list_unmapped() {
        let mut u = user();
        u.roles_for_display = vec!["wizard".into()];
        u.artist = Some(GeniusArtist {
            is_verified: Some(true),
        });
        u.is_staff = Some(true);
        u.role_for_display = Some("Staff".into());

        assert_eq!(map_genius_roles(&u), vec![VERIFIED_ARTIST, STAFF]);
    }

    #[test]
    fn test_display_string_substring() {
        let mut u = user();
        u.role_for_display = Some("Senior Editor".into());
        assert_eq!(map_genius_roles(&u), vec![EDITOR]);
    }

    #[test]
    fn test_display_string_verified_artist() {
        let mut u = user();
        u.role_for_display = Some("verified_artist".into());
        assert_eq!(map_genius_roles(&u), vec![VERIFIED_ARTIST]);
    }

    #[test]
    fn test_display_string_keeps_every_match() {
        let mut u = user();
        u.role_for_display = Some("editor, transcriber".into());
        assert_eq!(map_genius_roles(&u), vec![EDITOR, TRANSCRIBER]);

        u.staff = Some(true);
        u.role_for_display = Some("Staff / Mediator".into());
        assert_eq!(map_genius_roles(&u), vec![STAFF, MEDIATOR]);
    }

    #[test]
    fn test_duplicates_removed() {
        let mut u = user();
        u.roles_for_display = vec!["Editor".into(), "editor".into(), "verified artist".into()];
        assert_eq!(map_genius_roles(&u), vec![EDITOR, VERIFIED_ARTIST]);
    }
}
