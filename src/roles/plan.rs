/// Pure role planning: which members gain or lose the role
use serde::Deserialize;
use std::collections::HashSet;

use crate::schedule::UserId;

/// Guild role as returned by `GET /guilds/{id}/roles`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GuildRole {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    pub name: String,
    pub position: i64,
}

/// Guild member reduced to what reconciliation needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: UserId,
    pub display_name: String,
    pub role_ids: Vec<u64>,
    pub bot: bool,
}

impl Member {
    pub fn has_role(&self, role_id: u64) -> bool {
        self.role_ids.contains(&role_id)
    }
}

/// Guild state needed before touching any member
#[derive(Debug, Clone)]
pub struct GuildSnapshot {
    pub guild_name: String,
    pub role: GuildRole,
    pub bot_top_position: i64,
    pub members: Vec<Member>,
}

impl GuildSnapshot {
    pub fn member(&self, user_id: UserId) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    /// Whether the bot ranks above the managed role
    pub fn can_manage(&self) -> bool {
        can_manage_role(self.bot_top_position, self.role.position)
    }
}

/// Result of the guild pre-checks
#[derive(Debug, Clone)]
pub enum GuildCheck {
    /// The guild does not exist or the bot is not in it
    GuildNotFound { guild_id: u64 },
    /// No role with the configured name
    RoleMissing { guild_name: String },
    /// Role found; the hierarchy may still forbid managing it
    Found(GuildSnapshot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange {
    pub user_id: UserId,
    pub action: RoleAction,
}

/// Discord sends snowflakes as JSON strings
pub(crate) fn snowflake<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// Look up a role by exact (case-sensitive) name
pub fn find_role<'a>(roles: &'a [GuildRole], name: &str) -> Option<&'a GuildRole> {
    roles.iter().find(|r| r.name == name)
}

/// A bot can only assign roles strictly below its own highest role
pub fn can_manage_role(bot_top_position: i64, role_position: i64) -> bool {
    bot_top_position > role_position
}

/// Highest position among `role_ids`, 0 (the @everyone position) if none match
pub fn top_position(roles: &[GuildRole], role_ids: &[u64]) -> i64 {
    roles
        .iter()
        .filter(|r| role_ids.contains(&r.id))
        .map(|r| r.position)
        .max()
        .unwrap_or(0)
}

/// Changes needed so exactly the `active` members hold `role_id`.
///
/// Every member is considered, bots included. Members already in the right
/// state produce nothing.
pub fn plan_role_changes(members: &[Member], role_id: u64, active: &HashSet<UserId>) -> Vec<RoleChange> {
    members
        .iter()
        .filter_map(|m| {
            let should_have = active.contains(&m.user_id);
            match (should_have, m.has_role(role_id)) {
                (true, false) => Some(RoleChange {
                    user_id: m.user_id,
                    action: RoleAction::Add,
                }),
                (false, true) => Some(RoleChange {
                    user_id: m.user_id,
                    action: RoleAction::Remove,
                }),
                _ => None,
            }
        })
        .collect()
}
