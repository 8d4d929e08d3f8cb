//! Role reconciliation against the guild
//!
//! Planning is pure (see [`plan`]); [`DiscordRoles`] applies the plan over
//! the Discord REST API.

mod discord;
pub mod plan;

pub use discord::{calculate_backoff, classify_status, DiscordRoles, ErrorKind, MAX_RETRIES};
pub use plan::{
    can_manage_role, find_role, plan_role_changes, GuildCheck, GuildRole, GuildSnapshot, Member, RoleAction, RoleChange,
};

use anyhow::Result;
use std::collections::HashSet;
use std::future::Future;

use crate::schedule::UserId;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Members whose change was rejected (e.g. missing permission)
    pub failed: Vec<UserId>,
}

impl SyncReport {
    pub fn changes(&self) -> usize {
        self.added + self.removed
    }
}

/// Something that can make guild membership of the role match `active`.
///
/// Implementations must add the role to every active member and remove it
/// from everyone else, and must keep going when a single member fails.
pub trait RoleSync: Send + Sync {
    fn sync_roles(&self, active: &HashSet<UserId>) -> impl Future<Output = Result<SyncReport>> + Send;
}
