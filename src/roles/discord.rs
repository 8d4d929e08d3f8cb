use anyhow::{bail, Context, Result};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::plan::{
    self, find_role, plan_role_changes, GuildCheck, GuildRole, GuildSnapshot, Member, RoleAction,
};
use super::{RoleSync, SyncReport};
use crate::config::Config;
use crate::schedule::UserId;

pub const MAX_RETRIES: u32 = 3;
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff duration (60 seconds)
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Discord caps member listing pages at 1000
const MEMBER_PAGE_LIMIT: usize = 1000;

const AUDIT_REASON: &str = "Shift schedule";

/// Non-success HTTP status from the Discord API
#[derive(Debug, Error)]
#[error("Discord API {method} {path} returned {status}: {body}")]
pub struct ApiStatusError {
    pub method: Method,
    pub path: String,
    pub status: StatusCode,
    pub body: String,
    /// Seconds Discord asked us to wait (429 only)
    pub retry_after: Option<f64>,
}

/// Whether a failed request is worth retrying
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorKind {
    /// Transient error - safe to retry
    Transient,
    /// Permanent error - don't retry
    Permanent,
}

/// 429 and 5xx are transient; any other client error will not fix itself
pub fn classify_status(status: StatusCode) -> ErrorKind {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ErrorKind::Transient
    } else {
        ErrorKind::Permanent
    }
}

/// Discord answers 404 for an unknown guild and 403 when the bot is not in it
fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ApiStatusError>()
        .is_some_and(|api| api.status == StatusCode::NOT_FOUND || api.status == StatusCode::FORBIDDEN)
}

/// Calculate backoff duration for a given attempt (0-indexed)
/// Attempt 0: no backoff, Attempt 1: 1s, Attempt 2: 2s, etc.
/// Capped at MAX_BACKOFF_MS to prevent overflow and excessive waits.
#[inline]
pub fn calculate_backoff(attempt: u32) -> Duration {
    if attempt == 0 {
        Duration::ZERO
    } else {
        let shift = (attempt - 1).min(30);
        let backoff_ms = INITIAL_BACKOFF_MS.saturating_mul(1u64 << shift);
        Duration::from_millis(backoff_ms.min(MAX_BACKOFF_MS))
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    #[serde(deserialize_with = "plan::snowflake")]
    id: u64,
    #[serde(default)]
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct ApiGuild {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiMember {
    user: ApiUser,
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

impl From<ApiMember> for Member {
    fn from(m: ApiMember) -> Self {
        let display_name = m
            .nick
            .or(m.user.global_name)
            .unwrap_or(m.user.username);
        Member {
            user_id: UserId(m.user.id),
            display_name,
            role_ids: m.roles.iter().filter_map(|r| r.parse().ok()).collect(),
            bot: m.user.bot,
        }
    }
}

/// Role-mutation client for one guild role over the Discord REST API
pub struct DiscordRoles {
    client: reqwest::Client,
    api_base: String,
    token: String,
    guild_id: u64,
    role_name: String,
}

impl DiscordRoles {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.discord_api_base.trim_end_matches('/').to_string(),
            token: config.discord_token.clone(),
            guild_id: config.guild_id,
            role_name: config.role_name.clone(),
        }
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    /// Fetch the role, the bot's rank and all members, checking the bot may
    /// manage the role. Any problem here aborts the whole pass.
    pub async fn snapshot(&self) -> Result<GuildSnapshot> {
        match self.inspect().await? {
            GuildCheck::GuildNotFound { guild_id } => bail!(
                "Guild {} not found. Is the bot in that server? Is GUILD_ID correct?",
                guild_id
            ),
            GuildCheck::RoleMissing { .. } => bail!(
                "Role '{}' not found on the server. Create a role with that exact name (case-sensitive).",
                self.role_name
            ),
            GuildCheck::Found(guild) if !guild.can_manage() => bail!(
                "Cannot assign '{}': it must be below the bot's role in Server Settings → Roles (drag it down).",
                self.role_name
            ),
            GuildCheck::Found(guild) => Ok(guild),
        }
    }

    /// Run the guild pre-checks and report what they found.
    ///
    /// A missing guild or role is an outcome, not an error; `Err` means the
    /// API could not be asked at all.
    pub async fn inspect(&self) -> Result<GuildCheck> {
        let me: ApiUser = self
            .get_json("/users/@me")
            .await
            .context("Failed to identify bot user (is DISCORD_TOKEN valid?)")?;

        let guild: ApiGuild = match self.get_json(&format!("/guilds/{}", self.guild_id)).await {
            Ok(guild) => guild,
            Err(e) if is_not_found(&e) => {
                warn!("Guild {} not found: {}", self.guild_id, e);
                return Ok(GuildCheck::GuildNotFound { guild_id: self.guild_id });
            }
            Err(e) => return Err(e.context(format!("Failed to fetch guild {}", self.guild_id))),
        };

        let roles: Vec<GuildRole> = self
            .get_json(&format!("/guilds/{}/roles", self.guild_id))
            .await
            .with_context(|| format!("Failed to fetch roles of guild {}", self.guild_id))?;

        let role = match find_role(&roles, &self.role_name) {
            Some(role) => role.clone(),
            None => return Ok(GuildCheck::RoleMissing { guild_name: guild.name }),
        };

        let bot_member: ApiMember = self
            .get_json(&format!("/guilds/{}/members/{}", self.guild_id, me.id))
            .await
            .context("Failed to fetch bot's guild membership")?;
        let bot_role_ids: Vec<u64> = bot_member.roles.iter().filter_map(|r| r.parse().ok()).collect();
        let bot_top_position = plan::top_position(&roles, &bot_role_ids);

        let members = self.list_members().await?;
        debug!("Fetched {} guild members", members.len());

        Ok(GuildCheck::Found(GuildSnapshot {
            guild_name: guild.name,
            role,
            bot_top_position,
            members,
        }))
    }

    async fn list_members(&self) -> Result<Vec<Member>> {
        let mut members = Vec::new();
        let mut after = 0u64;

        loop {
            let path = format!(
                "/guilds/{}/members?limit={}&after={}",
                self.guild_id, MEMBER_PAGE_LIMIT, after
            );
            let page: Vec<ApiMember> = self
                .get_json(&path)
                .await
                .context("Failed to list guild members (is the Server Members intent enabled?)")?;

            let count = page.len();
            if let Some(last) = page.iter().map(|m| m.user.id).max() {
                after = last;
            }
            members.extend(page.into_iter().map(Member::from));

            if count < MEMBER_PAGE_LIMIT {
                break;
            }
        }

        Ok(members)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request_with_retry(Method::GET, path).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse Discord response for {}", path))
    }

    async fn set_member_role(&self, user_id: UserId, role_id: u64, action: RoleAction) -> Result<()> {
        let method = match action {
            RoleAction::Add => Method::PUT,
            RoleAction::Remove => Method::DELETE,
        };
        let path = format!("/guilds/{}/members/{}/roles/{}", self.guild_id, user_id, role_id);
        self.request_with_retry(method, &path).await?;
        Ok(())
    }

    async fn request_with_retry(&self, method: Method, path: &str) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let backoff = match last_error
                    .as_ref()
                    .and_then(|e: &anyhow::Error| e.downcast_ref::<ApiStatusError>())
                    .and_then(|e| e.retry_after)
                {
                    Some(secs) => Duration::from_secs_f64(secs.clamp(0.0, MAX_BACKOFF_MS as f64 / 1000.0)),
                    None => calculate_backoff(attempt),
                };
                warn!("Discord {} {} attempt {} failed, retrying in {:?}...", method, path, attempt, backoff);
                sleep(backoff).await;
            }

            match self.try_request(method.clone(), path).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if Self::classify_error(&e) == ErrorKind::Permanent {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        let err = last_error.unwrap_or_else(|| anyhow::anyhow!("Discord request {} {} not attempted", method, path));
        error!("Discord {} {} failed after {} attempts: {}", method, path, MAX_RETRIES, err);
        Err(err)
    }

    fn classify_error(err: &anyhow::Error) -> ErrorKind {
        match err.downcast_ref::<ApiStatusError>() {
            Some(api) => classify_status(api.status),
            // Network and timeout errors
            None => ErrorKind::Transient,
        }
    }

    async fn try_request(&self, method: Method, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .client
            .request(method.clone(), &url)
            .header("Authorization", format!("Bot {}", self.token))
            .header("X-Audit-Log-Reason", urlencoding::encode(AUDIT_REASON).into_owned())
            .send()
            .await
            .with_context(|| format!("Failed to send Discord request {} {}", method, path))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
            serde_json::from_str::<RateLimitBody>(&body).ok().map(|b| b.retry_after)
        } else {
            None
        };

        Err(ApiStatusError {
            method,
            path: path.to_string(),
            status,
            body,
            retry_after,
        }
        .into())
    }
}

impl RoleSync for DiscordRoles {
    async fn sync_roles(&self, active: &HashSet<UserId>) -> Result<SyncReport> {
        let guild = self.snapshot().await?;
        let changes = plan_role_changes(&guild.members, guild.role.id, active);

        let mut report = SyncReport {
            unchanged: guild.members.len().saturating_sub(changes.len()),
            ..SyncReport::default()
        };

        for change in changes {
            match self.set_member_role(change.user_id, guild.role.id, change.action).await {
                Ok(()) => {
                    match change.action {
                        RoleAction::Add => report.added += 1,
                        RoleAction::Remove => report.removed += 1,
                    }
                    info!("{:?} '{}' for user {}", change.action, self.role_name, change.user_id);
                }
                Err(e) => {
                    let forbidden = e
                        .downcast_ref::<ApiStatusError>()
                        .is_some_and(|api| api.status == StatusCode::FORBIDDEN);
                    if forbidden {
                        warn!(
                            "Missing permission to manage roles for user {}. Bot needs 'Manage Roles' and the role must be below the bot's role.",
                            change.user_id
                        );
                    } else {
                        warn!("Failed to {:?} role for user {}: {}", change.action, change.user_id, e);
                    }
                    report.failed.push(change.user_id);
                }
            }
        }

        Ok(report)
    }
}
