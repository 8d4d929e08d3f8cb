//! User commands and their reply text
//!
//! Each command validates its input, touches the store and returns the text
//! to show the user. Bad input becomes a reply, not an error; only store
//! failures and corrupt stored data come back as `Err`.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, TimeDelta, Utc};
use chrono_tz::Tz;

use crate::roles::GuildCheck;
use crate::schedule::{
    active_users, format_days_display, next_transition, parse_days_input, parse_time_of_day, Schedule,
    UserId, DAY_NAMES,
};
use crate::status::describe_next_change;
use crate::store::ScheduleStore;

/// Days used by `setwork` when none are given
pub const DEFAULT_DAYS: &str = "mon,tue,wed,thu,fri";

/// Longest sick period accepted, one year
pub const MAX_SICK_HOURS: i64 = 24 * 365;

/// How many should-be-active users `rolestatus` lists by name
const ROLE_STATUS_LIST_LIMIT: usize = 10;

const NO_SCHEDULE: &str = "Set your schedule first with `/setwork start end days`.";

/// Command handlers bound to a store and the zone new schedules use
pub struct Commands<'a, S: ScheduleStore + ?Sized> {
    store: &'a S,
    timezone: Tz,
}

impl<'a, S: ScheduleStore + ?Sized> Commands<'a, S> {
    pub fn new(store: &'a S, timezone: Tz) -> Self {
        Self { store, timezone }
    }

    /// `/setwork start end [days]`
    pub fn set_work(&self, user: UserId, start: &str, end: &str, days: Option<&str>) -> Result<String> {
        let start_time = match parse_time_of_day(start) {
            Ok(t) => t,
            Err(e) => return Ok(e.to_string()),
        };
        let end_time = match parse_time_of_day(end) {
            Ok(t) => t,
            Err(e) => return Ok(e.to_string()),
        };
        let days = match parse_days_input(days.unwrap_or(DEFAULT_DAYS)) {
            Ok(d) => d,
            Err(e) => return Ok(e.to_string()),
        };

        self.store
            .upsert(user, self.timezone.name(), start_time, end_time, days)
            .context("Failed to save schedule")?;

        Ok(format!(
            "Schedule saved: {}–{} on {}.",
            start_time.format("%H:%M"),
            end_time.format("%H:%M"),
            days
        ))
    }

    /// `/setdays days`, keeps start and end times
    pub fn set_days(&self, user: UserId, days: &str) -> Result<String> {
        if self.store.get(user)?.is_none() {
            return Ok(NO_SCHEDULE.to_string());
        }
        let days = match parse_days_input(days) {
            Ok(d) => d,
            Err(e) => return Ok(e.to_string()),
        };
        self.store.set_days(user, days).context("Failed to update days")?;
        Ok(format!("Work days updated to: {}.", days))
    }

    /// `/myschedule`
    pub fn my_schedule(&self, user: UserId, now: DateTime<Utc>) -> Result<String> {
        let Some(record) = self.store.get(user)? else {
            return Ok("No schedule set.".to_string());
        };
        let schedule = Schedule::try_from(&record)?;

        let status = match record.sick_until {
            Some(until) if until > now => format!(
                "Sick until {}",
                until.with_timezone(&schedule.timezone).format("%Y-%m-%d %H:%M")
            ),
            _ => "Active".to_string(),
        };

        let mut lines = vec![
            format!("Times are {}.", schedule.timezone.name()),
            format!("Start: {}", record.start_time),
            format!("End: {}", record.end_time),
            format!("Days: {}", format_days_display(&record.days)),
            format!("Status: {}", status),
        ];

        let transition = next_transition(&schedule, now);
        if let Some(line) = describe_next_change(&schedule, &transition, now, schedule.timezone) {
            lines.push(line);
        }

        Ok(lines.join("\n"))
    }

    /// `/sick hours`
    pub fn sick(&self, user: UserId, hours: i64, now: DateTime<Utc>) -> Result<String> {
        if !(1..=MAX_SICK_HOURS).contains(&hours) {
            return Ok(format!("Hours must be between 1 and {}.", MAX_SICK_HOURS));
        }
        let until = now + TimeDelta::hours(hours);
        if !self.store.set_sick(user, Some(until)).context("Failed to set sick status")? {
            return Ok(NO_SCHEDULE.to_string());
        }
        Ok(format!("Sick for {} hours", hours))
    }

    /// `/back`
    pub fn back(&self, user: UserId) -> Result<String> {
        if !self.store.set_sick(user, None).context("Failed to clear sick status")? {
            return Ok(NO_SCHEDULE.to_string());
        }
        Ok("You are back from sick".to_string())
    }

    /// `/time`: current time in UTC and in the configured zone
    pub fn time(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.timezone);
        format!(
            "**UTC:** {} ({})\n**{}:** {} ({})",
            now.format("%Y-%m-%d %H:%M:%S"),
            DAY_NAMES[now.weekday().num_days_from_monday() as usize],
            self.timezone.name(),
            local.format("%Y-%m-%d %H:%M:%S"),
            DAY_NAMES[local.weekday().num_days_from_monday() as usize],
        )
    }

    /// `/rolestatus`: why the role is or is not attached.
    ///
    /// `guild` is the outcome of the guild pre-checks. A missing guild or role
    /// ends the reply early; an unreadable guild is reported and the
    /// schedule part still follows.
    pub fn role_status(
        &self,
        user: UserId,
        now: DateTime<Utc>,
        role_name: &str,
        guild: Result<&GuildCheck, &anyhow::Error>,
    ) -> Result<String> {
        let local = now.with_timezone(&self.timezone);
        let mut lines = vec![
            format!(
                "**Time (UTC):** {} · **{}:** {} · **Day:** {}",
                now.format("%H:%M:%S"),
                self.timezone.name(),
                local.format("%H:%M:%S"),
                DAY_NAMES[local.weekday().num_days_from_monday() as usize],
            ),
            String::new(),
        ];

        let guild = match guild {
            Ok(GuildCheck::GuildNotFound { guild_id }) => {
                lines.push(format!(
                    "Guild `{}` not found. Check GUILD_ID and that the bot is in the server.",
                    guild_id
                ));
                return Ok(lines.join("\n"));
            }
            Ok(GuildCheck::RoleMissing { guild_name }) => {
                lines.push(format!("Guild: **{}**", guild_name));
                lines.push(format!(
                    "Role **{}** not found. Create a role with that exact name (case-sensitive).",
                    role_name
                ));
                return Ok(lines.join("\n"));
            }
            Ok(GuildCheck::Found(guild)) => {
                lines.push(format!("Guild: **{}**", guild.guild_name));
                lines.push(format!("Role: **{}** (position {})", role_name, guild.role.position));
                lines.push(format!("   Bot's highest role position: **{}**", guild.bot_top_position));
                if guild.can_manage() {
                    lines.push("   Hierarchy OK (bot can assign this role).".to_string());
                } else {
                    lines.push(format!(
                        "   **{}** must be *below* the bot's role. Drag it down in Server Settings -> Roles.",
                        role_name
                    ));
                }
                Some(guild)
            }
            Err(e) => {
                lines.push(format!("Could not read the guild: {:#}", e));
                None
            }
        };

        let active = active_users(&self.store.get_all()?, now);
        lines.push(String::new());
        lines.push(format!("**Should have role right now:** {} user(s)", active.len()));
        for id in active.iter().take(ROLE_STATUS_LIST_LIMIT) {
            let line = match guild.and_then(|g| g.member(*id).map(|m| (g, m))) {
                Some((g, m)) => format!(
                    "   - {} (ID {}) — {}",
                    m.display_name,
                    id,
                    if m.has_role(g.role.id) { "has role" } else { "missing role" }
                ),
                None => format!("   - {}", id),
            };
            lines.push(line);
        }
        if active.len() > ROLE_STATUS_LIST_LIMIT {
            lines.push(format!("   ... and {} more", active.len() - ROLE_STATUS_LIST_LIMIT));
        }

        lines.push(String::new());
        let on_work = active.contains(&user);
        lines.push(format!("You: **{}**", if on_work { "On work" } else { "Not on work" }));
        lines.push(String::new());

        let Some(record) = self.store.get(user)? else {
            lines.push("No schedule set. Use `/setwork` to set your work times.".to_string());
            return Ok(lines.join("\n"));
        };

        let schedule = match Schedule::try_from(&record) {
            Ok(s) => s,
            Err(e) => {
                lines.push(format!("Your schedule could not be read: {}", e));
                return Ok(lines.join("\n"));
            }
        };

        lines.push(format!("**Your schedule ({}):**", schedule.timezone.name()));
        lines.push(format!(
            "   {} – {} on {}",
            record.start_time,
            record.end_time,
            format_days_display(&record.days)
        ));

        let transition = next_transition(&schedule, now);
        match describe_next_change(&schedule, &transition, now, self.timezone) {
            Some(line) => lines.push(format!("   {}", line)),
            None => {
                if let Some(until) = record.sick_until {
                    lines.push(format!(
                        "   Sick until {} {}.",
                        until.with_timezone(&self.timezone).format("%Y-%m-%d %H:%M"),
                        self.timezone.name()
                    ));
                }
            }
        }

        Ok(lines.join("\n"))
    }
}

/// Command list with usage examples
pub fn help_text() -> String {
    [
        "Schedule bot – commands",
        "",
        "setwork <start> <end> [days]",
        "    Set your work schedule.",
        "    Example: setwork 09:00 17:00 mon,tue,wed,thu,fri  or 0,1,2,3,4 (0=Mon, 6=Sun)",
        "setdays <days>",
        "    Change which days you work (keeps start/end times).",
        "    Example: setdays mon,wed,fri",
        "myschedule",
        "    View your current schedule and status.",
        "sick <hours>",
        "    Mark yourself sick for a number of hours. Example: sick 24",
        "back",
        "    Clear your sick status and return from sick.",
        "time",
        "    Show the current time (UTC and local).",
        "rolestatus",
        "    See why the role might not be attached.",
    ]
    .join("\n")
}
