use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
#[cfg(test)]
use std::collections::HashMap;
use std::env;

/// Token values people leave in .env by mistake
const PLACEHOLDER_TOKENS: [&str; 3] = ["", "YOUR_BOT_TOKEN", "YOUR_TOKEN"];

#[derive(Debug, Clone)]
pub struct Config {
    // Discord bot credentials and target guild
    pub discord_token: String,
    pub guild_id: u64,

    // Role handed to whoever is on shift (exact, case-sensitive name)
    pub role_name: String,

    // Where schedules are persisted
    pub database_path: String,

    // Zone new schedules are created in and status times are shown in
    pub default_timezone: Tz,

    // Seconds between reconciliation ticks
    pub tick_interval_secs: u64,

    // REST API root, overridable for testing against a mock
    pub discord_api_base: String,

    // Health check HTTP server port (optional, disabled if not set)
    // When set, exposes /health, /ready, and /metrics endpoints
    pub health_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env if present, ignore if missing
        Self::from_getter(|key| env::var(key).ok())
    }

    /// Parse config from a custom getter function (for testing)
    pub fn from_getter<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timezone_name = get("DEFAULT_TIMEZONE").unwrap_or_else(|| "Australia/Sydney".to_string());

        Ok(Config {
            discord_token: get("DISCORD_TOKEN").context("DISCORD_TOKEN not set")?,
            guild_id: get("GUILD_ID")
                .context("GUILD_ID not set")?
                .trim()
                .parse()
                .context("GUILD_ID must be a numeric server ID")?,

            role_name: get("ROLE_NAME").unwrap_or_else(|| "At Work".to_string()),

            database_path: get("DATABASE_PATH")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "schedules.json".to_string()),

            default_timezone: timezone_name
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("DEFAULT_TIMEZONE '{}' is not a known IANA zone", timezone_name))?,

            tick_interval_secs: get("TICK_INTERVAL_SECS")
                .unwrap_or_else(|| "60".to_string())
                .parse()
                .unwrap_or(60),

            discord_api_base: get("DISCORD_API_BASE")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://discord.com/api/v10".to_string()),

            health_port: get("HEALTH_PORT").and_then(|s| s.parse().ok()),
        })
    }

    /// Create config from a HashMap (convenience for testing)
    #[cfg(test)]
    pub fn from_map(map: &HashMap<&str, &str>) -> Result<Self> {
        Self::from_getter(|key| map.get(key).map(|v| v.to_string()))
    }

    /// Validate configuration values at startup.
    /// Returns Ok(()) if all validations pass, or Err with details of what failed.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if Self::is_placeholder_token(&self.discord_token) {
            errors.push(
                "DISCORD_TOKEN is empty or a placeholder. Copy the bot token from the Discord developer portal (Bot → Reset/Copy token).".to_string(),
            );
        }

        if self.guild_id == 0 {
            errors.push("GUILD_ID must not be 0.".to_string());
        }

        if self.role_name.trim().is_empty() {
            errors.push("ROLE_NAME cannot be empty.".to_string());
        }

        if self.tick_interval_secs == 0 {
            errors.push("TICK_INTERVAL_SECS must be greater than 0.".to_string());
        } else if self.tick_interval_secs > 3600 {
            errors.push(format!(
                "TICK_INTERVAL_SECS={} seems too long (max recommended: 3600).",
                self.tick_interval_secs
            ));
        }

        if !self.discord_api_base.starts_with("http://") && !self.discord_api_base.starts_with("https://") {
            errors.push(format!(
                "DISCORD_API_BASE '{}' must be an http(s) URL.",
                self.discord_api_base
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )
        }
    }

    fn is_placeholder_token(token: &str) -> bool {
        PLACEHOLDER_TOKENS.contains(&token.trim())
    }
}
