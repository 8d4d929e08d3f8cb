use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use shiftrole::cli::{self, Command};
use shiftrole::commands::{help_text, Commands};
use shiftrole::config::Config;
use shiftrole::health::{self, TickMetrics};
use shiftrole::orchestrator::run_tick;
use shiftrole::redact;
use shiftrole::roles::DiscordRoles;
use shiftrole::schedule::active_users;
use shiftrole::scheduler::run_scheduler;
use shiftrole::store::{FileStore, ScheduleStore};

#[tokio::main]
async fn main() -> Result<()> {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n", e);
            cli::print_help();
            std::process::exit(2);
        }
    };

    if args.help {
        cli::print_help();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shiftrole=info".parse().context("Invalid log directive")?),
        )
        .init();

    info!("shiftrole v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Bot token: {}", redact::token(&config.discord_token));
    info!("  Guild: {}", config.guild_id);
    info!("  Role: \"{}\"", config.role_name);
    info!("  Default timezone: {}", config.default_timezone.name());

    // Handle --validate mode
    if args.validate {
        info!("Validating configuration...");
        match config.validate() {
            Ok(()) => {
                info!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }

    let store = FileStore::open(&config.database_path)
        .with_context(|| format!("Failed to open schedule store at {}", config.database_path))?;
    if let Some(path) = store.path() {
        info!("Schedule store: {} ({} schedules)", path.display(), store.get_all()?.len());
    }
    let roles = DiscordRoles::new(&config);

    if let Some(command) = args.command {
        let reply = run_command(command, &config, &store, &roles).await?;
        println!("{}", reply);
        return Ok(());
    }

    config.validate()?;

    let metrics = Arc::new(TickMetrics::new());

    // Run a single tick (for testing) or start scheduler
    if args.once {
        info!("Running single tick (--once mode)");
        if run_tick(&store, &roles, &metrics, Utc::now()).await.is_none() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let cancel_token = CancellationToken::new();

    // Start health check server if configured
    if let Some(port) = config.health_port {
        let metrics = metrics.clone();
        let cancel = cancel_token.clone();
        tokio::spawn(async move {
            health::run_health_server(port, metrics, cancel).await;
        });
    }

    {
        let cancel = cancel_token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown requested"),
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
            cancel.cancel();
        });
    }

    let (store, roles, tick_metrics) = (&store, &roles, &*metrics);
    run_scheduler(
        Duration::from_secs(config.tick_interval_secs),
        cancel_token.clone(),
        move || async move {
            run_tick(store, roles, tick_metrics, Utc::now()).await;
        },
    )
    .await;

    cancel_token.cancel();

    Ok(())
}

/// Run one user command against the store and return its reply
async fn run_command(command: Command, config: &Config, store: &FileStore, roles: &DiscordRoles) -> Result<String> {
    let commands = Commands::new(store, config.default_timezone);
    let now = Utc::now();

    match command {
        Command::SetWork { user, start, end, days } => commands.set_work(user, &start, &end, days.as_deref()),
        Command::SetDays { user, days } => commands.set_days(user, &days),
        Command::MySchedule { user } => commands.my_schedule(user, now),
        Command::Sick { user, hours } => commands.sick(user, hours, now),
        Command::Back { user } => commands.back(user),
        Command::Time => Ok(commands.time(now)),
        Command::Help => Ok(help_text()),
        Command::RoleStatus { user } => {
            let check = roles.inspect().await;
            if let Err(e) = &check {
                warn!("Guild details unavailable: {:#}", e);
            }
            commands.role_status(user, now, roles.role_name(), check.as_ref())
        }
        Command::Active => {
            let active = active_users(&store.get_all()?, now);
            if active.is_empty() {
                Ok("Nobody should hold the role right now.".to_string())
            } else {
                let ids: Vec<String> = active.iter().map(|id| id.to_string()).collect();
                Ok(format!("{} user(s) on shift: {}", active.len(), ids.join(", ")))
            }
        }
    }
}
