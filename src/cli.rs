//! Command-line argument parsing for shiftrole

use anyhow::{bail, Context, Result};

use crate::schedule::UserId;

/// A user command run from the terminal instead of chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetWork {
        user: UserId,
        start: String,
        end: String,
        days: Option<String>,
    },
    SetDays {
        user: UserId,
        days: String,
    },
    MySchedule {
        user: UserId,
    },
    Sick {
        user: UserId,
        hours: i64,
    },
    Back {
        user: UserId,
    },
    RoleStatus {
        user: UserId,
    },
    Time,
    Active,
    Help,
}

/// Parsed command line arguments
#[derive(Debug, Default)]
pub struct Args {
    pub once: bool,
    pub validate: bool,
    pub help: bool,
    pub command: Option<Command>,
}

pub fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from(&args)
}

/// Parse a full argv (program name first)
pub fn parse_args_from(args: &[String]) -> Result<Args> {
    let mut result = Args::default();
    let mut positional: Vec<&str> = Vec::new();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--once" => result.once = true,
            "--validate" => result.validate = true,
            "--help" | "-h" => result.help = true,
            other if other.starts_with("--") => bail!("Unknown option: {}", other),
            other => positional.push(other),
        }
    }

    if !positional.is_empty() {
        result.command = Some(parse_command(&positional)?);
    }

    Ok(result)
}

fn parse_command(words: &[&str]) -> Result<Command> {
    let (name, rest) = match words.split_first() {
        Some(split) => split,
        None => bail!("No command given"),
    };

    let command = match (*name, rest) {
        ("setwork", [user, start, end]) => Command::SetWork {
            user: parse_user(user)?,
            start: start.to_string(),
            end: end.to_string(),
            days: None,
        },
        ("setwork", [user, start, end, days]) => Command::SetWork {
            user: parse_user(user)?,
            start: start.to_string(),
            end: end.to_string(),
            days: Some(days.to_string()),
        },
        ("setdays", [user, days]) => Command::SetDays {
            user: parse_user(user)?,
            days: days.to_string(),
        },
        ("myschedule", [user]) => Command::MySchedule { user: parse_user(user)? },
        ("sick", [user, hours]) => Command::Sick {
            user: parse_user(user)?,
            hours: hours
                .parse()
                .with_context(|| format!("Hours must be a whole number, got '{}'", hours))?,
        },
        ("back", [user]) => Command::Back { user: parse_user(user)? },
        ("rolestatus", [user]) => Command::RoleStatus { user: parse_user(user)? },
        ("time", []) => Command::Time,
        ("active", []) => Command::Active,
        ("help", []) => Command::Help,
        (
            "setwork" | "setdays" | "myschedule" | "sick" | "back" | "rolestatus" | "time" | "active" | "help",
            _,
        ) => bail!("Wrong number of arguments for '{}'. See --help.", name),
        _ => bail!("Unknown command: {}", name),
    };

    Ok(command)
}

fn parse_user(s: &str) -> Result<UserId> {
    s.parse()
        .with_context(|| format!("User ID must be a numeric Discord ID, got '{}'", s))
}

pub fn print_help() {
    println!("shiftrole - work-schedule role bot\n");
    println!("USAGE:");
    println!("    shiftrole [OPTIONS]");
    println!("    shiftrole <COMMAND> [ARGS]\n");
    println!("OPTIONS:");
    println!("    --once              Run a single reconciliation tick and exit");
    println!("    --validate          Validate configuration and exit");
    println!("    --help, -h          Show this help message\n");
    println!("COMMANDS:");
    println!("    setwork <user> <start> <end> [days]");
    println!("    setdays <user> <days>");
    println!("    myschedule <user>");
    println!("    sick <user> <hours>");
    println!("    back <user>");
    println!("    rolestatus <user>");
    println!("    time");
    println!("    active              List users who should hold the role right now");
    println!("    help                Show command usage\n");
    println!("ENVIRONMENT:");
    println!("    See .env.example for required configuration variables");
}
