//! Command-line flags and REPL command parsing.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::Parser;

use crate::config::RoundtableConfig;

/// Personal advisory board: ask a question, watch the Visionary and the
/// Skeptic argue it out, and let the Chair rule.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Session to join (overrides ROUNDTABLE_SESSION)
    #[arg(long, conflicts_with = "new_session")]
    pub session: Option<String>,

    /// Start a fresh session with a generated id
    #[arg(long, default_value_t = false)]
    pub new_session: bool,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Round budget per question (overrides MAX_DEBATE_ROUNDS)
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Session record directory (overrides ROUNDTABLE_STORE_DIR)
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Workspace JSON file (overrides ROUNDTABLE_WORKSPACE)
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Remove a stale session lock left by a crashed process
    #[arg(long, default_value_t = false)]
    pub break_lock: bool,

    /// Probe the provider endpoint and exit
    #[arg(long, default_value_t = false)]
    pub check: bool,
}

impl Cli {
    /// Apply flag overrides on top of file and environment values.
    pub fn apply(&self, config: &mut RoundtableConfig) {
        if let Some(rounds) = self.max_rounds {
            config.debate.max_rounds = rounds;
        }
        if let Some(dir) = &self.store_dir {
            config.store_dir = dir.clone();
        }
        if let Some(path) = &self.workspace {
            config.workspace = Some(path.clone());
        }
        if self.new_session {
            config.session = generate_session_id();
        } else if let Some(session) = &self.session {
            config.session = session.clone();
        }
    }
}

/// `debate_` plus the first 8 hex digits of a random UUID.
pub fn generate_session_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("debate_{}", &id[..8])
}

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Exit,
    History(Option<usize>),
    Resume,
    Schedule {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        summary: String,
    },
    Help,
}

pub const HELP: &str = "\
Type a question to put it to the board.
  /history [n]                      show the last n turns (all if omitted)
  /resume                           continue an interrupted debate
  /schedule <start> <end> <summary> add a calendar event (YYYY-MM-DDTHH:MM, UTC)
  /help                             this message
  exit | quit | bye                 leave";

pub fn parse_line(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() || matches!(line.to_lowercase().as_str(), "exit" | "quit" | "bye") {
        return Ok(Command::Exit);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Ask(line.to_string()));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    match name {
        "history" if args.is_empty() => Ok(Command::History(None)),
        "history" => args
            .parse()
            .map(|n| Command::History(Some(n)))
            .map_err(|_| format!("/history expects a number, got {args:?}")),
        "resume" => Ok(Command::Resume),
        "help" => Ok(Command::Help),
        "schedule" => parse_schedule(args),
        other => Err(format!("unknown command /{other}; try /help")),
    }
}

fn parse_schedule(args: &str) -> Result<Command, String> {
    let mut parts = args.splitn(3, char::is_whitespace);
    let (Some(start), Some(end), Some(summary)) = (parts.next(), parts.next(), parts.next()) else {
        return Err("usage: /schedule <start> <end> <summary>".to_string());
    };
    let start = parse_time(start)?;
    let end = parse_time(end)?;
    if end <= start {
        return Err("event must end after it starts".to_string());
    }
    Ok(Command::Schedule {
        start,
        end,
        summary: summary.trim().to_string(),
    })
}

/// RFC 3339, or `YYYY-MM-DDTHH:MM` taken as UTC.
fn parse_time(text: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M")
        .map(|t| t.and_utc())
        .map_err(|_| format!("cannot read {text:?} as a time; use YYYY-MM-DDTHH:MM"))
}
