//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ls_core::{DEFAULT_PREDICTION_THRESHOLD, UserId};

/// Last-seen presence tracker.
///
/// Polls an upstream "last seen" roster, reconstructs when each user was
/// online, and reports presence, forecasts and usage metrics.
#[derive(Debug, Parser)]
#[command(name = "lastseen", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Poll upstream until Ctrl-C (or `--cycles`), then print reports.
    Watch(WatchArgs),

    /// Fetch the roster once and print how many users are online.
    Fetch {
        /// Print each user's last-seen status instead of the online count.
        #[arg(long)]
        formatted: bool,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Arguments for `lastseen watch`.
#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this many refresh cycles instead of waiting for Ctrl-C.
    #[arg(long)]
    pub cycles: Option<u32>,

    /// Erase a user before polling starts; may be repeated.
    #[arg(long = "forget", value_name = "USER_ID")]
    pub forget: Vec<UserId>,

    /// Report window start (ISO 8601, `now`, or e.g. "2 hours ago").
    #[arg(long, default_value = "1 day ago")]
    pub from: String,

    /// Report window end (ISO 8601, `now`, or e.g. "2 hours ago").
    #[arg(long, default_value = "now")]
    pub to: String,

    /// Instant for presence and prediction queries (ISO 8601, `now`, or
    /// relative). Defaults to now when `--user` is given.
    #[arg(long)]
    pub at: Option<String>,

    /// Print presence, prediction and usage for a user; may be repeated.
    #[arg(long = "user", value_name = "USER_ID")]
    pub users: Vec<UserId>,

    /// Chance a user must exceed to be reported as likely online.
    #[arg(long, default_value_t = DEFAULT_PREDICTION_THRESHOLD)]
    pub tolerance: f64,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl WatchArgs {
    /// Whether any point-in-time query was requested.
    pub fn wants_query(&self) -> bool {
        self.at.is_some() || !self.users.is_empty()
    }
}
