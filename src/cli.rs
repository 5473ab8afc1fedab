//! CLI definitions for xpand.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// xpand - Expand an X data archive into full tweet JSON
#[derive(Parser, Debug)]
#[command(name = "xpand")]
#[command(version)]
#[command(about = "Re-fetch full tweet content for an X data archive")]
#[command(long_about = r#"
xpand re-fetches every tweet in an extracted X/Twitter data archive through
the API and stores the full JSON under <archive>/expanded/. Runs are
incremental: tweets already on disk are never fetched again, and an
interrupted run picks up where it stopped.

Credentials are kept next to the archive:
  consumer.json   application key and secret
  access.json     your account's access token and secret
  user.json       cached profile of the authorized account

Missing credential files are prompted for on first run.

Quick start:
  1. Extract your archive and cd into it
  2. Run: xpand status
  3. Run: xpand expand
"#)]
pub struct Cli {
    /// Extracted archive directory (defaults to the current directory)
    #[arg(long, short = 'C', env = "XPAND_DIR", global = true)]
    pub dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// More log output (repeat for more detail)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every archive tweet that is not cached yet
    Expand(ExpandArgs),

    /// Show how much of the archive is expanded (no network)
    Status(StatusArgs),

    /// Fetch a single tweet into the cache
    Fetch(FetchArgs),

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Default)]
pub struct ExpandArgs {
    /// Overwrite cached tweets that are fetched again
    #[arg(long, short = 'F')]
    pub force: bool,

    /// Stop after this many tweets
    #[arg(long, short = 'n')]
    pub max: Option<usize>,

    /// Tweets per lookup request (1-100)
    #[arg(long, short = 'b', value_parser = clap::value_parser!(u16).range(1..=100))]
    pub batch_size: Option<u16>,

    /// Seconds to wait after hitting the rate limit
    #[arg(long)]
    pub cooldown: Option<u64>,
}

#[derive(Args, Debug, Default)]
pub struct StatusArgs {
    /// Also list the archive's data files
    #[arg(long)]
    pub files: bool,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Tweet id
    pub id: u64,

    /// Replace the cached copy if there is one
    #[arg(long, short = 'F')]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Write a default config file if none exists
    #[arg(long)]
    pub init: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
