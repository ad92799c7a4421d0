use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use declarative::RequestedState;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::parse_duration;

#[derive(Parser)]
#[command(name = "marathon-sync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge Marathon applications to a declared definition", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create, update or delete an app so it matches the definition
    Apply(ApplyArgs),

    /// Show what apply would change, without changing anything
    Diff(DiffArgs),

    /// Print the definition of a running app
    Get(GetArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared Arguments
// ============================================================================

/// Where the desired definition comes from
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Path to a JSON app definition
    #[arg(long, value_name = "FILE")]
    pub app_json: Option<String>,

    /// Inline JSON app definition
    #[arg(long, value_name = "JSON")]
    pub app: Option<String>,

    /// App id (only with --state absent)
    #[arg(long, value_name = "ID")]
    pub app_id: Option<String>,
}

/// Orchestrator connection options
#[derive(Debug, Default, Args)]
pub struct ClusterArgs {
    /// Marathon base URI, e.g. http://marathon.example.com:8080
    #[arg(long, env = "MARATHON_URI", value_name = "URL")]
    pub uri: Option<String>,

    /// Named cluster from config.toml
    #[arg(long, value_name = "NAME")]
    pub cluster: Option<String>,

    /// HTTP basic auth user
    #[arg(long, env = "MARATHON_USERNAME")]
    pub username: Option<String>,

    /// HTTP basic auth password
    #[arg(long, env = "MARATHON_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Authentication token (sent as `token=<value>`)
    #[arg(long, env = "MARATHON_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Timeout for each HTTP request (e.g. 30s)
    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StateArg {
    /// The app should exist and match the definition
    #[default]
    Present,
    /// The app should not exist
    Absent,
}

impl From<StateArg> for RequestedState {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::Present => Self::Present,
            StateArg::Absent => Self::Absent,
        }
    }
}

// ============================================================================
// Command Arguments
// ============================================================================

#[derive(Debug, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Requested state
    #[arg(long, value_enum, default_value_t = StateArg::Present)]
    pub state: StateArg,

    /// Override a deployment lock held by a running rollout
    #[arg(long)]
    pub force: bool,

    /// Give up waiting for the deployment after this long (default 180s)
    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub timeout: Option<Duration>,

    /// Delay between deployment polls (default 3s)
    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub poll_interval: Option<Duration>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub cluster: ClusterArgs,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DiffStyle {
    /// Whole documents with changed lines marked
    #[default]
    Full,
    /// Only changed lines with a little context
    Compact,
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Requested state
    #[arg(long, value_enum, default_value_t = StateArg::Present)]
    pub state: StateArg,

    /// Diff output style
    #[arg(long, value_enum, default_value_t = DiffStyle::Full)]
    pub style: DiffStyle,

    #[command(flatten)]
    pub cluster: ClusterArgs,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// App id to fetch
    #[arg(long, value_name = "ID")]
    pub app_id: String,

    /// Print only the JSON definition
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub cluster: ClusterArgs,
}

impl SourceArgs {
    /// Path of the definition file, with `~` expanded
    pub fn file(&self) -> Option<PathBuf> {
        self.app_json
            .as_deref()
            .map(crate::paths::expand_path)
    }
}
