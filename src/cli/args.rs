//! CLI argument definitions using clap derive

use crate::config::CacheKind;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Harvest - quota-aware GitHub organisation harvester
///
/// Pages through organisation members under the API rate limit and keeps a
/// staleness-bounded cache of per-user records.
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "HARVEST_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List organisation members
    Members(MembersArgs),

    /// Seed the cache with new members and refresh the stalest records
    Sync(SyncArgs),

    /// Look up records for one or more users
    Lookup(LookupArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the members command
#[derive(Parser, Debug)]
pub struct MembersArgs {
    /// Organisation (defaults to github.org from config)
    #[arg(long)]
    pub org: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the sync command
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Cache to synchronize
    #[arg(long, value_enum)]
    pub cache: CacheKind,

    /// Organisation (defaults to github.org from config)
    #[arg(long)]
    pub org: Option<String>,

    /// Override the per-run refresh budget
    #[arg(long)]
    pub budget: Option<usize>,
}

/// Arguments for the lookup command
#[derive(Parser, Debug)]
pub struct LookupArgs {
    /// User logins to look up
    #[arg(required = true)]
    pub keys: Vec<String>,

    /// Cache to read from
    #[arg(long, value_enum)]
    pub cache: CacheKind,

    /// Bypass the cache and call the API directly
    #[arg(long)]
    pub live: bool,
}

/// Output format options
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    /// Simple text (one per line)
    #[default]
    Plain,
    /// JSON output
    Json,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Config action
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
