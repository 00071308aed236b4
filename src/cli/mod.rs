//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Bidirectional sync between Bear and a folder of Markdown files
#[derive(Parser, Debug)]
#[command(name = "bearsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.bearsync/config.json)
    #[arg(long, global = true, env = "BEARSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import external edits into Bear, then export changed notes
    Sync,

    /// Export all notes and publish them, without importing edits
    Export {
        /// Back up and overwrite files edited since the last sync
        #[arg(long)]
        force: bool,
    },

    /// List files edited since the last sync
    Check,

    /// Show marker times, pending edits and database freshness
    Status,

    /// List note titles used more than once
    Duplicates,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
