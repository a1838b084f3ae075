//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from execution in main.rs.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vigil health monitor and remediation daemon
#[derive(Parser)]
#[command(name = "vigild")]
#[command(about = "Vigil - host health monitoring with guarded remediation", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (overrides $VIGIL_CONFIG and the system paths)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path (overrides the config)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the periodic check loop until ctrl-c
    Run,

    /// Run one check cycle and print its report as JSON
    Check,

    /// Collect and print one metric snapshot
    Metrics,

    /// Show recent events
    Events {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show recent actions
    Actions {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show recommendations
    Recommendations {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Only those still pending
        #[arg(long)]
        pending: bool,
    },

    /// Read or change stored settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsCommands>,
    },

    /// Manage the remediation whitelist
    Whitelist {
        #[command(subcommand)]
        action: Option<WhitelistCommands>,
    },

    /// Mark a recommendation applied or dismissed
    Recommend {
        #[command(subcommand)]
        action: RecommendCommands,
    },

    /// Undo a stored action by id
    Rollback { action_id: i64 },

    /// Write the default config to a path
    InitConfig { path: PathBuf },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print one setting
    Get { key: String },
    /// Store one setting
    Set { key: String, value: String },
}

#[derive(Subcommand)]
pub enum WhitelistCommands {
    List,
    Add { name: String },
    Remove { name: String },
}

#[derive(Subcommand)]
pub enum RecommendCommands {
    Apply { id: i64 },
    Dismiss { id: i64 },
}
