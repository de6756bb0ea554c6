//! CLI argument definitions using clap
//!
//! Commands:
//! - tenantsync serve --config <path>
//! - tenantsync queue list --config <path>
//! - tenantsync queue flush --config <path> [--target <url>]
//! - tenantsync queue remove <id> --config <path>
//! - tenantsync queue clear --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tenantsync - paginated, realtime and offline-tolerant tenant data sync
#[derive(Parser, Debug)]
#[command(name = "tenantsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the list and write endpoints
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./tenantsync.json")]
        config: PathBuf,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Inspect or replay the durable write queue
    Queue {
        /// Path to configuration file
        #[arg(long, global = true, default_value = "./tenantsync.json")]
        config: PathBuf,

        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum QueueAction {
    /// Print queued mutations as JSON
    List,

    /// Replay queued mutations once
    Flush {
        /// Base URL relative mutation URLs resolve against
        #[arg(long)]
        target: Option<String>,
    },

    /// Drop one queued mutation
    Remove {
        /// Mutation id
        id: String,
    },

    /// Drop every queued mutation
    Clear,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
