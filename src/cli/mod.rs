//! CLI module for tenantsync
//!
//! Provides command-line interface for:
//! - serve: Boot the HTTP surface and serve until interrupted
//! - queue list: Print queued mutations
//! - queue flush: Replay queued mutations once
//! - queue remove: Drop one queued mutation
//! - queue clear: Drop every queued mutation

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command, QueueAction};
pub use commands::{build_state, queue, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
