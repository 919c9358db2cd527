//! Command-line interface

pub mod commands;
pub mod output;
pub mod terminal_output;

use clap::{Parser, Subcommand};
use commands::{ExecCommand, ForkCommand, LogsCommand, ModeCommand, RunCommand, ShellCommand, VarsCommand};
use std::ffi::OsString;

/// Operator command dispatcher with masked, auditable shell execution
#[derive(Debug, Parser, Clone)]
#[command(name = "writ")]
#[command(version = "0.1.0")]
#[command(about = "Run shell operations with secret masking, timeouts and a security mode", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to settings YAML (defaults to ~/.writ/settings.yaml when present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Directory for fork logs
    #[arg(long, global = true)]
    pub log_dir: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a shell command (open mode only)
    Exec(ExecCommand),

    /// Run a pipeline definition
    Run(RunCommand),

    /// Interactive dispatch loop
    Shell(ShellCommand),

    /// Show variables and secret names
    Vars(VarsCommand),

    /// Show the configured security mode
    Mode(ModeCommand),

    /// Run a script in the background with its output logged
    Fork(ForkCommand),

    /// Inspect fork logs
    Logs(LogsCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
