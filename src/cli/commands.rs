//! CLI command definitions

use crate::core::{PipelineDefinition, PipelineSpec};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::collections::HashMap;

/// Run a shell command
#[derive(Debug, Args, Clone)]
pub struct ExecCommand {
    /// Command text; `${VAR}` references are resolved first
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Kill the command after this many seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Extra environment (key=value)
    #[arg(short, long, value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Ask before running
    #[arg(long)]
    pub confirm: bool,
}

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    pub file: String,

    /// Run-local variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, String)>,
}

impl RunCommand {
    /// Read, decode and check the pipeline file
    pub fn definition(&self) -> Result<PipelineDefinition> {
        let content =
            std::fs::read_to_string(&self.file).with_context(|| format!("Failed to read pipeline {}", self.file))?;
        let spec: PipelineSpec =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse pipeline {}", self.file))?;
        PipelineDefinition::from_spec(&spec).with_context(|| format!("Invalid pipeline {}", self.file))
    }

    /// `--var` overrides; the last one wins for a repeated key
    pub fn variables(&self) -> HashMap<String, String> {
        self.var.iter().cloned().collect()
    }
}

/// Interactive dispatch loop
#[derive(Debug, Args, Clone)]
pub struct ShellCommand {
    /// Start in this mode instead of the configured one
    #[arg(long)]
    pub mode: Option<String>,
}

/// Show variables
#[derive(Debug, Args, Clone)]
pub struct VarsCommand {
    /// Show values without masking secrets found inside them
    #[arg(long)]
    pub unmasked: bool,
}

/// Show the configured mode
#[derive(Debug, Args, Clone)]
pub struct ModeCommand {}

/// Fork a script
#[derive(Debug, Args, Clone)]
pub struct ForkCommand {
    /// Script to run with the configured shell
    pub script: String,

    /// Display name (defaults to the script's file stem)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Wait for the script to finish
    #[arg(long)]
    pub wait: bool,
}

/// Inspect fork logs
#[derive(Debug, Args, Clone)]
pub struct LogsCommand {
    #[command(subcommand)]
    pub action: LogsAction,
}

#[derive(Debug, Subcommand, Clone)]
pub enum LogsAction {
    /// List fork logs, newest first
    List,

    /// Print a fork log by id prefix
    Tail {
        id: String,

        /// Keep printing until the fork finishes
        #[arg(short, long)]
        follow: bool,
    },
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
