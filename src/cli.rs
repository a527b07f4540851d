// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `trigdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "trigdag",
    version,
    about = "Acquire instrument data for a trigger, waiting out late publication.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Trigdag.toml` in the current working directory; built-in
    /// defaults are used if it does not exist.
    #[arg(long, value_name = "PATH", default_value = "Trigdag.toml")]
    pub config: PathBuf,

    /// Trigger record (TOML) written by the notification parser.
    #[arg(long, value_name = "PATH")]
    pub trigger: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TRIGDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task graph, but don't fetch anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
