// src/logging.rs

//! Logging setup for `trigdag` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `TRIGDAG_LOG` environment variable: a bare level ("debug") or a full
//!    filter ("trigdag=debug,reqwest=info")
//! 3. default to `info`
//!
//! A bare level keeps the HTTP client stack at `warn`: at `debug` it logs
//! every connection of every poll, which drowns the acquisition log.
//!
//! Logs are sent to STDERR so that stdout stays free for the run report.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Targets kept at `warn` unless a full filter says otherwise.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "h2", "reqwest", "rustls"];

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var("TRIGDAG_LOG").ok().as_deref())?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))?;

    Ok(())
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> Result<EnvFilter> {
    let level = match (cli_level, env) {
        (Some(lvl), _) => level_from_log_level(lvl),
        (None, Some(raw)) => match parse_level_str(raw) {
            Some(level) => level,
            None => {
                return EnvFilter::try_new(raw.trim())
                    .map_err(|e| anyhow::anyhow!("invalid TRIGDAG_LOG filter '{raw}': {e}"));
            }
        },
        (None, None) => tracing::Level::INFO,
    };

    let mut directives = vec![level.as_str().to_lowercase()];
    directives.extend(QUIET_TARGETS.iter().map(|t| format!("{t}=warn")));
    Ok(EnvFilter::try_new(directives.join(","))?)
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
