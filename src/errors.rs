// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrigdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("Invalid task graph: {0}")]
    InvalidGraph(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Writing an artifact failed; previously published data is untouched.
    #[error("Storage write failed for {key}: {message}")]
    StorageWrite { key: String, message: String },

    /// The remote rejected a request that can never succeed.
    #[error("Fatal request error for {uri}: {message}")]
    FatalRequest { uri: String, message: String },

    /// The wait budget ran out; the data may still appear, so a rerun can succeed.
    #[error("Deadline exceeded waiting for {what} after {attempts} attempt(s) in {elapsed:?}")]
    DeadlineExceeded {
        what: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("Every alternative of {0} failed")]
    AlternativesExhausted(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrigdagError {
    pub fn storage(key: impl ToString, err: impl ToString) -> Self {
        TrigdagError::StorageWrite {
            key: key.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether rerunning later might succeed without operator changes.
    pub fn is_retryable_later(&self) -> bool {
        matches!(
            self,
            TrigdagError::DeadlineExceeded { .. }
                | TrigdagError::Cancelled(_)
                | TrigdagError::AlternativesExhausted(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TrigdagError>;
