// src/engine/mod.rs

//! Orchestration engine for trigdag.
//!
//! The pure scheduling state machine lives in [`crate::dag`]; this module is
//! the async shell around it. [`runtime::Runtime`] owns the scheduler and
//! reacts to:
//! - task admission and completion events from spawned task runners
//! - global cancellation
//!
//! and hands the final [`ExecutionReport`] back to the caller.

use std::fmt;

use serde::Serialize;

use crate::dag::TaskId;
use crate::errors::TrigdagError;

/// Why a task failed, and whether a later rerun may get past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureCause {
    pub message: String,
    /// The data may still appear (deadline, cancellation); rerun later.
    pub retryable: bool,
}

impl FailureCause {
    /// A failure a rerun will not fix without operator action.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<&TrigdagError> for FailureCause {
    fn from(err: &TrigdagError) -> Self {
        Self {
            message: err.to_string(),
            retryable: err.is_retryable_later(),
        }
    }
}

impl From<&str> for FailureCause {
    fn from(message: &str) -> Self {
        Self::fatal(message)
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if self.retryable {
            f.write_str(" (retryable)")?;
        }
        Ok(())
    }
}

/// Outcome of one task run, as reported to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// The output appeared while the task waited for admission.
    AlreadyComplete,
    Failed(FailureCause),
    Cancelled,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Success => f.write_str("success"),
            TaskOutcome::AlreadyComplete => f.write_str("already-complete"),
            TaskOutcome::Failed(cause) => write!(f, "failed: {cause}"),
            TaskOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Runtime options.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Maximum number of non-race tasks in flight.
    pub workers: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Events flowing into the runtime from task runners.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// The task obtained its pool slot and is starting its action.
    TaskAdmitted { task: TaskId },
    TaskCompleted { task: TaskId, outcome: TaskOutcome },
}

pub mod report;
pub mod runtime;

pub use report::{ExecutionReport, FailedTask};
pub use runtime::Runtime;
