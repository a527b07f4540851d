// src/engine/report.rs

use std::fmt;

use serde::Serialize;

use crate::dag::TaskId;

/// A task that failed, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTask {
    pub task: TaskId,
    pub cause: String,
    /// A later rerun may succeed without any change.
    pub retryable: bool,
}

/// What happened to every task of one execution. Lists follow graph order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub completed: Vec<TaskId>,
    /// Output already existed; nothing was redone.
    pub skipped: Vec<TaskId>,
    pub failed: Vec<FailedTask>,
    pub blocked: Vec<TaskId>,
    pub superseded: Vec<TaskId>,
    pub cancelled: Vec<TaskId>,
}

impl ExecutionReport {
    /// Every task ended done, skipped or superseded.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty() && self.cancelled.is_empty()
    }

    pub fn failure_of(&self, task: &str) -> Option<&str> {
        self.failed
            .iter()
            .find(|f| f.task == task)
            .map(|f| f.cause.as_str())
    }

    /// Some failure may go away on a rerun, and none needs operator action.
    pub fn worth_rerunning(&self) -> bool {
        !self.is_success() && self.failed.iter().all(|f| f.retryable)
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "completed: {}, skipped: {}, superseded: {}, failed: {}, blocked: {}, cancelled: {}",
            self.completed.len(),
            self.skipped.len(),
            self.superseded.len(),
            self.failed.len(),
            self.blocked.len(),
            self.cancelled.len()
        )?;
        for failed in self.failed.iter() {
            let kind = if failed.retryable { "retryable" } else { "fatal" };
            writeln!(f, "  failed    {} ({kind}): {}", failed.task, failed.cause)?;
        }
        for task in self.blocked.iter() {
            writeln!(f, "  blocked   {task}")?;
        }
        for task in self.cancelled.iter() {
            writeln!(f, "  cancelled {task}")?;
        }
        Ok(())
    }
}
