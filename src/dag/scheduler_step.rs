// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::{ScheduledTask, TaskId};

/// Structured result of a single scheduler "step".
///
/// The runtime acts on `dispatched` and `cancel`; the rest is there for
/// logging and for tests that step the scheduler by hand.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks to start now, in admission order.
    pub dispatched: Vec<ScheduledTask>,
    /// In-flight tasks whose work is no longer wanted.
    pub cancel: Vec<TaskId>,
    pub newly_skipped: Vec<TaskId>,
    /// Includes races that failed because every alternative failed.
    pub newly_failed: Vec<TaskId>,
    pub newly_blocked: Vec<TaskId>,
    pub newly_superseded: Vec<TaskId>,
    /// Whether this step left nothing pending or in flight.
    pub run_finished: bool,
}

impl SchedulerStep {
    pub fn dispatched_ids(&self) -> Vec<&str> {
        self.dispatched.iter().map(|t| t.id.as_str()).collect()
    }
}
