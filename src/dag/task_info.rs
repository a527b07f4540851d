// src/dag/task_info.rs

//! Task definitions and per-run state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::engine::FailureCause;
use crate::exec::TaskAction;
use crate::types::ArtifactKey;

/// Canonical task identifier, e.g. `download_trigdat[GRB240101123,v01]`.
pub type TaskId = String;

/// Static definition of one task in the graph.
///
/// A task with a non-empty `alternatives` list is a version race: the listed
/// tasks only start once the race itself is running, and the race finishing
/// successfully supersedes whichever of them have not completed.
#[derive(Clone)]
pub struct TaskSpec {
    pub id: TaskId,
    /// Higher runs first when workers or pools are contended.
    pub priority: i32,
    pub pool: Option<String>,
    /// Dependencies by role; the role lets the action look up the
    /// dependency's output.
    pub deps: BTreeMap<String, TaskId>,
    pub output: ArtifactKey,
    pub alternatives: Vec<TaskId>,
    pub action: Arc<dyn TaskAction>,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>, output: ArtifactKey, action: Arc<dyn TaskAction>) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            pool: None,
            deps: BTreeMap::new(),
            output,
            alternatives: Vec::new(),
            action,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    pub fn dep(mut self, role: impl Into<String>, task: impl Into<TaskId>) -> Self {
        self.deps.insert(role.into(), task.into());
        self
    }

    pub fn alternative(mut self, task: impl Into<TaskId>) -> Self {
        self.alternatives.push(task.into());
        self
    }

    pub fn is_race(&self) -> bool {
        !self.alternatives.is_empty()
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("pool", &self.pool)
            .field("deps", &self.deps)
            .field("output", &self.output)
            .field("alternatives", &self.alternatives)
            .field("action", &self.action.describe())
            .finish()
    }
}

/// Per-run state of a task (internal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// In the run, waiting on dependencies.
    Pending,
    /// Ready; waiting for a worker slot.
    Queued,
    /// Dispatched; waiting for pool admission.
    Admitting,
    Running,
    Done,
    /// Output already existed; counts as done.
    Skipped,
    Failed(FailureCause),
    /// A dependency failed.
    Blocked,
    /// Losing alternative of a race that has been decided.
    Superseded,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RunState::Pending | RunState::Queued | RunState::Admitting | RunState::Running
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunState::Done | RunState::Skipped)
    }

    /// Dispatched and not yet reported back.
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Admitting | RunState::Running)
    }
}

/// Public, read-only view of a task's per-run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// The task is not part of this run.
    NotInRun,
    Pending,
    Queued,
    Admitting,
    Running,
    Done,
    Skipped,
    Failed,
    Blocked,
    Superseded,
    Cancelled,
}

impl From<Option<&RunState>> for TaskRunState {
    fn from(state: Option<&RunState>) -> Self {
        match state {
            None => TaskRunState::NotInRun,
            Some(RunState::Pending) => TaskRunState::Pending,
            Some(RunState::Queued) => TaskRunState::Queued,
            Some(RunState::Admitting) => TaskRunState::Admitting,
            Some(RunState::Running) => TaskRunState::Running,
            Some(RunState::Done) => TaskRunState::Done,
            Some(RunState::Skipped) => TaskRunState::Skipped,
            Some(RunState::Failed(_)) => TaskRunState::Failed,
            Some(RunState::Blocked) => TaskRunState::Blocked,
            Some(RunState::Superseded) => TaskRunState::Superseded,
            Some(RunState::Cancelled) => TaskRunState::Cancelled,
        }
    }
}

/// A task the scheduler wants the runtime to start now.
#[derive(Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub priority: i32,
    pub pool: Option<String>,
    pub output: ArtifactKey,
    /// Output key of each dependency, by role.
    pub inputs: BTreeMap<String, ArtifactKey>,
    pub action: Arc<dyn TaskAction>,
    pub is_race: bool,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("pool", &self.pool)
            .field("output", &self.output)
            .field("is_race", &self.is_race)
            .finish_non_exhaustive()
    }
}
