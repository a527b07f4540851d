// src/exec/action.rs

//! The seam between the scheduler and the work a task does.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::dag::TaskId;
use crate::errors::{Result, TrigdagError};
use crate::store::ArtifactStore;
use crate::types::{ArtifactKey, BoxFuture};

/// Work performed by one task.
///
/// An action must publish `ctx.output` through `ctx.store` before returning
/// `Ok`; the runner treats a missing output as a failure. Actions should
/// return [`TrigdagError::Cancelled`] promptly once `ctx.cancel` fires.
pub trait TaskAction: Send + Sync {
    fn run(&self, ctx: TaskContext) -> BoxFuture<'_, Result<()>>;

    /// Short human-readable description for logs and `--dry-run`.
    fn describe(&self) -> String;
}

/// Everything an action gets to work with.
#[derive(Clone)]
pub struct TaskContext {
    pub task: TaskId,
    pub output: ArtifactKey,
    /// Output key of each dependency, by role.
    pub inputs: BTreeMap<String, ArtifactKey>,
    pub store: Arc<dyn ArtifactStore>,
    pub cancel: CancellationToken,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.task)
            .field("output", &self.output)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl TaskContext {
    pub fn input_key(&self, role: &str) -> Result<&ArtifactKey> {
        self.inputs.get(role).ok_or_else(|| {
            TrigdagError::InvalidGraph(format!("task '{}' has no input '{role}'", self.task))
        })
    }

    /// Contents of the dependency published under `role`.
    pub async fn read_input(&self, role: &str) -> Result<Vec<u8>> {
        let key = self.input_key(role)?;
        self.store.read(key).await?.ok_or_else(|| {
            TrigdagError::Other(anyhow::anyhow!(
                "input '{role}' ({key}) of task '{}' is not published",
                self.task
            ))
        })
    }
}
