use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use trigdag::errors::{Result, TrigdagError};
use trigdag::exec::{TaskAction, TaskContext};
use trigdag::types::BoxFuture;

/// What a [`FakeAction`] does when run.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Publish the output straight away.
    Succeed,
    /// Publish the output after sleeping.
    SucceedAfter(Duration),
    Fail(String),
    /// Fail after sleeping.
    FailAfter(Duration, String),
    /// Give up as if the remote never published within the wait budget.
    MissDeadline(u32),
    /// Wait until cancelled.
    Hang,
    /// Return `Ok` without publishing anything.
    ForgetOutput,
}

#[derive(Debug, Default)]
struct LogState {
    started: Vec<String>,
    finished: Vec<String>,
    running: usize,
    max_running: usize,
    running_per_group: HashMap<String, usize>,
    max_per_group: HashMap<String, usize>,
}

/// Shared record of which fake actions ran, in which order and how many
/// at once.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    state: Arc<Mutex<LogState>>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Task ids in the order their actions started.
    pub fn started(&self) -> Vec<String> {
        self.lock().started.clone()
    }

    /// Task ids whose actions returned (successfully or not).
    pub fn finished(&self) -> Vec<String> {
        self.lock().finished.clone()
    }

    pub fn runs_of(&self, task: &str) -> usize {
        self.lock().started.iter().filter(|t| *t == task).count()
    }

    pub fn max_concurrent(&self) -> usize {
        self.lock().max_running
    }

    /// Highest number of actions of `group` that ran at once.
    pub fn max_concurrent_in(&self, group: &str) -> usize {
        self.lock().max_per_group.get(group).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, task: &str, group: &str) {
        let mut state = self.lock();
        state.started.push(task.to_string());
        state.running += 1;
        state.max_running = state.max_running.max(state.running);
        let now = {
            let n = state.running_per_group.entry(group.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        let max = state.max_per_group.entry(group.to_string()).or_insert(0);
        *max = (*max).max(now);
    }

    fn exit(&self, task: &str, group: &str) {
        let mut state = self.lock();
        state.finished.push(task.to_string());
        state.running = state.running.saturating_sub(1);
        if let Some(n) = state.running_per_group.get_mut(group) {
            *n = n.saturating_sub(1);
        }
    }
}

/// Leaves the log consistent even when the action future is dropped.
struct Running<'a> {
    log: &'a ActionLog,
    task: String,
    group: String,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.log.exit(&self.task, &self.group);
    }
}

/// Scripted task action for scheduler and runtime tests.
#[derive(Debug, Clone)]
pub struct FakeAction {
    behaviour: Behaviour,
    group: String,
    log: ActionLog,
}

impl FakeAction {
    pub fn new(behaviour: Behaviour, log: &ActionLog) -> Self {
        Self {
            behaviour,
            group: "default".to_string(),
            log: log.clone(),
        }
    }

    /// Count concurrency of this action under `group`.
    pub fn in_group(mut self, group: &str) -> Self {
        self.group = group.to_string();
        self
    }
}

impl TaskAction for FakeAction {
    fn run(&self, ctx: TaskContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.log.enter(&ctx.task, &self.group);
            let _running = Running {
                log: &self.log,
                task: ctx.task.clone(),
                group: self.group.clone(),
            };

            match &self.behaviour {
                Behaviour::Succeed => {}
                Behaviour::SucceedAfter(delay) => tokio::time::sleep(*delay).await,
                Behaviour::Fail(msg) => return Err(TrigdagError::Other(anyhow::anyhow!(msg.clone()))),
                Behaviour::FailAfter(delay, msg) => {
                    tokio::time::sleep(*delay).await;
                    return Err(TrigdagError::Other(anyhow::anyhow!(msg.clone())));
                }
                Behaviour::MissDeadline(attempts) => {
                    return Err(TrigdagError::DeadlineExceeded {
                        what: ctx.output.to_string(),
                        attempts: *attempts,
                        elapsed: Duration::ZERO,
                    });
                }
                Behaviour::Hang => {
                    ctx.cancel.cancelled().await;
                    return Err(TrigdagError::Cancelled(ctx.task.clone()));
                }
                Behaviour::ForgetOutput => return Ok(()),
            }

            ctx.store
                .write_bytes(&ctx.output, ctx.task.as_bytes())
                .await
        })
    }

    fn describe(&self) -> String {
        format!("fake {:?}", self.behaviour)
    }
}
