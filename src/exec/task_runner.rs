// src/exec/task_runner.rs

//! Individual task runner.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{FailureCause, RuntimeEvent, TaskOutcome};
use crate::errors::TrigdagError;
use crate::exec::TaskContext;
use crate::pool::Admission;
use crate::store::ArtifactStore;

/// Run one dispatched task and always report exactly one `TaskCompleted`.
///
/// The pool permit is held from admission until the action has finished,
/// and is released on every exit path, cancellation included.
pub async fn run_task(
    task: ScheduledTask,
    admission: Option<Admission>,
    store: Arc<dyn ArtifactStore>,
    cancel: CancellationToken,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let id = task.id.clone();
    let outcome = run_task_inner(task, admission, store, cancel, &runtime_tx).await;

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: id.clone(),
            outcome,
        })
        .await
        .is_err()
    {
        debug!(task = %id, "runtime gone; dropping completion");
    }
}

async fn run_task_inner(
    task: ScheduledTask,
    admission: Option<Admission>,
    store: Arc<dyn ArtifactStore>,
    cancel: CancellationToken,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) -> TaskOutcome {
    let _permit = match admission {
        Some(admission) => {
            if !admission.is_ready() {
                debug!(task = %task.id, pool = ?task.pool, "waiting for pool admission");
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(task = %task.id, "cancelled before admission");
                    return TaskOutcome::Cancelled;
                }
                granted = admission.granted() => match granted {
                    Ok(permit) => Some(permit),
                    Err(e) => return TaskOutcome::Failed((&e).into()),
                },
            }
        }
        None => None,
    };

    let _ = runtime_tx
        .send(RuntimeEvent::TaskAdmitted {
            task: task.id.clone(),
        })
        .await;

    // Another writer may have finished it while this one queued.
    if store.exists(&task.output) {
        info!(task = %task.id, output = %task.output, "output appeared while queued; skipping");
        return TaskOutcome::AlreadyComplete;
    }

    info!(task = %task.id, action = %task.action.describe(), "starting task");

    let ctx = TaskContext {
        task: task.id.clone(),
        output: task.output.clone(),
        inputs: task.inputs.clone(),
        store: Arc::clone(&store),
        cancel: cancel.clone(),
    };
    let action = Arc::clone(&task.action);
    let mut handle = tokio::spawn(async move { action.run(ctx).await });

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = cancel.cancelled() => {
            handle.abort();
            let _ = handle.await;
            info!(task = %task.id, "task cancelled");
            return TaskOutcome::Cancelled;
        }
    };

    match joined {
        Ok(Ok(())) if store.exists(&task.output) => {
            info!(task = %task.id, output = %task.output, "task finished");
            TaskOutcome::Success
        }
        Ok(Ok(())) => {
            warn!(task = %task.id, output = %task.output, "task returned without publishing its output");
            TaskOutcome::Failed(FailureCause::fatal(format!(
                "finished without publishing {}",
                task.output
            )))
        }
        Ok(Err(TrigdagError::Cancelled(what))) => {
            info!(task = %task.id, what = %what, "task cancelled");
            TaskOutcome::Cancelled
        }
        Ok(Err(err)) => {
            warn!(task = %task.id, error = %err, "task failed");
            TaskOutcome::Failed((&err).into())
        }
        Err(join_err) => {
            error!(task = %task.id, error = %join_err, "task aborted unexpectedly");
            TaskOutcome::Failed(FailureCause::fatal(format!("task aborted: {join_err}")))
        }
    }
}
