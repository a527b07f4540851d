// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::{Scheduler, SchedulerStep, TaskGraph, TaskId};
use crate::errors::{Result, TrigdagError};
use crate::exec::run_task;
use crate::pool::ResourcePools;
use crate::store::ArtifactStore;
use crate::types::ArtifactKey;

use super::{ExecutionReport, RuntimeEvent, RuntimeOptions};

/// Drives the [`Scheduler`] in response to [`RuntimeEvent`]s and spawns
/// dispatched tasks.
///
/// The scheduler holds all semantics; this struct only does IO: it reads
/// events from the task runners, registers pool admissions in dispatch
/// order and forwards cancellation. The scheduler only dispatches a pooled
/// task once its pool has room, so admissions here are normally immediate.
pub struct Runtime {
    scheduler: Scheduler,
    store: Arc<dyn ArtifactStore>,
    pools: ResourcePools,
    cancel: CancellationToken,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("pools", &self.pools)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        graph: TaskGraph,
        store: Arc<dyn ArtifactStore>,
        pools: ResourcePools,
        options: RuntimeOptions,
    ) -> Result<Self> {
        graph.validate_pools(&pools)?;
        Ok(Self {
            scheduler: Scheduler::new(graph, options.workers)
                .with_pool_limits(pools.capacities()),
            store,
            pools,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that cancels the whole execution when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `roots` and everything they need to completion.
    ///
    /// Task failures end up in the report; `Err` is reserved for problems
    /// with the request itself, such as an unknown root.
    pub async fn execute(mut self, roots: &[TaskId]) -> Result<ExecutionReport> {
        info!(roots = ?roots, "trigdag runtime started");

        let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(64);
        let mut tokens: HashMap<TaskId, CancellationToken> = HashMap::new();
        let cancel = self.cancel.clone();

        let store = Arc::clone(&self.store);
        let is_complete = move |key: &ArtifactKey| store.exists(key);

        let step = self.scheduler.start(roots, &is_complete)?;
        self.apply(step, &tx, &mut tokens)?;

        let mut cancelling = false;
        while !self.scheduler.is_finished() {
            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !cancelling => {
                    cancelling = true;
                    warn!("cancellation requested; stopping in-flight tasks");
                    let step = self.scheduler.cancel_all();
                    self.apply(step, &tx, &mut tokens)?;
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    debug!(?event, "runtime received event");
                    match event {
                        RuntimeEvent::TaskAdmitted { task } => {
                            self.scheduler.handle_admitted(&task);
                        }
                        RuntimeEvent::TaskCompleted { task, outcome } => {
                            tokens.remove(&task);
                            let step = self.scheduler.handle_completion(&task, outcome, &is_complete);
                            self.apply(step, &tx, &mut tokens)?;
                        }
                    }
                }
            }
        }

        let report = self.scheduler.report();
        info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            superseded = report.superseded.len(),
            failed = report.failed.len(),
            blocked = report.blocked.len(),
            cancelled = report.cancelled.len(),
            "runtime exiting"
        );
        Ok(report)
    }

    /// Execute what the scheduler asked for in one step.
    fn apply(
        &self,
        step: SchedulerStep,
        tx: &mpsc::Sender<RuntimeEvent>,
        tokens: &mut HashMap<TaskId, CancellationToken>,
    ) -> Result<()> {
        if !step.dispatched.is_empty() {
            debug!(tasks = ?step.dispatched_ids(), "spawning ready tasks");
        }

        // Admissions are registered here, synchronously and in dispatch
        // order, so pool order follows scheduler order.
        for task in step.dispatched {
            let admission = match &task.pool {
                Some(name) => {
                    let pool = self.pools.get(name).ok_or_else(|| {
                        TrigdagError::InvalidGraph(format!(
                            "task '{}' refers to unknown pool '{name}'",
                            task.id
                        ))
                    })?;
                    Some(pool.acquire(task.priority))
                }
                None => None,
            };

            let token = self.cancel.child_token();
            tokens.insert(task.id.clone(), token.clone());
            tokio::spawn(run_task(
                task,
                admission,
                Arc::clone(&self.store),
                token,
                tx.clone(),
            ));
        }

        for id in step.cancel {
            if let Some(token) = tokens.get(&id) {
                debug!(task = %id, "cancelling in-flight task");
                token.cancel();
            }
        }

        Ok(())
    }
}
