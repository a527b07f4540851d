// src/dag/scheduler.rs

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{RunState, ScheduledTask, TaskId, TaskRunState};
use crate::engine::{ExecutionReport, FailedTask, TaskOutcome};
use crate::errors::{Result, TrigdagError};
use crate::types::ArtifactKey;

/// Entry of the ready queue: highest priority first, FIFO among equals.
#[derive(Debug, PartialEq, Eq)]
struct QueuedTask {
    priority: i32,
    seq: u64,
    id: TaskId,
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Scheduler holds the immutable graph plus mutable per-run state.
///
/// It is pure: it never touches the store or the clock. Completion checks
/// come in through an `is_complete` callback, and every call returns a
/// [`SchedulerStep`] describing what the caller must do next.
///
/// It is responsible for:
/// - computing the run set from the requested roots
/// - short-circuiting tasks whose output already exists
/// - ordering ready tasks by priority and bounding them by worker slots
///   and pool capacities
/// - deciding races and superseding their losing alternatives
/// - blocking dependents of failed tasks
#[derive(Debug)]
pub struct Scheduler {
    graph: TaskGraph,
    workers: usize,
    /// Run set in graph order.
    run_order: Vec<TaskId>,
    states: HashMap<TaskId, RunState>,
    queue: BinaryHeap<QueuedTask>,
    next_seq: u64,
    /// Dispatched and not yet reported back, regardless of recorded state.
    in_flight: HashSet<TaskId>,
    /// Capacity per pool. A task is only dispatched once its pool has room,
    /// so admission order within a pool is the ready queue's priority order.
    pool_limits: HashMap<String, usize>,
    cancelling: bool,
}

impl Scheduler {
    pub fn new(graph: TaskGraph, workers: usize) -> Self {
        Self {
            graph,
            workers: workers.max(1),
            run_order: Vec::new(),
            states: HashMap::new(),
            queue: BinaryHeap::new(),
            next_seq: 0,
            in_flight: HashSet::new(),
            pool_limits: HashMap::new(),
            cancelling: false,
        }
    }

    /// Bound dispatch by pool capacity. Pools not listed are unbounded.
    pub fn with_pool_limits(mut self, limits: HashMap<String, usize>) -> Self {
        self.pool_limits = limits;
        self
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Read-only view of the given task's run state. `None` for unknown tasks.
    pub fn run_state_of(&self, id: &str) -> Option<TaskRunState> {
        self.graph.get(id)?;
        Some(self.states.get(id).into())
    }

    /// Non-race tasks currently holding a worker slot.
    pub fn running_workers(&self) -> usize {
        self.in_flight
            .iter()
            .filter(|id| !self.is_race(id))
            .count()
    }

    /// In-flight tasks holding a slot of `pool`, superseded ones included
    /// until they report back.
    pub fn in_flight_in(&self, pool: &str) -> usize {
        self.in_flight
            .iter()
            .filter(|id| {
                self.graph
                    .get(id)
                    .is_some_and(|s| s.pool.as_deref() == Some(pool))
            })
            .count()
    }

    /// Nothing pending, queued or in flight.
    pub fn is_finished(&self) -> bool {
        self.in_flight.is_empty() && self.all_terminal()
    }

    /// Start a run for `roots` and everything they need.
    pub fn start(
        &mut self,
        roots: &[TaskId],
        is_complete: &dyn Fn(&ArtifactKey) -> bool,
    ) -> Result<SchedulerStep> {
        if !self.in_flight.is_empty() {
            return Err(TrigdagError::InvalidGraph(
                "cannot start a run while tasks are still in flight".to_string(),
            ));
        }

        let run_set = self.graph.closure(roots)?;
        self.states.clear();
        self.queue.clear();
        self.cancelling = false;
        StateManager::new(&self.graph, &mut self.states).mark_pending(&run_set);
        self.run_order = run_set;

        info!(
            roots = roots.len(),
            tasks = self.run_order.len(),
            workers = self.workers,
            "scheduler: starting run"
        );

        let mut step = SchedulerStep::default();
        self.advance(&mut step, is_complete);
        Ok(step)
    }

    /// The runtime obtained pool admission for `id`.
    pub fn handle_admitted(&mut self, id: &str) {
        if self.states.get(id) == Some(&RunState::Admitting) {
            self.states.insert(id.to_string(), RunState::Running);
            debug!(task = %id, "admitted; running");
        }
    }

    /// Record the outcome of an in-flight task and advance the run.
    pub fn handle_completion(
        &mut self,
        id: &str,
        outcome: TaskOutcome,
        is_complete: &dyn Fn(&ArtifactKey) -> bool,
    ) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if !self.in_flight.remove(id) {
            warn!(task = %id, "completion for a task that is not in flight; ignoring");
            return step;
        }

        let is_active = self.states.get(id).is_some_and(RunState::is_active);
        if !is_active {
            // Superseded, exhausted or cancelled while it was running; the
            // recorded state stands.
            debug!(task = %id, %outcome, "late completion of a task already settled");
        } else {
            match outcome {
                TaskOutcome::Success | TaskOutcome::AlreadyComplete => {
                    let state = if outcome == TaskOutcome::Success {
                        RunState::Done
                    } else {
                        step.newly_skipped.push(id.to_string());
                        RunState::Skipped
                    };
                    info!(task = %id, ?state, "task completed");
                    self.states.insert(id.to_string(), state);
                    if self.is_race(id) {
                        self.supersede(id, &mut step, is_complete);
                    }
                }
                TaskOutcome::Failed(cause) => {
                    warn!(task = %id, cause = %cause, "task failed; blocking dependents");
                    self.states.insert(id.to_string(), RunState::Failed(cause));
                    step.newly_failed.push(id.to_string());
                    self.propagate(id, RunState::Blocked, &mut step);
                }
                TaskOutcome::Cancelled => {
                    info!(task = %id, "task cancelled");
                    self.states.insert(id.to_string(), RunState::Cancelled);
                    self.propagate(id, RunState::Cancelled, &mut step);
                }
            }
        }

        self.advance(&mut step, is_complete);
        step
    }

    /// Global cancellation: nothing new starts, everything in flight is
    /// asked to stop.
    pub fn cancel_all(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.cancelling {
            return step;
        }
        self.cancelling = true;
        self.queue.clear();

        for id in self.run_order.iter() {
            if matches!(
                self.states.get(id),
                Some(RunState::Pending) | Some(RunState::Queued)
            ) {
                self.states.insert(id.clone(), RunState::Cancelled);
            }
        }
        let mut cancel: Vec<TaskId> = self.in_flight.iter().cloned().collect();
        cancel.sort();
        step.cancel = cancel;

        warn!(in_flight = step.cancel.len(), "scheduler: cancelling run");
        step.run_finished = self.is_finished();
        step
    }

    pub fn report(&self) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for id in self.run_order.iter() {
            match self.states.get(id) {
                Some(RunState::Done) => report.completed.push(id.clone()),
                Some(RunState::Skipped) => report.skipped.push(id.clone()),
                Some(RunState::Failed(cause)) => report.failed.push(FailedTask {
                    task: id.clone(),
                    cause: cause.message.clone(),
                    retryable: cause.retryable,
                }),
                Some(RunState::Blocked) => report.blocked.push(id.clone()),
                Some(RunState::Superseded) => report.superseded.push(id.clone()),
                Some(RunState::Cancelled) => report.cancelled.push(id.clone()),
                Some(_) | None => {}
            }
        }
        report
    }

    fn is_race(&self, id: &str) -> bool {
        self.graph.get(id).is_some_and(|s| s.is_race())
    }

    fn all_terminal(&self) -> bool {
        self.states.values().all(RunState::is_terminal)
    }

    /// Settle everything that follows from the current state, then fill
    /// free worker slots.
    fn advance(&mut self, step: &mut SchedulerStep, is_complete: &dyn Fn(&ArtifactKey) -> bool) {
        if !self.cancelling {
            while self.settle_pending(step, is_complete) {}
            self.dispatch_queued(step);
            self.release_stalled(step);
        }
        step.run_finished = self.is_finished();
        if step.run_finished {
            info!("scheduler: all tasks terminal; run finished");
        }
    }

    /// One pass over pending tasks. Returns whether anything changed that
    /// could make further tasks ready.
    fn settle_pending(
        &mut self,
        step: &mut SchedulerStep,
        is_complete: &dyn Fn(&ArtifactKey) -> bool,
    ) -> bool {
        let mut changed = false;
        let pending: Vec<TaskId> = self
            .run_order
            .iter()
            .filter(|id| self.states.get(*id) == Some(&RunState::Pending))
            .cloned()
            .collect();

        for id in pending {
            let Some(spec) = self.graph.get(&id) else {
                continue;
            };
            let (output, priority, is_race) = (spec.output.clone(), spec.priority, spec.is_race());

            let mut mgr = StateManager::new(&self.graph, &mut self.states);
            if mgr.race_decided(&id) {
                mgr.set(&id, RunState::Superseded);
                step.newly_superseded.push(id);
                continue;
            }
            if !mgr.deps_satisfied(&id) || !mgr.race_gate_open(&id) {
                continue;
            }

            if is_complete(&output) {
                info!(task = %id, output = %output, "output already present; skipping");
                mgr.set(&id, RunState::Skipped);
                step.newly_skipped.push(id.clone());
                if is_race {
                    self.supersede(&id, step, is_complete);
                }
                changed = true;
                continue;
            }

            if is_race {
                if mgr.alternatives_exhausted(&id) {
                    let cause = mgr.exhaustion_cause(&id);
                    mgr.set(&id, RunState::Failed(cause));
                    step.newly_failed.push(id.clone());
                    self.propagate(&id, RunState::Blocked, step);
                } else {
                    // Races wait on the store, not on a worker.
                    info!(task = %id, "dispatching race");
                    mgr.set(&id, RunState::Running);
                    self.in_flight.insert(id.clone());
                    if let Some(task) = self.scheduled(&id) {
                        step.dispatched.push(task);
                    }
                }
                changed = true;
                continue;
            }

            debug!(task = %id, priority, "ready; queued for a worker");
            mgr.set(&id, RunState::Queued);
            self.queue.push(QueuedTask {
                priority,
                seq: self.next_seq,
                id,
            });
            self.next_seq += 1;
        }

        changed
    }

    fn dispatch_queued(&mut self, step: &mut SchedulerStep) {
        // Ready tasks whose pool is full keep their place in the queue and
        // do not take a worker slot.
        let mut held_back = Vec::new();
        while self.running_workers() < self.workers {
            let Some(next) = self.queue.pop() else {
                break;
            };
            // Entries superseded or blocked after queueing are stale.
            if self.states.get(&next.id) != Some(&RunState::Queued) {
                continue;
            }
            if !self.pool_has_room(&next.id) {
                debug!(task = %next.id, priority = next.priority, "pool full; held in queue");
                held_back.push(next);
                continue;
            }
            info!(task = %next.id, priority = next.priority, "dispatching task");
            self.states.insert(next.id.clone(), RunState::Admitting);
            self.in_flight.insert(next.id.clone());
            if let Some(task) = self.scheduled(&next.id) {
                step.dispatched.push(task);
            }
        }
        self.queue.extend(held_back);
    }

    fn pool_has_room(&self, id: &str) -> bool {
        let Some(pool) = self.graph.get(id).and_then(|s| s.pool.as_deref()) else {
            return true;
        };
        match self.pool_limits.get(pool) {
            Some(&capacity) => self.in_flight_in(pool) < capacity,
            None => true,
        }
    }

    /// Tasks that can never start once nothing is in flight would keep the
    /// run open forever; block them instead.
    fn release_stalled(&mut self, step: &mut SchedulerStep) {
        if !self.in_flight.is_empty() {
            return;
        }
        // Only a pool without capacity can hold a task back with nothing
        // in flight.
        for queued in std::mem::take(&mut self.queue) {
            if self.states.get(&queued.id) == Some(&RunState::Queued) {
                warn!(task = %queued.id, "pool has no capacity; marking blocked");
                self.states.insert(queued.id.clone(), RunState::Blocked);
                step.newly_blocked.push(queued.id);
            }
        }
        for id in self.run_order.iter() {
            if self.states.get(id) == Some(&RunState::Pending) {
                warn!(task = %id, "task can never become ready; marking blocked");
                self.states.insert(id.clone(), RunState::Blocked);
                step.newly_blocked.push(id.clone());
            }
        }
    }

    fn supersede(
        &mut self,
        race: &str,
        step: &mut SchedulerStep,
        is_complete: &dyn Fn(&ArtifactKey) -> bool,
    ) {
        let mut mgr = StateManager::new(&self.graph, &mut self.states);
        let (superseded, in_flight) = mgr.supersede_alternatives(race, is_complete);
        step.newly_superseded.extend(superseded);
        step.cancel.extend(in_flight);
    }

    /// Mark downstream tasks after `id` failed or was cancelled, and fail
    /// any race left without a viable alternative.
    fn propagate(&mut self, id: &str, state: RunState, step: &mut SchedulerStep) {
        let mut mgr = StateManager::new(&self.graph, &mut self.states);
        let marked = mgr.mark_downstream(id, state.clone());

        let races: BTreeSet<TaskId> = std::iter::once(id)
            .chain(marked.iter().map(String::as_str))
            .filter_map(|t| self.graph.race_of(t).cloned())
            .collect();

        if state == RunState::Blocked {
            step.newly_blocked.extend(marked);
        }
        if self.cancelling {
            return;
        }

        for race in races {
            let mgr = StateManager::new(&self.graph, &mut self.states);
            let active = mgr.state(&race).is_some_and(RunState::is_active);
            if active && mgr.alternatives_exhausted(&race) {
                let cause = mgr.exhaustion_cause(&race);
                warn!(race = %race, "every alternative failed; failing the race");
                self.states.insert(race.clone(), RunState::Failed(cause));
                step.newly_failed.push(race.clone());
                step.cancel.push(race.clone());
                self.propagate(&race, RunState::Blocked, step);
            }
        }
    }

    fn scheduled(&self, id: &str) -> Option<ScheduledTask> {
        let spec = self.graph.get(id)?;
        let inputs = spec
            .deps
            .iter()
            .filter_map(|(role, dep)| {
                self.graph
                    .get(dep)
                    .map(|d| (role.clone(), d.output.clone()))
            })
            .collect();

        Some(ScheduledTask {
            id: spec.id.clone(),
            priority: spec.priority,
            pool: spec.pool.clone(),
            output: spec.output.clone(),
            inputs,
            action: spec.action.clone(),
            is_race: spec.is_race(),
        })
    }
}
