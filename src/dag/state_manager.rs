// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::task_info::{RunState, TaskId};
use crate::engine::FailureCause;
use crate::errors::TrigdagError;
use crate::types::ArtifactKey;

/// Borrowed view over the graph and the per-run state map.
///
/// Tasks absent from `states` are not part of the current run.
pub struct StateManager<'a> {
    graph: &'a TaskGraph,
    states: &'a mut HashMap<TaskId, RunState>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a TaskGraph, states: &'a mut HashMap<TaskId, RunState>) -> Self {
        Self { graph, states }
    }

    pub fn state(&self, id: &str) -> Option<&RunState> {
        self.states.get(id)
    }

    pub fn set(&mut self, id: &str, state: RunState) {
        debug!(task = %id, ?state, "task state change");
        self.states.insert(id.to_string(), state);
    }

    /// Put every task of the run set into `Pending`.
    pub fn mark_pending(&mut self, run_set: &[TaskId]) {
        for id in run_set {
            self.states.insert(id.clone(), RunState::Pending);
        }
    }

    /// Every dependency finished successfully in this run.
    pub fn deps_satisfied(&self, id: &str) -> bool {
        self.graph.dependencies_of(id).all(|dep| match self.states.get(dep) {
            Some(state) => state.is_success(),
            None => {
                warn!(task = %id, dep = %dep, "dependency missing from run set");
                false
            }
        })
    }

    /// A race alternative may only start while its race is in flight.
    pub fn race_gate_open(&self, id: &str) -> bool {
        match self.graph.race_of(id) {
            Some(race) => self.states.get(race).is_some_and(RunState::is_active),
            None => true,
        }
    }

    /// The race `id` belongs to has already been decided.
    pub fn race_decided(&self, id: &str) -> bool {
        self.graph
            .race_of(id)
            .and_then(|race| self.states.get(race))
            .is_some_and(RunState::is_success)
    }

    /// Mark every not-yet-started task downstream of `root` with `state`
    /// (`Blocked` after a failure, `Cancelled` after a cancellation).
    ///
    /// Downstream covers dependents and, for a race, its alternatives.
    /// Returns the newly marked tasks, excluding `root`.
    pub fn mark_downstream(&mut self, root: &str, state: RunState) -> Vec<TaskId> {
        let mut stack: Vec<TaskId> = self.downstream_of(root);
        let mut visited: HashSet<TaskId> = HashSet::new();
        let mut marked = Vec::new();

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            if matches!(
                self.states.get(&id),
                Some(RunState::Pending) | Some(RunState::Queued)
            ) {
                debug!(task = %id, upstream = %root, ?state, "marking downstream task");
                self.states.insert(id.clone(), state.clone());
                stack.extend(self.downstream_of(&id));
                marked.push(id);
            }
        }

        marked
    }

    fn downstream_of(&self, id: &str) -> Vec<TaskId> {
        self.graph
            .dependents_of(id)
            .iter()
            .chain(self.graph.alternatives_of(id))
            .cloned()
            .collect()
    }

    /// The race has a winner: every alternative that did not finish
    /// successfully loses. An in-flight alternative whose output is already
    /// published is left to report its own completion.
    ///
    /// Returns `(superseded, still_in_flight)`; the second list must be
    /// cancelled by the caller.
    pub fn supersede_alternatives(
        &mut self,
        race: &str,
        is_complete: &dyn Fn(&ArtifactKey) -> bool,
    ) -> (Vec<TaskId>, Vec<TaskId>) {
        let mut superseded = Vec::new();
        let mut in_flight = Vec::new();

        for alt in self.graph.alternatives_of(race) {
            let Some(state) = self.states.get(alt) else {
                continue;
            };
            if state.is_success() || *state == RunState::Superseded {
                continue;
            }
            if state.is_active() {
                let published = self
                    .graph
                    .get(alt)
                    .is_some_and(|spec| is_complete(&spec.output));
                if published {
                    continue;
                }
                in_flight.push(alt.clone());
            }
            self.states.insert(alt.clone(), RunState::Superseded);
            superseded.push(alt.clone());
        }

        if !superseded.is_empty() {
            debug!(race = %race, ?superseded, "losing alternatives superseded");
        }
        (superseded, in_flight)
    }

    /// No alternative of `race` can still produce a candidate.
    pub fn alternatives_exhausted(&self, race: &str) -> bool {
        let alts = self.graph.alternatives_of(race);
        !alts.is_empty()
            && alts.iter().all(|alt| {
                matches!(
                    self.states.get(alt),
                    Some(RunState::Failed(_)) | Some(RunState::Blocked) | Some(RunState::Cancelled)
                )
            })
    }

    /// Failure recorded for an exhausted race. Retryable unless every
    /// alternative failed for good.
    pub fn exhaustion_cause(&self, race: &str) -> FailureCause {
        let mut cause = FailureCause::from(&TrigdagError::AlternativesExhausted(race.to_string()));
        cause.retryable = self
            .graph
            .alternatives_of(race)
            .iter()
            .any(|alt| match self.states.get(alt) {
                Some(RunState::Failed(failed)) => failed.retryable,
                Some(RunState::Cancelled) => true,
                _ => false,
            });
        cause
    }
}
