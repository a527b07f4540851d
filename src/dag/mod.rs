// src/dag/mod.rs

//! Task graph representation and scheduling.
//!
//! - [`graph`] holds the validated task graph, including race groups.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks are ready, which are skipped and when races are decided.
//! - [`task_info`] provides task definitions and run states.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::TaskGraph;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::{RunState, ScheduledTask, TaskId, TaskRunState, TaskSpec};
