// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`action`] defines the [`TaskAction`] trait every task implements and
//!   the [`TaskContext`] it runs with.
//! - [`task_runner`] waits for pool admission, re-checks the output, runs
//!   the action and reports back to the runtime via `RuntimeEvent`s.

pub mod action;
pub mod task_runner;

pub use action::{TaskAction, TaskContext};
pub use task_runner::run_task;
