// src/config/mod.rs

//! Configuration loading and validation for trigdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate retry budgets, pools and versions (`validate.rs`).
//! - Parse `"10s"`-style durations (`duration.rs`).
//!
//! The task graph itself is not configured here; it is derived from the
//! trigger record by [`crate::pipeline`].

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_trigger_record};
pub use model::{
    ConfigFile, DownloadSection, HttpConfig, PoolConfig, PrioritySection, ProbeSection,
    ProductConfig, RaceSection, RawConfigFile, RetryConfig, SchedulerSection, StoreSection,
};
