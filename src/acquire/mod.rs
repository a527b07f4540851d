// src/acquire/mod.rs

//! Waiting for remote data.
//!
//! - [`polling`] retries one remote file on a fixed interval until it is
//!   stored, a deadline passes, or the request turns out to be hopeless.
//! - [`race`] picks the first published version among ordered candidates
//!   and records the choice so it is never re-raced.
//! - [`probe`] waits until a whole set of remote files is published,
//!   without downloading them.
//!
//! All loops sleep on tokio timers and watch a [`CancellationToken`], so a
//! cancellation ends them within one tick and never blocks a worker thread.

pub mod polling;
pub mod probe;
pub mod race;

pub use polling::{PollReport, PollState, PollingAcquirer, RetryPolicy, TimeoutCause};
pub use probe::{AvailabilityProbe, ProbeReport};
pub use race::{RaceCandidate, RaceOutcome, VersionRace};

pub use tokio_util::sync::CancellationToken;
