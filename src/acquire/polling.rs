// src/acquire/polling.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::model::RetryConfig;
use crate::errors::{Result, TrigdagError};
use crate::fetch::{FetchOutcome, RemoteFetcher};
use crate::store::ArtifactStore;
use crate::types::ArtifactKey;

/// Fixed-interval retry budget for one remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl RetryPolicy {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    /// `ceil(deadline / interval)`, and always at least one attempt.
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_nanos().max(1);
        let attempts = self.deadline.as_nanos().div_ceil(interval);
        attempts.clamp(1, u32::MAX as u128) as u32
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(cfg: RetryConfig) -> Self {
        Self::new(cfg.interval, cfg.max_time)
    }
}

/// Why polling stopped without acquiring the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutCause {
    DeadlineExceeded,
    FatalRequest(String),
    Cancelled,
}

/// `Idle → Polling → {Acquired | TimedOut}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Acquired,
    TimedOut(TimeoutCause),
}

/// Terminal summary of one acquisition.
#[derive(Debug, Clone)]
pub struct PollReport {
    pub uri: String,
    pub state: PollState,
    pub attempts: u32,
    pub elapsed: Duration,
    pub last_outcome: Option<FetchOutcome>,
}

impl PollReport {
    pub fn is_acquired(&self) -> bool {
        self.state == PollState::Acquired
    }

    /// Turn a `TimedOut` report into the matching error.
    pub fn into_result(self) -> Result<PollReport> {
        match self.state.clone() {
            PollState::Acquired => Ok(self),
            PollState::TimedOut(TimeoutCause::FatalRequest(message)) => Err(TrigdagError::FatalRequest {
                uri: self.uri,
                message,
            }),
            PollState::TimedOut(TimeoutCause::Cancelled) => Err(TrigdagError::Cancelled(self.uri)),
            PollState::TimedOut(TimeoutCause::DeadlineExceeded)
            | PollState::Idle
            | PollState::Polling => Err(TrigdagError::DeadlineExceeded {
                what: self.uri,
                attempts: self.attempts,
                elapsed: self.elapsed,
            }),
        }
    }
}

/// Polls one remote file into the store until it is published or the
/// retry budget runs out.
#[derive(Debug, Clone)]
pub struct PollingAcquirer {
    fetcher: Arc<dyn RemoteFetcher>,
    store: Arc<dyn ArtifactStore>,
    policy: RetryPolicy,
}

impl PollingAcquirer {
    pub fn new(
        fetcher: Arc<dyn RemoteFetcher>,
        store: Arc<dyn ArtifactStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            fetcher,
            store,
            policy,
        }
    }

    /// Poll `uri` into `key`.
    ///
    /// Returns `Err` only for storage failures; every other ending is a
    /// [`PollReport`] whose state says how polling ended.
    pub async fn acquire(
        &self,
        uri: &str,
        key: &ArtifactKey,
        cancel: &CancellationToken,
    ) -> Result<PollReport> {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts();
        let mut state = PollState::Idle;
        let mut attempts = 0u32;
        let mut last_outcome = None;

        debug!(
            uri,
            key = %key,
            state = ?state,
            max_attempts,
            interval = ?self.policy.interval,
            "start polling"
        );

        loop {
            if cancel.is_cancelled() {
                state = PollState::TimedOut(TimeoutCause::Cancelled);
                break;
            }

            state = PollState::Polling;
            attempts += 1;
            trace!(uri, attempt = attempts, state = ?state, "poll tick");

            let mut writer = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    state = PollState::TimedOut(TimeoutCause::Cancelled);
                    break;
                }
                w = self.store.open_for_write(key) => w?,
            };

            // One slow request must not stretch the wait past the budget.
            let remaining = self.policy.deadline.saturating_sub(started.elapsed());
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    state = PollState::TimedOut(TimeoutCause::Cancelled);
                    break;
                }
                o = timeout(remaining, self.fetcher.fetch(uri, &mut writer)) => match o {
                    Ok(outcome) => outcome?,
                    Err(_) => FetchOutcome::TransientError(format!(
                        "no complete response within the remaining {remaining:?}"
                    )),
                },
            };

            match &outcome {
                FetchOutcome::Success => {
                    writer.commit().await?;
                    last_outcome = Some(outcome.clone());
                    state = PollState::Acquired;
                    break;
                }
                FetchOutcome::NotFoundYet => {
                    debug!(uri, attempt = attempts, "not published yet");
                }
                FetchOutcome::TransientError(msg) => {
                    info!(uri, attempt = attempts, error = %msg, "transient fetch error; will retry");
                }
                FetchOutcome::FatalError(msg) => {
                    warn!(uri, attempt = attempts, error = %msg, "fatal fetch error; giving up");
                    state = PollState::TimedOut(TimeoutCause::FatalRequest(msg.clone()));
                    last_outcome = Some(outcome.clone());
                    break;
                }
            }
            drop(writer);
            last_outcome = Some(outcome);

            if attempts >= max_attempts || started.elapsed() >= self.policy.deadline {
                state = PollState::TimedOut(TimeoutCause::DeadlineExceeded);
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    state = PollState::TimedOut(TimeoutCause::Cancelled);
                    break;
                }
                _ = sleep(self.policy.interval) => {}
            }
        }

        let report = PollReport {
            uri: uri.to_string(),
            state,
            attempts,
            elapsed: started.elapsed(),
            last_outcome,
        };

        match &report.state {
            PollState::Acquired => info!(
                uri,
                attempts,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "remote file acquired"
            ),
            PollState::TimedOut(cause) => warn!(
                uri,
                attempts,
                elapsed_ms = report.elapsed.as_millis() as u64,
                cause = ?cause,
                "polling stopped without the file"
            ),
            PollState::Idle | PollState::Polling => {}
        }

        Ok(report)
    }
}
