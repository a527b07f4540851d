// src/acquire/probe.rs

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{Result, TrigdagError};
use crate::fetch::{FetchOutcome, RemoteFetcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub elapsed: Duration,
    pub rounds: u32,
}

/// Waits until every URI in a set answers as published.
///
/// Each round probes the URIs not seen yet. A round that finds something is
/// followed immediately by another; an empty round sleeps `interval` first.
#[derive(Debug, Clone)]
pub struct AvailabilityProbe {
    fetcher: Arc<dyn RemoteFetcher>,
    interval: Duration,
    deadline: Duration,
}

impl AvailabilityProbe {
    pub fn new(fetcher: Arc<dyn RemoteFetcher>, interval: Duration, deadline: Duration) -> Self {
        Self {
            fetcher,
            interval,
            deadline,
        }
    }

    pub async fn wait_for(&self, uris: &[String], cancel: &CancellationToken) -> Result<ProbeReport> {
        let started = Instant::now();
        let mut missing: BTreeSet<&str> = uris.iter().map(String::as_str).collect();
        let mut rounds = 0u32;

        while !missing.is_empty() {
            if cancel.is_cancelled() {
                return Err(TrigdagError::Cancelled("availability probe".to_string()));
            }
            rounds += 1;

            let mut found = Vec::new();
            for uri in missing.iter() {
                match self.fetcher.probe(uri).await {
                    FetchOutcome::Success => found.push(*uri),
                    FetchOutcome::NotFoundYet => {}
                    FetchOutcome::TransientError(message) => {
                        debug!(uri, round = rounds, error = %message, "transient probe error; will retry");
                    }
                    FetchOutcome::FatalError(message) => {
                        return Err(TrigdagError::FatalRequest {
                            uri: uri.to_string(),
                            message,
                        });
                    }
                }
            }
            for uri in found.iter() {
                missing.remove(uri);
            }
            debug!(round = rounds, found = found.len(), missing = missing.len(), "probe round");

            if missing.is_empty() {
                break;
            }
            if started.elapsed() >= self.deadline {
                return Err(TrigdagError::DeadlineExceeded {
                    what: format!("{} unpublished file(s)", missing.len()),
                    attempts: rounds,
                    elapsed: started.elapsed(),
                });
            }
            if found.is_empty() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(TrigdagError::Cancelled("availability probe".to_string()));
                    }
                    _ = sleep(self.interval) => {}
                }
            }
        }

        let report = ProbeReport {
            elapsed: started.elapsed(),
            rounds,
        };
        info!(files = uris.len(), rounds, elapsed_s = report.elapsed.as_secs(), "all probed files published");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ScriptedFetcher;

    #[tokio::test(start_paused = true)]
    async fn waits_until_every_file_is_published() {
        let fetcher = ScriptedFetcher::new();
        fetcher.publish_now("u/a", b"".to_vec());
        fetcher.publish_after("u/b", 2, b"".to_vec());
        let probe = AvailabilityProbe::new(
            Arc::new(fetcher.clone()),
            Duration::from_secs(180),
            Duration::from_secs(3600),
        );

        let report = probe
            .wait_for(&["u/a".to_string(), "u/b".to_string()], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.rounds, 3);
        assert_eq!(fetcher.calls("u/a"), 1);
        assert_eq!(fetcher.calls("u/b"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_deadline() {
        let fetcher = ScriptedFetcher::new();
        let probe = AvailabilityProbe::new(
            Arc::new(fetcher),
            Duration::from_secs(60),
            Duration::from_secs(300),
        );

        let err = probe
            .wait_for(&["u/never".to_string()], &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TrigdagError::DeadlineExceeded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_keep_the_probe_waiting() {
        let fetcher = ScriptedFetcher::new();
        fetcher.always_transient("u/flaky");
        let probe = AvailabilityProbe::new(
            Arc::new(fetcher.clone()),
            Duration::from_secs(60),
            Duration::from_secs(300),
        );

        let err = probe
            .wait_for(&["u/flaky".to_string()], &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TrigdagError::DeadlineExceeded { .. }), "{err}");
        assert_eq!(fetcher.calls("u/flaky"), 6);
    }
}
