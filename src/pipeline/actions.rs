// src/pipeline/actions.rs

use std::sync::Arc;
use std::time::Duration;

use crate::acquire::{AvailabilityProbe, PollingAcquirer, RaceCandidate, RetryPolicy, VersionRace};
use crate::errors::{Result, TrigdagError};
use crate::exec::{TaskAction, TaskContext};
use crate::fetch::{join_uri, RemoteFetcher};
use crate::pipeline::TriggerRecord;
use crate::types::{ArtifactKey, BoxFuture};

/// Role under which every task finds the trigger record.
pub const TRIGGER_ROLE: &str = "trigger";

/// Role under which detector downloads find the availability marker.
pub const AVAILABILITY_ROLE: &str = "availability";

async fn trigger_input(ctx: &TaskContext) -> Result<TriggerRecord> {
    let bytes = ctx.read_input(TRIGGER_ROLE).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Publishes the trigger record into the entity's tree.
#[derive(Debug, Clone)]
pub struct OpenTriggerAction {
    record: TriggerRecord,
}

impl OpenTriggerAction {
    pub fn new(record: TriggerRecord) -> Self {
        Self { record }
    }
}

impl TaskAction for OpenTriggerAction {
    fn run(&self, ctx: TaskContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let bytes = serde_json::to_vec_pretty(&self.record)?;
            ctx.store.write_bytes(&ctx.output, &bytes).await
        })
    }

    fn describe(&self) -> String {
        format!("open trigger record for {}", self.record.name)
    }
}

/// Polls the archive for the task's output file until it is published.
#[derive(Debug, Clone)]
pub struct DownloadAction {
    fetcher: Arc<dyn RemoteFetcher>,
    policy: RetryPolicy,
}

impl DownloadAction {
    pub fn new(fetcher: Arc<dyn RemoteFetcher>, policy: RetryPolicy) -> Self {
        Self { fetcher, policy }
    }
}

impl TaskAction for DownloadAction {
    fn run(&self, ctx: TaskContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let record = trigger_input(&ctx).await?;
            let file = ctx.output.remote_name().ok_or_else(|| {
                TrigdagError::InvalidGraph(format!("{} is not downloadable", ctx.output))
            })?;
            let uri = join_uri(&record.uri, &file);

            let acquirer =
                PollingAcquirer::new(Arc::clone(&self.fetcher), Arc::clone(&ctx.store), self.policy);
            acquirer
                .acquire(&uri, &ctx.output, &ctx.cancel)
                .await?
                .into_result()?;
            Ok(())
        })
    }

    fn describe(&self) -> String {
        format!(
            "download every {:?} for up to {:?}",
            self.policy.interval, self.policy.deadline
        )
    }
}

/// Decides which candidate version of a product is used.
#[derive(Debug, Clone)]
pub struct GatherAction {
    candidates: Vec<RaceCandidate>,
    interval: Duration,
    deadline: Duration,
}

impl GatherAction {
    pub fn new(candidates: Vec<RaceCandidate>, interval: Duration, deadline: Duration) -> Self {
        Self {
            candidates,
            interval,
            deadline,
        }
    }
}

impl TaskAction for GatherAction {
    fn run(&self, ctx: TaskContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            VersionRace::new(Arc::clone(&ctx.store), self.interval)
                .with_deadline(self.deadline)
                .run(&self.candidates, &ctx.output, &ctx.cancel)
                .await?;
            Ok(())
        })
    }

    fn describe(&self) -> String {
        let versions: Vec<&str> = self.candidates.iter().map(|c| c.version.as_str()).collect();
        format!("race versions {}", versions.join(" > "))
    }
}

/// Waits until every detector's TTE and CSPEC files are published, then
/// records how long that took.
#[derive(Debug, Clone)]
pub struct ProbeAction {
    fetcher: Arc<dyn RemoteFetcher>,
    detectors: Vec<String>,
    version: String,
    interval: Duration,
    deadline: Duration,
}

impl ProbeAction {
    pub fn new(
        fetcher: Arc<dyn RemoteFetcher>,
        detectors: Vec<String>,
        version: String,
        interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            fetcher,
            detectors,
            version,
            interval,
            deadline,
        }
    }

    fn remote_files(&self, record: &TriggerRecord) -> Vec<String> {
        self.detectors
            .iter()
            .flat_map(|det| {
                [
                    ArtifactKey::tte(&record.name, det, &self.version),
                    ArtifactKey::cspec(&record.name, det, &self.version),
                ]
            })
            .filter_map(|key| key.remote_name())
            .map(|file| join_uri(&record.uri, &file))
            .collect()
    }
}

impl TaskAction for ProbeAction {
    fn run(&self, ctx: TaskContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let record = trigger_input(&ctx).await?;
            let uris = self.remote_files(&record);

            let report = AvailabilityProbe::new(Arc::clone(&self.fetcher), self.interval, self.deadline)
                .wait_for(&uris, &ctx.cancel)
                .await?;

            let elapsed = report.elapsed.as_secs().to_string();
            ctx.store.write_bytes(&ctx.output, elapsed.as_bytes()).await
        })
    }

    fn describe(&self) -> String {
        format!(
            "probe tte/cspec {} for {} detector(s) every {:?}",
            self.version,
            self.detectors.len(),
            self.interval
        )
    }
}
