// src/acquire/race.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{Result, TrigdagError};
use crate::store::{ArtifactStore, Metadata};
use crate::types::ArtifactKey;

/// One version a race can settle on, with the artifact that proves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceCandidate {
    pub version: String,
    pub key: ArtifactKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceOutcome {
    pub winner: String,
    /// Existence checks performed (0 when the winner was already recorded).
    pub ticks: u32,
    pub already_recorded: bool,
}

/// Waits for the first of several mutually exclusive versions to appear.
///
/// Candidates are checked in order on every tick, so when several appear
/// within the same tick the earliest one in the list wins. The winner is
/// written to the record key; once recorded it is final.
#[derive(Debug, Clone)]
pub struct VersionRace {
    store: Arc<dyn ArtifactStore>,
    interval: Duration,
    deadline: Option<Duration>,
}

impl VersionRace {
    pub fn new(store: Arc<dyn ArtifactStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Metadata field the winner is stored under, e.g. `trigdat_version`.
    pub fn record_field(record: &ArtifactKey) -> String {
        format!("{}_version", record.qualifier.as_deref().unwrap_or("winning"))
    }

    pub async fn run(
        &self,
        candidates: &[RaceCandidate],
        record: &ArtifactKey,
        cancel: &CancellationToken,
    ) -> Result<RaceOutcome> {
        if candidates.is_empty() {
            return Err(TrigdagError::InvalidGraph(format!(
                "version race for {record} has no candidates"
            )));
        }

        let field = Self::record_field(record);

        if let Some(meta) = self.store.read_metadata(record).await? {
            if let Some(winner) = meta.get(&field) {
                if !candidates.iter().any(|c| &c.version == winner) {
                    warn!(record = %record, winner = %winner, "recorded winner is not a current candidate");
                }
                debug!(record = %record, winner = %winner, "winner already recorded; not racing");
                return Ok(RaceOutcome {
                    winner: winner.clone(),
                    ticks: 0,
                    already_recorded: true,
                });
            }
        }

        let started = Instant::now();
        let mut ticks = 0u32;

        loop {
            ticks += 1;

            if let Some(found) = candidates.iter().find(|c| self.store.exists(&c.key)) {
                let mut meta = Metadata::new();
                meta.insert(field.clone(), found.version.clone());
                self.store.record_metadata(record, &meta).await?;

                info!(
                    record = %record,
                    winner = %found.version,
                    ticks,
                    waited_s = started.elapsed().as_secs(),
                    "version race decided"
                );
                return Ok(RaceOutcome {
                    winner: found.version.clone(),
                    ticks,
                    already_recorded: false,
                });
            }

            if let Some(deadline) = self.deadline {
                if started.elapsed() >= deadline {
                    warn!(record = %record, ticks, "no candidate version appeared before the deadline");
                    return Err(TrigdagError::DeadlineExceeded {
                        what: record.to_string(),
                        attempts: ticks,
                        elapsed: started.elapsed(),
                    });
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(TrigdagError::Cancelled(record.to_string()));
                }
                _ = sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryArtifactStore;
    use crate::types::Entity;

    fn candidates(entity: &Entity) -> Vec<RaceCandidate> {
        ["v00", "v01", "v02"]
            .iter()
            .map(|v| RaceCandidate {
                version: v.to_string(),
                key: ArtifactKey::trigdat(entity, v),
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn only_published_candidate_wins() {
        let entity = Entity::new("GRB1").unwrap();
        let store = MemoryArtifactStore::new();
        let race = VersionRace::new(Arc::new(store.clone()), Duration::from_secs(2));
        let record = ArtifactKey::version_record(&entity, "trigdat");

        let publisher = store.clone();
        let key = ArtifactKey::trigdat(&entity, "v01");
        tokio::spawn(async move {
            sleep(Duration::from_secs(7)).await;
            publisher.insert(key, b"x".to_vec());
        });

        let outcome = race
            .run(&candidates(&entity), &record, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.winner, "v01");
        assert!(!outcome.already_recorded);
        let meta = store.read_metadata(&record).await.unwrap().unwrap();
        assert_eq!(meta.get("trigdat_version").map(String::as_str), Some("v01"));
    }

    #[tokio::test(start_paused = true)]
    async fn lowest_index_wins_a_tie() {
        let entity = Entity::new("GRB1").unwrap();
        let store = MemoryArtifactStore::new();
        store.insert(ArtifactKey::trigdat(&entity, "v02"), b"x".to_vec());
        store.insert(ArtifactKey::trigdat(&entity, "v01"), b"x".to_vec());
        let race = VersionRace::new(Arc::new(store.clone()), Duration::from_secs(2));

        let outcome = race
            .run(
                &candidates(&entity),
                &ArtifactKey::version_record(&entity, "trigdat"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.winner, "v01");
        assert_eq!(outcome.ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recorded_winner_is_final() {
        let entity = Entity::new("GRB1").unwrap();
        let store = MemoryArtifactStore::new();
        let record = ArtifactKey::version_record(&entity, "trigdat");
        let mut meta = Metadata::new();
        meta.insert("trigdat_version".into(), "v02".into());
        store.record_metadata(&record, &meta).await.unwrap();
        store.insert(ArtifactKey::trigdat(&entity, "v00"), b"x".to_vec());

        let race = VersionRace::new(Arc::new(store), Duration::from_secs(2));
        let outcome = race
            .run(&candidates(&entity), &record, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.winner, "v02");
        assert!(outcome.already_recorded);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_the_wait() {
        let entity = Entity::new("GRB1").unwrap();
        let race = VersionRace::new(Arc::new(MemoryArtifactStore::new()), Duration::from_secs(2))
            .with_deadline(Duration::from_secs(10));

        let err = race
            .run(
                &candidates(&entity),
                &ArtifactKey::version_record(&entity, "trigdat"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TrigdagError::DeadlineExceeded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_race() {
        let entity = Entity::new("GRB1").unwrap();
        let race = VersionRace::new(Arc::new(MemoryArtifactStore::new()), Duration::from_secs(2));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = race
            .run(
                &candidates(&entity),
                &ArtifactKey::version_record(&entity, "trigdat"),
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TrigdagError::Cancelled(_)));
    }
}
