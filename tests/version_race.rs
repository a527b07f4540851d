mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use trigdag::acquire::{RaceCandidate, RetryPolicy};
use trigdag::dag::{TaskGraph, TaskSpec};
use trigdag::fetch::{join_uri, RemoteFetcher, ScriptedFetcher};
use trigdag::pipeline::actions::TRIGGER_ROLE;
use trigdag::pipeline::{DownloadAction, GatherAction, OpenTriggerAction};
use trigdag::pool::ResourcePools;
use trigdag::store::{ArtifactStore, Metadata};
use trigdag::types::ArtifactKey;

const ARCHIVE: &str = "https://archive/bnTEST";
const GATHER: &str = "gather";
const VERSIONS: [&str; 2] = ["v00", "v01"];

fn download_id(version: &str) -> String {
    format!("download_{version}")
}

fn trigdat_uri(version: &str) -> String {
    let key = ArtifactKey::trigdat(&test_entity(), version);
    join_uri(ARCHIVE, &key.file_name())
}

/// open → download_v00 | download_v01 raced by gather → analyse
fn race_graph(fetcher: Arc<dyn RemoteFetcher>, log: &ActionLog) -> TaskGraph {
    let entity = test_entity();
    let record = trigger_record(entity.as_str(), ARCHIVE);
    let policy = RetryPolicy::new(Duration::from_secs(10), Duration::from_secs(3600));

    let mut specs = vec![TaskSpec::new(
        "open",
        ArtifactKey::trigger_record(&entity),
        Arc::new(OpenTriggerAction::new(record)),
    )];

    let mut gather = TaskSpec::new(
        GATHER,
        ArtifactKey::version_record(&entity, "trigdat"),
        Arc::new(GatherAction::new(
            VERSIONS
                .iter()
                .map(|v| RaceCandidate {
                    version: v.to_string(),
                    key: ArtifactKey::trigdat(&entity, v),
                })
                .collect(),
            Duration::from_secs(2),
            Duration::from_secs(6 * 3600),
        )),
    )
    .priority(50)
    .dep(TRIGGER_ROLE, "open");

    for version in VERSIONS {
        specs.push(
            TaskSpec::new(
                download_id(version),
                ArtifactKey::trigdat(&entity, version),
                Arc::new(DownloadAction::new(Arc::clone(&fetcher), policy)),
            )
            .priority(100)
            .pool("trigdat")
            .dep(TRIGGER_ROLE, "open"),
        );
        gather = gather.alternative(download_id(version));
    }
    specs.push(gather);
    specs.push(fake_task("analyse", Behaviour::Succeed, log).dep("trigdat", GATHER));

    graph(specs)
}

fn pools() -> ResourcePools {
    ResourcePools::new().with_pool("trigdat", 3)
}

#[tokio::test(start_paused = true)]
async fn first_published_version_wins_and_the_rest_are_superseded() {
    init_tracing();
    let fetcher = ScriptedFetcher::new();
    fetcher.publish_after(&trigdat_uri("v01"), 3, b"trigdat v01".to_vec());
    let log = ActionLog::new();
    let g = race_graph(Arc::new(fetcher.clone()), &log);
    let (runtime, store) = memory_runtime(g, pools(), 4);

    let report = with_timeout(
        Duration::from_secs(3600),
        runtime.execute(&ids(&["analyse"])),
    )
    .await
    .unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(report.superseded, ids(&["download_v00"]));
    assert!(report.completed.contains(&"download_v01".to_string()));
    assert_eq!(log.runs_of("analyse"), 1);

    let record = ArtifactKey::version_record(&test_entity(), "trigdat");
    let meta = store.read_metadata(&record).await.unwrap().unwrap();
    assert_eq!(meta.get("trigdat_version").map(String::as_str), Some("v01"));
    assert_eq!(fetcher.calls(&trigdat_uri("v01")), 4);
    assert!(!store.exists(&ArtifactKey::trigdat(&test_entity(), "v00")));
}

#[tokio::test(start_paused = true)]
async fn recorded_winner_is_never_raced_again() {
    init_tracing();
    let fetcher = ScriptedFetcher::new();
    let log = ActionLog::new();
    let g = race_graph(Arc::new(fetcher.clone()), &log);
    let (runtime, store) = memory_runtime(g, pools(), 4);

    let mut meta = Metadata::new();
    meta.insert("trigdat_version".to_string(), "v01".to_string());
    store
        .record_metadata(&ArtifactKey::version_record(&test_entity(), "trigdat"), &meta)
        .await
        .unwrap();

    let report = with_timeout(Duration::from_secs(60), runtime.execute(&ids(&["analyse"])))
        .await
        .unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(report.skipped, ids(&[GATHER]));
    assert_eq!(report.superseded, ids(&["download_v00", "download_v01"]));
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn race_fails_once_every_alternative_has_failed() {
    init_tracing();
    let fetcher = ScriptedFetcher::new();
    for version in VERSIONS {
        fetcher.fatal(&trigdat_uri(version), "HTTP 403 Forbidden");
    }
    let log = ActionLog::new();
    let g = race_graph(Arc::new(fetcher.clone()), &log);
    let (runtime, _store) = memory_runtime(g, pools(), 4);

    let report = with_timeout(Duration::from_secs(60), runtime.execute(&ids(&["analyse"])))
        .await
        .unwrap();

    assert!(report.failure_of("download_v00").is_some_and(|c| c.contains("403")));
    assert!(report.failure_of("download_v01").is_some());
    let cause = report.failure_of(GATHER).expect("race should fail");
    assert!(cause.contains("Every alternative"), "{cause}");
    assert!(report.failed.iter().all(|f| !f.retryable), "{report}");
    assert!(!report.worth_rerunning());
    assert_eq!(report.blocked, ids(&["analyse"]));
    assert_eq!(log.runs_of("analyse"), 0);
}

#[tokio::test(start_paused = true)]
async fn alternatives_wait_for_the_race_to_start() {
    init_tracing();
    let fetcher = ScriptedFetcher::new();
    fetcher.publish_now(&trigdat_uri("v00"), b"trigdat v00".to_vec());
    let log = ActionLog::new();
    // Gate the race behind a slow prerequisite.
    let specs: Vec<TaskSpec> = race_graph(Arc::new(fetcher.clone()), &log)
        .tasks()
        .cloned()
        .map(|s| if s.id == GATHER { s.dep("gate", "slow") } else { s })
        .chain(std::iter::once(fake_task(
            "slow",
            Behaviour::SucceedAfter(Duration::from_secs(100)),
            &log,
        )))
        .collect();
    let (runtime, _store) = memory_runtime(graph(specs), pools(), 4);

    let handle = tokio::spawn(async move { runtime.execute(&ids(&["analyse"])).await });
    tokio::time::sleep(Duration::from_secs(50)).await;
    assert_eq!(fetcher.total_calls(), 0, "alternative started before its race");

    let report = with_timeout(Duration::from_secs(3600), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(report.is_success(), "{report}");
}
