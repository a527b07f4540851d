mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use trigdag::config::{ConfigFile, RetryConfig};
use trigdag::engine::{ExecutionReport, Runtime, RuntimeOptions};
use trigdag::fetch::{join_uri, ScriptedFetcher};
use trigdag::pipeline::{build_pipeline, TriggerRecord};
use trigdag::pool::ResourcePools;
use trigdag::store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
use trigdag::types::ArtifactKey;
use trigdag_test_utils::builders::ConfigFileBuilder;

const ARCHIVE: &str = "https://archive/triggers/bnTEST/current";
const DETECTORS: [&str; 2] = ["n0", "b0"];

fn config(base_dir: &Path) -> ConfigFile {
    ConfigFileBuilder::new()
        .base_dir(base_dir)
        .workers(4)
        .detectors(&DETECTORS)
        .probe_interval(Duration::from_secs(60))
        .retry_all(RetryConfig {
            interval: Duration::from_secs(10),
            max_time: Duration::from_secs(3600),
        })
        .build()
}

fn uri(key: ArtifactKey) -> String {
    join_uri(ARCHIVE, &key.file_name())
}

/// Archive where trigdat v00 shows up after two misses and every detector
/// file is already published.
fn scripted_archive() -> ScriptedFetcher {
    let entity = test_entity();
    let fetcher = ScriptedFetcher::new();
    fetcher.publish_after(&uri(ArtifactKey::trigdat(&entity, "v00")), 2, b"trigdat v00".to_vec());
    for det in DETECTORS {
        fetcher.publish_now(&uri(ArtifactKey::tte(&entity, det, "v00")), format!("tte {det}"));
        // Probed at v00, downloaded at v01.
        fetcher.publish_now(&uri(ArtifactKey::cspec(&entity, det, "v00")), b"".to_vec());
        fetcher.publish_now(&uri(ArtifactKey::cspec(&entity, det, "v01")), format!("cspec {det}"));
    }
    fetcher
}

fn record() -> TriggerRecord {
    trigger_record(test_entity().as_str(), ARCHIVE)
}

async fn run_pipeline(
    cfg: &ConfigFile,
    fetcher: &ScriptedFetcher,
    store: Arc<dyn ArtifactStore>,
) -> ExecutionReport {
    let pipeline = build_pipeline(&record(), cfg, Arc::new(fetcher.clone())).unwrap();
    let runtime = Runtime::new(
        pipeline.graph,
        store,
        ResourcePools::from_config(cfg.pool.iter()),
        RuntimeOptions {
            workers: cfg.scheduler.workers,
        },
    )
    .unwrap();
    with_timeout(Duration::from_secs(4 * 3600), runtime.execute(&pipeline.roots))
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn full_pipeline_acquires_everything_then_reruns_for_free() {
    init_tracing();
    let cfg = config(Path::new("unused"));
    let fetcher = scripted_archive();
    let store = MemoryArtifactStore::new();
    let entity = test_entity();

    let report = run_pipeline(&cfg, &fetcher, Arc::new(store.clone())).await;

    assert!(report.is_success(), "{report}");
    assert_eq!(
        report.superseded,
        ids(&["download_trigdat[GRBTEST,v01]", "download_trigdat[GRBTEST,v02]"])
    );
    // open + v00 + gather + probe + 2 * (tte + cspec)
    assert_eq!(report.completed.len(), 8);

    let winner = store
        .read_metadata(&ArtifactKey::version_record(&entity, "trigdat"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(winner.get("trigdat_version").map(String::as_str), Some("v00"));
    for det in DETECTORS {
        assert!(store.exists(&ArtifactKey::tte(&entity, det, "v00")));
        assert!(store.exists(&ArtifactKey::cspec(&entity, det, "v01")));
    }
    assert!(store.exists(&ArtifactKey::availability_probe(&entity)));

    let calls_after_first_run = fetcher.total_calls();
    let rerun = run_pipeline(&cfg, &fetcher, Arc::new(store.clone())).await;

    assert!(rerun.is_success(), "{rerun}");
    assert!(rerun.completed.is_empty());
    assert_eq!(fetcher.total_calls(), calls_after_first_run);
}

#[tokio::test(start_paused = true)]
async fn missing_detector_file_fails_only_that_download() {
    init_tracing();
    let cfg = ConfigFileBuilder::new()
        .detectors(&DETECTORS)
        .retry_all(RetryConfig {
            interval: Duration::from_secs(10),
            max_time: Duration::from_secs(60),
        })
        .build();
    let entity = test_entity();
    let fetcher = scripted_archive();
    // The probe saw it, but the download is refused.
    fetcher.fatal(&uri(ArtifactKey::cspec(&entity, "b0", "v01")), "HTTP 403 Forbidden");
    let store = MemoryArtifactStore::new();

    let report = run_pipeline(&cfg, &fetcher, Arc::new(store.clone())).await;

    assert_eq!(report.failed.len(), 1, "{report}");
    assert!(report.failure_of("download_cspec[GRBTEST,b0,v01]").is_some());
    assert!(report.blocked.is_empty());
    assert!(store.exists(&ArtifactKey::cspec(&entity, "n0", "v01")));
    assert!(store.exists(&ArtifactKey::trigdat(&entity, "v00")));
}

fn partial_files(dir: &Path) -> Vec<String> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            found.extend(partial_files(&path));
        } else if path.to_string_lossy().contains(".partial-") {
            found.push(path.display().to_string());
        }
    }
    found
}

#[tokio::test(start_paused = true)]
async fn filesystem_layout_after_a_full_run() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());
    let fetcher = scripted_archive();
    let store = FsArtifactStore::new(&cfg.store.base_dir);

    let report = run_pipeline(&cfg, &fetcher, Arc::new(store)).await;
    assert!(report.is_success(), "{report}");

    let root = tmp.path().join("GRBTEST");
    let trigdat = root.join("trigdat/glg_trigdat_all_bnTEST_v00.fit");
    assert_eq!(std::fs::read(&trigdat).unwrap(), b"trigdat v00");
    assert!(root.join("trigdat/.glg_trigdat_all_bnTEST_v00.fit.complete").is_file());
    assert!(!root.join("trigdat/glg_trigdat_all_bnTEST_v01.fit").exists());

    assert_eq!(
        std::fs::read_to_string(root.join("tte/data/glg_tte_n0_bnTEST_v00.fit")).unwrap(),
        "tte n0"
    );
    assert_eq!(
        std::fs::read_to_string(root.join("tte/data/glg_cspec_b0_bnTEST_v01.pha")).unwrap(),
        "cspec b0"
    );
    assert!(root.join("tte_cspec_avail.txt").is_file());

    let gather: serde_json::Value =
        serde_json::from_slice(&std::fs::read(root.join("gather_trigdat_complete.json")).unwrap())
            .unwrap();
    assert_eq!(gather["trigdat_version"], "v00");

    let trigger: serde_json::Value =
        serde_json::from_slice(&std::fs::read(root.join("trigger.json")).unwrap()).unwrap();
    assert_eq!(trigger["uri"], ARCHIVE);

    assert!(partial_files(tmp.path()).is_empty());
}
