mod common;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use common::*;

use tempfile::TempDir;
use trigdag::cli::CliArgs;
use trigdag::config::{load_and_validate, load_trigger_record};
use trigdag::errors::TrigdagError;
use trigdag::pipeline::SOLAR_FLARE_LOG;
use trigdag::pool::ResourcePools;

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn config_error(toml: &str) -> TrigdagError {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "trigdag.toml", toml);
    load_and_validate(&path).unwrap_err()
}

#[test]
fn product_in_undeclared_pool_is_rejected() {
    let err = config_error(
        r#"
[download.tte]
versions = ["v00"]
pool = "nope"

[download.tte.retry.v00]
interval = "30s"
max_time = "6h"
"#,
    );
    match err {
        TrigdagError::ConfigError(msg) => assert!(msg.contains("unknown pool 'nope'"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn zero_workers_is_rejected() {
    let err = config_error("[scheduler]\nworkers = 0\n");
    assert!(matches!(err, TrigdagError::ConfigError(msg) if msg.contains("workers")));
}

#[test]
fn unknown_field_is_a_parse_error() {
    let err = config_error("[scheduler]\nthreads = 2\n");
    assert!(matches!(err, TrigdagError::TomlError(_)), "{err:?}");
}

#[test]
fn bad_duration_is_a_parse_error() {
    let err = config_error("[race]\ninterval = \"soon\"\n");
    assert!(matches!(err, TrigdagError::TomlError(_)), "{err:?}");
    assert!(err.to_string().contains("duration"));
}

#[test]
fn missing_retry_budget_is_rejected() {
    let err = config_error(
        r#"
[download.trigdat]
versions = ["v00", "v01"]
pool = "trigdat"

[download.trigdat.retry.v00]
interval = "10s"
max_time = "2h"
"#,
    );
    assert!(
        matches!(&err, TrigdagError::ConfigError(msg) if msg.contains("download.trigdat.retry.v01")),
        "{err:?}"
    );
}

#[test]
fn explicit_config_path_must_exist() {
    let dir = TempDir::new().unwrap();
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, TrigdagError::IoError(_)));
}

#[test]
fn trigger_record_with_bad_entity_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "trigger.toml", "name = \"GRB/../1\"\nuri = \"https://a\"\n");
    let err = load_trigger_record(&path).unwrap_err();
    assert!(err.to_string().contains("invalid character"), "{err}");
}

#[test]
fn trigger_record_without_uri_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "trigger.toml", "name = \"GRB240101123\"\n");
    assert!(matches!(
        load_trigger_record(&path),
        Err(TrigdagError::TomlError(_))
    ));
}

#[tokio::test]
async fn solar_flare_is_logged_and_not_processed() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let config = write(
        &dir,
        "trigdag.toml",
        &format!("[store]\nbase_dir = {:?}\n", data.display().to_string()),
    );
    let trigger = write(
        &dir,
        "trigger.toml",
        "name = \"GRB240101123\"\nuri = \"https://a\"\nmost_likely = \"solar_flare\"\n",
    );

    trigdag::run(CliArgs {
        config,
        trigger,
        log_level: None,
        dry_run: false,
    })
    .await
    .unwrap();

    let log = fs::read_to_string(data.join(SOLAR_FLARE_LOG)).unwrap();
    assert_eq!(log, "GRB240101123\n");
    assert!(!data.join("GRB240101123").exists());
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let config = write(
        &dir,
        "trigdag.toml",
        &format!("[store]\nbase_dir = {:?}\n", data.display().to_string()),
    );
    let trigger = write(&dir, "trigger.toml", "name = \"GRB240101123\"\nuri = \"https://a\"\n");

    trigdag::run(CliArgs {
        config,
        trigger,
        log_level: None,
        dry_run: true,
    })
    .await
    .unwrap();

    assert!(!data.exists());
}

#[tokio::test]
async fn report_separates_missed_deadlines_from_fatal_failures() {
    init_tracing();
    let log = ActionLog::new();
    let g = graph(vec![
        fake_task("late", Behaviour::MissDeadline(3), &log),
        fake_task("rejected", Behaviour::Fail("HTTP 403 Forbidden".into()), &log),
    ]);
    let (runtime, _store) = memory_runtime(g, ResourcePools::new(), 2);

    let report = with_timeout(
        Duration::from_secs(5),
        runtime.execute(&ids(&["late", "rejected"])),
    )
    .await
    .unwrap();

    let retryable: Vec<(&str, bool)> = report
        .failed
        .iter()
        .map(|f| (f.task.as_str(), f.retryable))
        .collect();
    assert_eq!(retryable, vec![("late", true), ("rejected", false)]);
    assert!(report.failure_of("late").is_some_and(|c| c.contains("Deadline exceeded")));
    assert!(!report.worth_rerunning());
    assert!(report.to_string().contains("late (retryable)"), "{report}");
}

#[tokio::test]
async fn only_missed_deadlines_are_worth_a_rerun() {
    init_tracing();
    let log = ActionLog::new();
    let g = graph(vec![
        fake_task("late", Behaviour::MissDeadline(1), &log),
        fake_task("after", Behaviour::Succeed, &log).dep("in", "late"),
    ]);
    let (runtime, _store) = memory_runtime(g, ResourcePools::new(), 1);

    let report = with_timeout(Duration::from_secs(5), runtime.execute(&ids(&["after"])))
        .await
        .unwrap();

    assert_eq!(report.blocked, ids(&["after"]));
    assert!(report.worth_rerunning());
}
