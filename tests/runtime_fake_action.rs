mod common;

use std::time::Duration;

use common::*;
use trigdag::pool::ResourcePools;
use trigdag::store::ArtifactStore;

#[tokio::test]
async fn chain_runs_in_dependency_order() {
    init_tracing();
    let log = ActionLog::new();
    let g = graph(vec![
        fake_task("a", Behaviour::Succeed, &log),
        fake_task("b", Behaviour::Succeed, &log).dep("in", "a"),
        fake_task("c", Behaviour::Succeed, &log).dep("in", "b"),
    ]);
    let (runtime, store) = memory_runtime(g, ResourcePools::new(), 4);

    let report = with_timeout(Duration::from_secs(5), runtime.execute(&ids(&["c"])))
        .await
        .unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(report.completed, ids(&["a", "b", "c"]));
    assert_eq!(log.started(), ids(&["a", "b", "c"]));
    assert!(store.exists(&output_of("c")));
}

#[tokio::test]
async fn failure_blocks_dependents_but_not_independent_branches() {
    init_tracing();
    let log = ActionLog::new();
    let g = graph(vec![
        fake_task("a", Behaviour::Fail("boom".into()), &log),
        fake_task("b", Behaviour::Succeed, &log).dep("in", "a"),
        fake_task("c", Behaviour::Succeed, &log).dep("in", "b"),
        fake_task("x", Behaviour::Succeed, &log),
    ]);
    let (runtime, store) = memory_runtime(g, ResourcePools::new(), 2);

    let report = with_timeout(Duration::from_secs(5), runtime.execute(&ids(&["c", "x"])))
        .await
        .unwrap();

    assert!(!report.is_success());
    assert!(report.failure_of("a").is_some_and(|c| c.contains("boom")));
    assert_eq!(report.blocked, ids(&["b", "c"]));
    assert_eq!(report.completed, ids(&["x"]));
    assert_eq!(log.runs_of("b"), 0);
    assert!(!store.exists(&output_of("a")));
}

#[tokio::test]
async fn second_execution_skips_everything_already_published() {
    init_tracing();
    let log = ActionLog::new();
    let g = graph(vec![
        fake_task("a", Behaviour::Succeed, &log),
        fake_task("b", Behaviour::Succeed, &log).dep("in", "a"),
        fake_task("c", Behaviour::Succeed, &log).dep("in", "a"),
    ]);
    let (first, store) = memory_runtime(g.clone(), ResourcePools::new(), 2);
    let report = first.execute(&ids(&["b", "c"])).await.unwrap();
    assert_eq!(report.completed.len(), 3);

    let second = runtime_on(g, &store, ResourcePools::new(), 2);
    let report = second.execute(&ids(&["b", "c"])).await.unwrap();

    assert!(report.completed.is_empty());
    assert_eq!(report.skipped, ids(&["a", "b", "c"]));
    for task in ["a", "b", "c"] {
        assert_eq!(log.runs_of(task), 1, "{task} ran again");
    }
}

#[tokio::test]
async fn prepublished_dependency_is_not_rerun() {
    init_tracing();
    let log = ActionLog::new();
    let g = graph(vec![
        fake_task("a", Behaviour::Succeed, &log),
        fake_task("b", Behaviour::Succeed, &log).dep("in", "a"),
    ]);
    let (runtime, store) = memory_runtime(g, ResourcePools::new(), 1);
    store.insert(output_of("a"), b"from an earlier run".to_vec());

    let report = runtime.execute(&ids(&["b"])).await.unwrap();

    assert_eq!(report.skipped, ids(&["a"]));
    assert_eq!(report.completed, ids(&["b"]));
    assert_eq!(log.started(), ids(&["b"]));
}

#[tokio::test]
async fn action_that_publishes_nothing_fails() {
    init_tracing();
    let log = ActionLog::new();
    let g = graph(vec![
        fake_task("lazy", Behaviour::ForgetOutput, &log),
        fake_task("after", Behaviour::Succeed, &log).dep("in", "lazy"),
    ]);
    let (runtime, _store) = memory_runtime(g, ResourcePools::new(), 1);

    let report = runtime.execute(&ids(&["after"])).await.unwrap();

    let cause = report.failure_of("lazy").expect("lazy should fail");
    assert!(cause.contains("without publishing"), "{cause}");
    assert_eq!(report.blocked, ids(&["after"]));
}

#[tokio::test]
async fn storage_write_failure_fails_the_task() {
    init_tracing();
    let log = ActionLog::new();
    let g = graph(vec![fake_task("a", Behaviour::Succeed, &log)]);
    let (runtime, store) = memory_runtime(g, ResourcePools::new(), 1);
    store.fail_writes(true);

    let report = runtime.execute(&ids(&["a"])).await.unwrap();

    assert!(report.failure_of("a").is_some());
    assert!(store.keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn worker_count_bounds_concurrency() {
    init_tracing();
    let log = ActionLog::new();
    let specs = (0..6)
        .map(|i| fake_task(&format!("t{i}"), Behaviour::SucceedAfter(Duration::from_secs(1)), &log))
        .collect();
    let (runtime, _store) = memory_runtime(graph(specs), ResourcePools::new(), 2);

    let roots: Vec<String> = (0..6).map(|i| format!("t{i}")).collect();
    let report = with_timeout(Duration::from_secs(60), runtime.execute(&roots))
        .await
        .unwrap();

    assert_eq!(report.completed.len(), 6);
    assert_eq!(log.max_concurrent(), 2);
}

#[tokio::test]
async fn single_worker_runs_highest_priority_first() {
    init_tracing();
    let log = ActionLog::new();
    let g = graph(vec![
        fake_task("low", Behaviour::Succeed, &log).priority(1),
        fake_task("high", Behaviour::Succeed, &log).priority(5),
        fake_task("mid", Behaviour::Succeed, &log).priority(3),
        fake_task("mid_later", Behaviour::Succeed, &log).priority(3),
    ]);
    let (runtime, _store) = memory_runtime(g, ResourcePools::new(), 1);

    runtime
        .execute(&ids(&["low", "high", "mid", "mid_later"]))
        .await
        .unwrap();

    assert_eq!(log.started(), ids(&["high", "mid", "mid_later", "low"]));
}

#[tokio::test]
async fn unknown_root_is_an_error() {
    let log = ActionLog::new();
    let g = graph(vec![fake_task("a", Behaviour::Succeed, &log)]);
    let (runtime, _store) = memory_runtime(g, ResourcePools::new(), 1);

    let err = runtime.execute(&ids(&["nope"])).await.unwrap_err();
    assert!(err.to_string().contains("nope"));
}

#[test]
fn runtime_rejects_tasks_in_undeclared_pools() {
    let log = ActionLog::new();
    let g = graph(vec![fake_task("a", Behaviour::Succeed, &log).pool("missing")]);
    let store = trigdag::store::MemoryArtifactStore::new();
    let err = trigdag::engine::Runtime::new(
        g,
        std::sync::Arc::new(store),
        ResourcePools::new(),
        trigdag::engine::RuntimeOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("missing"));
}
