#![allow(dead_code)]

use std::sync::Arc;

use trigdag::dag::TaskGraph;
use trigdag::engine::{Runtime, RuntimeOptions};
use trigdag::pool::ResourcePools;
use trigdag::store::{ArtifactStore, MemoryArtifactStore};

pub use trigdag_test_utils::builders::{fake_task, graph, output_of, test_entity, trigger_record};
pub use trigdag_test_utils::fake_action::{ActionLog, Behaviour, FakeAction};
pub use trigdag_test_utils::{init_tracing, with_timeout};

/// Build a runtime over an in-memory store; the returned store handle
/// shares state with the runtime's.
pub fn memory_runtime(
    graph: TaskGraph,
    pools: ResourcePools,
    workers: usize,
) -> (Runtime, MemoryArtifactStore) {
    let store = MemoryArtifactStore::new();
    let runtime = runtime_on(graph, &store, pools, workers);
    (runtime, store)
}

pub fn runtime_on(
    graph: TaskGraph,
    store: &MemoryArtifactStore,
    pools: ResourcePools,
    workers: usize,
) -> Runtime {
    let shared: Arc<dyn ArtifactStore> = Arc::new(store.clone());
    Runtime::new(graph, shared, pools, RuntimeOptions { workers })
        .expect("runtime with valid pools")
}

pub fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}
