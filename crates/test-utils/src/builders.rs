#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use trigdag::config::{ConfigFile, PoolConfig, RawConfigFile, RetryConfig};
use trigdag::dag::{TaskGraph, TaskSpec};
use trigdag::pipeline::TriggerRecord;
use trigdag::types::{ArtifactKey, Entity};

use crate::fake_action::{ActionLog, Behaviour, FakeAction};

/// Entity used by graphs built here.
pub fn test_entity() -> Entity {
    Entity::new("GRBTEST").expect("valid entity")
}

/// Distinct output key per task id.
pub fn output_of(id: &str) -> ArtifactKey {
    ArtifactKey::tte(&test_entity(), id, "v00")
}

/// A task running a [`FakeAction`] that writes [`output_of`]`(id)`.
pub fn fake_task(id: &str, behaviour: Behaviour, log: &ActionLog) -> TaskSpec {
    TaskSpec::new(id, output_of(id), Arc::new(FakeAction::new(behaviour, log)))
}

/// Build a graph, panicking on validation errors.
pub fn graph(specs: Vec<TaskSpec>) -> TaskGraph {
    TaskGraph::new(specs).expect("Failed to build valid graph")
}

pub fn trigger_record(name: &str, uri: &str) -> TriggerRecord {
    TriggerRecord {
        name: Entity::new(name).expect("valid entity"),
        uri: uri.to_string(),
        most_likely: Some("GRB".to_string()),
        ra: None,
        dec: None,
        trigger_time: None,
        extra: Default::default(),
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn base_dir(mut self, dir: &Path) -> Self {
        self.config.store.base_dir = dir.to_path_buf();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.scheduler.workers = workers;
        self
    }

    pub fn pool(mut self, name: &str, capacity: usize) -> Self {
        self.config
            .pool
            .insert(name.to_string(), PoolConfig { capacity });
        self
    }

    pub fn detectors(mut self, detectors: &[&str]) -> Self {
        self.config.probe.detectors = detectors.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn probe_interval(mut self, interval: std::time::Duration) -> Self {
        self.config.probe.interval = interval;
        self
    }

    /// Same retry budget for every configured version of every product.
    pub fn retry_all(mut self, retry: RetryConfig) -> Self {
        let download = &mut self.config.download;
        for product in [&mut download.trigdat, &mut download.tte, &mut download.cspec] {
            for version in product.versions.clone() {
                product.retry.insert(version, retry);
            }
        }
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
