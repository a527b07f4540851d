// src/pipeline/build.rs

use std::sync::Arc;

use tracing::debug;

use crate::acquire::{RaceCandidate, RetryPolicy};
use crate::config::model::{ConfigFile, ProductConfig};
use crate::dag::{TaskGraph, TaskId, TaskSpec};
use crate::errors::{Result, TrigdagError};
use crate::fetch::RemoteFetcher;
use crate::pipeline::actions::{AVAILABILITY_ROLE, TRIGGER_ROLE};
use crate::pipeline::{DownloadAction, GatherAction, OpenTriggerAction, ProbeAction, TriggerRecord};
use crate::types::{ArtifactKey, Entity};

/// A validated graph for one trigger plus the tasks to request.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub entity: Entity,
    pub graph: TaskGraph,
    pub roots: Vec<TaskId>,
}

fn task_id(op: &str, entity: &Entity, params: &[&str]) -> TaskId {
    let mut id = format!("{op}[{entity}");
    for p in params {
        id.push(',');
        id.push_str(p);
    }
    id.push(']');
    id
}

fn retry_policy(product: &str, cfg: &ProductConfig, version: &str) -> Result<RetryPolicy> {
    cfg.retry_for(version).map(RetryPolicy::from).ok_or_else(|| {
        TrigdagError::ConfigError(format!(
            "[download.{product}] has no retry budget for version '{version}'"
        ))
    })
}

fn single_version<'a>(product: &str, cfg: &'a ProductConfig) -> Result<&'a str> {
    match cfg.versions.as_slice() {
        [version] => Ok(version.as_str()),
        _ => Err(TrigdagError::ConfigError(format!(
            "[download.{product}] must list exactly one version"
        ))),
    }
}

/// Build the acquisition graph for `record`.
pub fn build_pipeline(
    record: &TriggerRecord,
    cfg: &ConfigFile,
    fetcher: Arc<dyn RemoteFetcher>,
) -> Result<Pipeline> {
    let entity = record.name.clone();
    let prio = cfg.priority;
    let mut specs = Vec::new();

    let open_id = task_id("open_trigger", &entity, &[]);
    specs.push(
        TaskSpec::new(
            open_id.clone(),
            ArtifactKey::trigger_record(&entity),
            Arc::new(OpenTriggerAction::new(record.clone())),
        )
        .priority(prio.open),
    );

    // Trigdat: one download per candidate version, raced by gather_trigdat.
    let trigdat = &cfg.download.trigdat;
    let gather_id = task_id("gather_trigdat", &entity, &[]);
    let mut candidates = Vec::new();
    let mut alternatives = Vec::new();

    for version in trigdat.versions.iter() {
        let id = task_id("download_trigdat", &entity, &[version.as_str()]);
        let key = ArtifactKey::trigdat(&entity, version);
        let policy = retry_policy("trigdat", trigdat, version)?;

        let mut spec = TaskSpec::new(
            id.clone(),
            key.clone(),
            Arc::new(DownloadAction::new(Arc::clone(&fetcher), policy)),
        )
        .priority(prio.trigdat)
        .dep(TRIGGER_ROLE, open_id.clone());
        if let Some(pool) = &trigdat.pool {
            spec = spec.pool(pool.clone());
        }
        specs.push(spec);

        candidates.push(RaceCandidate {
            version: version.clone(),
            key,
        });
        alternatives.push(id);
    }

    let mut gather = TaskSpec::new(
        gather_id.clone(),
        ArtifactKey::version_record(&entity, "trigdat"),
        Arc::new(GatherAction::new(
            candidates,
            cfg.race.interval,
            cfg.race.deadline,
        )),
    )
    .priority(prio.gather)
    .dep(TRIGGER_ROLE, open_id.clone());
    gather.alternatives = alternatives;
    specs.push(gather);

    // Availability probe over every detector file, then the downloads.
    let probe_id = task_id("probe_tte_cspec", &entity, &[]);
    let mut probe = TaskSpec::new(
        probe_id.clone(),
        ArtifactKey::availability_probe(&entity),
        Arc::new(ProbeAction::new(
            Arc::clone(&fetcher),
            cfg.probe.detectors.clone(),
            cfg.probe.version.clone(),
            cfg.probe.interval,
            cfg.probe.deadline,
        )),
    )
    .priority(prio.probe)
    .dep(TRIGGER_ROLE, open_id.clone());
    if let Some(pool) = &cfg.probe.pool {
        probe = probe.pool(pool.clone());
    }
    specs.push(probe);

    let tte = &cfg.download.tte;
    let cspec = &cfg.download.cspec;
    let tte_version = single_version("tte", tte)?;
    let cspec_version = single_version("cspec", cspec)?;
    let tte_policy = retry_policy("tte", tte, tte_version)?;
    let cspec_policy = retry_policy("cspec", cspec, cspec_version)?;

    let mut roots = vec![gather_id];
    for det in cfg.probe.detectors.iter() {
        let products = [
            (
                "download_tte",
                ArtifactKey::tte(&entity, det, tte_version),
                tte_version,
                tte_policy,
                prio.tte,
                tte.pool.as_ref(),
            ),
            (
                "download_cspec",
                ArtifactKey::cspec(&entity, det, cspec_version),
                cspec_version,
                cspec_policy,
                prio.cspec,
                cspec.pool.as_ref(),
            ),
        ];
        for (op, key, version, policy, priority, pool) in products {
            let id = task_id(op, &entity, &[det.as_str(), version]);
            let mut spec = TaskSpec::new(
                id.clone(),
                key,
                Arc::new(DownloadAction::new(Arc::clone(&fetcher), policy)),
            )
            .priority(priority)
            .dep(TRIGGER_ROLE, open_id.clone())
            .dep(AVAILABILITY_ROLE, probe_id.clone());
            if let Some(pool) = pool {
                spec = spec.pool(pool.clone());
            }
            specs.push(spec);
            roots.push(id);
        }
    }

    let graph = TaskGraph::new(specs)?;
    debug!(entity = %entity, tasks = graph.len(), roots = roots.len(), "pipeline built");

    Ok(Pipeline {
        entity,
        graph,
        roots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::RawConfigFile;
    use crate::fetch::ScriptedFetcher;

    fn record() -> TriggerRecord {
        TriggerRecord {
            name: Entity::new("GRB240101123").unwrap(),
            uri: "https://archive/bn240101123/current".to_string(),
            most_likely: Some("GRB".to_string()),
            ra: None,
            dec: None,
            trigger_time: None,
            extra: Default::default(),
        }
    }

    fn config() -> ConfigFile {
        ConfigFile::try_from(RawConfigFile::default()).unwrap()
    }

    #[test]
    fn default_pipeline_shape() {
        let pipeline = build_pipeline(&record(), &config(), Arc::new(ScriptedFetcher::new())).unwrap();
        let graph = &pipeline.graph;

        // open + 3 trigdat + gather + probe + 14 * (tte + cspec)
        assert_eq!(graph.len(), 6 + 28);
        assert_eq!(pipeline.roots.len(), 1 + 28);

        let gather = graph.get("gather_trigdat[GRB240101123]").unwrap();
        assert_eq!(gather.alternatives.len(), 3);
        assert_eq!(gather.priority, 50);

        let v01 = graph.get("download_trigdat[GRB240101123,v01]").unwrap();
        assert_eq!(v01.priority, 100);
        assert_eq!(v01.pool.as_deref(), Some("trigdat"));

        let tte = graph.get("download_tte[GRB240101123,n0,v00]").unwrap();
        assert_eq!(tte.priority, -100);
        assert_eq!(
            tte.deps.get(AVAILABILITY_ROLE).map(String::as_str),
            Some("probe_tte_cspec[GRB240101123]")
        );
        assert!(graph.get("download_cspec[GRB240101123,b1,v01]").is_some());
    }

    #[test]
    fn every_task_is_reachable_from_the_roots() {
        let pipeline = build_pipeline(&record(), &config(), Arc::new(ScriptedFetcher::new())).unwrap();
        let closure = pipeline.graph.closure(&pipeline.roots).unwrap();
        assert_eq!(closure.len(), pipeline.graph.len());
    }
}
