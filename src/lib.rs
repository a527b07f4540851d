// src/lib.rs

pub mod acquire;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fetch;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod store;
pub mod types;

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, load_trigger_record};
use crate::dag::TaskGraph;
use crate::engine::{Runtime, RuntimeOptions};
use crate::fetch::HttpFetcher;
use crate::pipeline::{build_pipeline, record_solar_flare};
use crate::pool::ResourcePools;
use crate::store::{ArtifactStore, FsArtifactStore};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config and trigger record loading
/// - artifact store and HTTP fetcher
/// - pipeline graph, pools and runtime
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;
    let record = load_trigger_record(&args.trigger)?;
    info!(entity = %record.name, base_dir = ?cfg.store.base_dir, "trigger loaded");

    if record.is_solar_flare() {
        record_solar_flare(&cfg.store.base_dir, &record.name)?;
        return Ok(());
    }

    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(&cfg.store.base_dir));
    let fetcher = Arc::new(HttpFetcher::new(&cfg.http)?);
    let pipeline = build_pipeline(&record, &cfg, fetcher)?;

    if args.dry_run {
        print_dry_run(&pipeline.graph, store.as_ref());
        return Ok(());
    }

    let pools = ResourcePools::from_config(cfg.pool.iter());
    let options = RuntimeOptions {
        workers: cfg.scheduler.workers,
    };
    let runtime = Runtime::new(pipeline.graph, store, pools, options)?;

    // Ctrl-C → cancel every in-flight task.
    {
        let cancel = runtime.cancellation_token();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            cancel.cancel();
        });
    }

    let report = runtime.execute(&pipeline.roots).await?;
    print!("{report}");

    if !report.is_success() {
        let advice = if report.worth_rerunning() {
            "rerun later to resume"
        } else {
            "fix the fatal failures before rerunning"
        };
        bail!(
            "{} task(s) failed, {} blocked, {} cancelled; {advice}",
            report.failed.len(),
            report.blocked.len(),
            report.cancelled.len()
        );
    }
    Ok(())
}

/// Dry-run output: tasks, priorities, pools, deps and outputs.
fn print_dry_run(graph: &TaskGraph, store: &dyn ArtifactStore) {
    println!("trigdag dry-run");
    println!();
    println!("tasks ({}):", graph.len());
    for task in graph.tasks() {
        let done = if store.exists(&task.output) { " (done)" } else { "" };
        println!("  - {}{done}", task.id);
        println!("      action: {}", task.action.describe());
        println!("      priority: {}", task.priority);
        if let Some(pool) = &task.pool {
            println!("      pool: {pool}");
        }
        for (role, dep) in task.deps.iter() {
            println!("      {role}: {dep}");
        }
        if !task.alternatives.is_empty() {
            println!("      alternatives: {:?}", task.alternatives);
        }
        println!("      output: {}", store.path_of(&task.output).display());
    }

    debug!("dry-run complete (no execution)");
}
