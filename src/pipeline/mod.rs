// src/pipeline/mod.rs

//! The concrete acquisition pipeline for one trigger.
//!
//! [`build_pipeline`] turns a [`TriggerRecord`] and the configuration into a
//! validated [`crate::dag::TaskGraph`]:
//!
//! ```text
//! open_trigger ──┬─> gather_trigdat (race over download_trigdat[v00|v01|v02])
//!                ├─> probe_tte_cspec ──┐
//!                └─────────────────────┴─> download_tte[det], download_cspec[det]
//! ```

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::Result;
use crate::types::Entity;

pub mod actions;
pub mod build;

pub use actions::{DownloadAction, GatherAction, OpenTriggerAction, ProbeAction};
pub use build::{build_pipeline, Pipeline};

/// Classification that is never processed.
pub const SOLAR_FLARE: &str = "SOLAR_FLARE";

/// File under the base directory collecting skipped solar flares.
pub const SOLAR_FLARE_LOG: &str = "solar_flares.txt";

/// Structured trigger record written by the notification parser.
///
/// ```toml
/// name = "GRB240101123"
/// uri = "https://heasarc.gsfc.nasa.gov/FTP/fermi/data/gbm/triggers/2024/bn240101123/current"
/// most_likely = "GRB"
/// ra = 123.4
/// dec = -12.5
/// trigger_time = "2024-01-01T02:57:07"
/// ```
///
/// Further fields written by the parser (error radius, detector angles, ...)
/// are kept in `extra` and copied along with the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub name: Entity,
    /// Archive directory the instrument files are published under.
    pub uri: String,
    #[serde(default)]
    pub most_likely: Option<String>,
    #[serde(default)]
    pub ra: Option<f64>,
    #[serde(default)]
    pub dec: Option<f64>,
    #[serde(default)]
    pub trigger_time: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl TriggerRecord {
    pub fn is_solar_flare(&self) -> bool {
        self.most_likely
            .as_deref()
            .is_some_and(|c| c.trim().eq_ignore_ascii_case(SOLAR_FLARE))
    }
}

/// Append `entity` to the solar flare log under `base_dir`.
pub fn record_solar_flare(base_dir: &Path, entity: &Entity) -> Result<()> {
    std::fs::create_dir_all(base_dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(base_dir.join(SOLAR_FLARE_LOG))?;
    writeln!(file, "{entity}")?;
    info!(entity = %entity, "solar flare; not processing");
    Ok(())
}
