// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [store]
/// base_dir = "/data/grb"
///
/// [scheduler]
/// workers = 4
///
/// [pool.trigdat]
/// capacity = 3
///
/// [race]
/// interval = "2s"
/// deadline = "6h"
///
/// [download.trigdat]
/// versions = ["v00", "v01", "v02"]
/// pool = "trigdat"
///
/// [download.trigdat.retry.v00]
/// interval = "10s"
/// max_time = "1h"
/// ```
///
/// Every section is optional; the defaults describe the Fermi/GBM archive.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Named resource pools, keyed by pool name.
    #[serde(default = "default_pools")]
    pub pool: BTreeMap<String, PoolConfig>,

    #[serde(default)]
    pub race: RaceSection,

    #[serde(default)]
    pub probe: ProbeSection,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub priority: PrioritySection,

    #[serde(default)]
    pub download: DownloadSection,
}

impl Default for RawConfigFile {
    fn default() -> Self {
        Self {
            store: StoreSection::default(),
            scheduler: SchedulerSection::default(),
            pool: default_pools(),
            race: RaceSection::default(),
            probe: ProbeSection::default(),
            http: HttpConfig::default(),
            priority: PrioritySection::default(),
            download: DownloadSection::default(),
        }
    }
}

/// Validated configuration. Only obtainable through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub store: StoreSection,
    pub scheduler: SchedulerSection,
    pub pool: BTreeMap<String, PoolConfig>,
    pub race: RaceSection,
    pub probe: ProbeSection,
    pub http: HttpConfig,
    pub priority: PrioritySection,
    pub download: DownloadSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            store: raw.store,
            scheduler: raw.scheduler,
            pool: raw.pool,
            race: raw.race,
            probe: raw.probe,
            http: raw.http,
            priority: raw.priority,
            download: raw.download,
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// Root of the artifact tree. `TRIGDAG_DATA_DIR` overrides it.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("trigdag-data")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    /// Maximum number of tasks running at once. Race tasks are not counted.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    4
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// `[pool.<name>]` section.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    pub capacity: usize,
}

fn default_pools() -> BTreeMap<String, PoolConfig> {
    let mut pools = BTreeMap::new();
    // All trigdat versions poll side by side; one slow version must not
    // hold back the others.
    pools.insert("trigdat".to_string(), PoolConfig { capacity: 3 });
    pools.insert("downloads".to_string(), PoolConfig { capacity: 1 });
    pools
}

/// `[race]` section: how the winning trigdat version is determined.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RaceSection {
    #[serde(default = "default_race_interval", with = "crate::config::duration")]
    pub interval: Duration,

    /// Give up (and ask for a rerun) after this long without any version.
    #[serde(default = "default_race_deadline", with = "crate::config::duration")]
    pub deadline: Duration,
}

fn default_race_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_race_deadline() -> Duration {
    Duration::from_secs(6 * 60 * 60)
}

impl Default for RaceSection {
    fn default() -> Self {
        Self {
            interval: default_race_interval(),
            deadline: default_race_deadline(),
        }
    }
}

/// `[probe]` section: waiting for per-detector TTE/CSPEC publication.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeSection {
    #[serde(default = "default_probe_interval", with = "crate::config::duration")]
    pub interval: Duration,

    #[serde(default = "default_probe_deadline", with = "crate::config::duration")]
    pub deadline: Duration,

    /// Version tag probed for each detector's TTE and CSPEC file.
    #[serde(default = "default_probe_version")]
    pub version: String,

    #[serde(default = "default_detectors")]
    pub detectors: Vec<String>,

    #[serde(default)]
    pub pool: Option<String>,
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(180)
}

fn default_probe_deadline() -> Duration {
    Duration::from_secs(12 * 60 * 60)
}

fn default_probe_version() -> String {
    "v00".to_string()
}

/// The twelve NaI and two BGO detectors.
pub fn default_detectors() -> Vec<String> {
    [
        "n0", "n1", "n2", "n3", "n4", "n5", "n6", "n7", "n8", "n9", "na", "nb", "b0", "b1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            interval: default_probe_interval(),
            deadline: default_probe_deadline(),
            version: default_probe_version(),
            detectors: default_detectors(),
            pool: None,
        }
    }
}

/// `[http]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Timeout for one request, including the body.
    #[serde(default = "default_http_timeout", with = "crate::config::duration")]
    pub timeout: Duration,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_user_agent() -> String {
    format!("trigdag/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// `[priority]` section. Higher runs first under contention.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrioritySection {
    #[serde(default)]
    pub open: i32,
    #[serde(default = "default_trigdat_priority")]
    pub trigdat: i32,
    #[serde(default = "default_gather_priority")]
    pub gather: i32,
    #[serde(default = "default_probe_priority")]
    pub probe: i32,
    #[serde(default = "default_detector_file_priority")]
    pub tte: i32,
    #[serde(default = "default_detector_file_priority")]
    pub cspec: i32,
}

fn default_trigdat_priority() -> i32 {
    100
}

fn default_gather_priority() -> i32 {
    50
}

fn default_probe_priority() -> i32 {
    100
}

fn default_detector_file_priority() -> i32 {
    -100
}

impl Default for PrioritySection {
    fn default() -> Self {
        Self {
            open: 0,
            trigdat: default_trigdat_priority(),
            gather: default_gather_priority(),
            probe: default_probe_priority(),
            tte: default_detector_file_priority(),
            cspec: default_detector_file_priority(),
        }
    }
}

/// `[download]` section, one entry per downloadable product.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadSection {
    #[serde(default = "default_trigdat_download")]
    pub trigdat: ProductConfig,
    #[serde(default = "default_tte_download")]
    pub tte: ProductConfig,
    #[serde(default = "default_cspec_download")]
    pub cspec: ProductConfig,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            trigdat: default_trigdat_download(),
            tte: default_tte_download(),
            cspec: default_cspec_download(),
        }
    }
}

/// `[download.<product>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductConfig {
    /// Candidate versions in preference order. TTE and CSPEC take exactly one.
    pub versions: Vec<String>,

    #[serde(default)]
    pub pool: Option<String>,

    /// `[download.<product>.retry.<version>]`: polling budget per version.
    #[serde(default)]
    pub retry: BTreeMap<String, RetryConfig>,
}

impl ProductConfig {
    pub fn retry_for(&self, version: &str) -> Option<RetryConfig> {
        self.retry.get(version).copied()
    }
}

/// Polling budget for one remote file.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Pause between two attempts.
    #[serde(with = "crate::config::duration")]
    pub interval: Duration,
    /// Total wall-clock budget.
    #[serde(with = "crate::config::duration")]
    pub max_time: Duration,
}

fn product(versions: &[&str], pool: &str, interval: u64, max_time: u64) -> ProductConfig {
    ProductConfig {
        versions: versions.iter().map(|v| v.to_string()).collect(),
        pool: Some(pool.to_string()),
        retry: versions
            .iter()
            .map(|v| {
                (
                    v.to_string(),
                    RetryConfig {
                        interval: Duration::from_secs(interval),
                        max_time: Duration::from_secs(max_time),
                    },
                )
            })
            .collect(),
    }
}

fn default_trigdat_download() -> ProductConfig {
    product(&["v00", "v01", "v02"], "trigdat", 10, 2 * 60 * 60)
}

fn default_tte_download() -> ProductConfig {
    product(&["v00"], "downloads", 30, 6 * 60 * 60)
}

fn default_cspec_download() -> ProductConfig {
    product(&["v01"], "downloads", 30, 6 * 60 * 60)
}
