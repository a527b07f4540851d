// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;
use crate::pipeline::TriggerRecord;

/// Environment variable that overrides `[store].base_dir`.
pub const DATA_DIR_ENV: &str = "TRIGDAG_DATA_DIR";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path, apply the environment override and
/// validate it.
///
/// A missing file is not an error when `path` is the default location: the
/// built-in defaults are used instead.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let mut raw = if !path.exists() && path == default_config_path() {
        debug!(path = ?path, "no config file found; using defaults");
        RawConfigFile::default()
    } else {
        load_from_path(path)?
    };

    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            debug!(base_dir = %dir, "base_dir overridden from {DATA_DIR_ENV}");
            raw.store.base_dir = PathBuf::from(dir);
        }
    }

    ConfigFile::try_from(raw)
}

/// Read the structured trigger record produced by the notification parser.
pub fn load_trigger_record(path: impl AsRef<Path>) -> Result<TriggerRecord> {
    let contents = fs::read_to_string(path.as_ref())?;
    let record: TriggerRecord = toml::from_str(&contents)?;
    Ok(record)
}

/// Default config location: `Trigdag.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Trigdag.toml")
}
