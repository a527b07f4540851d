// src/config/validate.rs

use crate::config::model::{ConfigFile, ProductConfig, RawConfigFile};
use crate::errors::{Result, TrigdagError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TrigdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_scheduler(cfg)?;
    validate_pools(cfg)?;
    validate_timing(cfg)?;
    validate_product("trigdat", &cfg.download.trigdat, cfg, false)?;
    validate_product("tte", &cfg.download.tte, cfg, true)?;
    validate_product("cspec", &cfg.download.cspec, cfg, true)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> TrigdagError {
    TrigdagError::ConfigError(msg.into())
}

fn validate_scheduler(cfg: &RawConfigFile) -> Result<()> {
    if cfg.scheduler.workers == 0 {
        return Err(config_error("[scheduler].workers must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_pools(cfg: &RawConfigFile) -> Result<()> {
    for (name, pool) in cfg.pool.iter() {
        if pool.capacity == 0 {
            return Err(config_error(format!(
                "[pool.{name}].capacity must be >= 1 (got 0)"
            )));
        }
    }
    if let Some(pool) = &cfg.probe.pool {
        ensure_pool_exists(cfg, pool, "[probe].pool")?;
    }
    Ok(())
}

fn ensure_pool_exists(cfg: &RawConfigFile, pool: &str, field: &str) -> Result<()> {
    if !cfg.pool.contains_key(pool) {
        return Err(config_error(format!(
            "{field} refers to unknown pool '{pool}'"
        )));
    }
    Ok(())
}

fn validate_timing(cfg: &RawConfigFile) -> Result<()> {
    if cfg.race.interval.is_zero() {
        return Err(config_error("[race].interval must be > 0"));
    }
    if cfg.race.deadline.is_zero() {
        return Err(config_error("[race].deadline must be > 0"));
    }
    if cfg.probe.interval.is_zero() {
        return Err(config_error("[probe].interval must be > 0"));
    }
    if cfg.probe.deadline.is_zero() {
        return Err(config_error("[probe].deadline must be > 0"));
    }
    if cfg.probe.detectors.is_empty() {
        return Err(config_error("[probe].detectors must list at least one detector"));
    }
    Ok(())
}

fn validate_product(
    name: &str,
    product: &ProductConfig,
    cfg: &RawConfigFile,
    single_version: bool,
) -> Result<()> {
    if product.versions.is_empty() {
        return Err(config_error(format!(
            "[download.{name}].versions must not be empty"
        )));
    }
    if single_version && product.versions.len() != 1 {
        return Err(config_error(format!(
            "[download.{name}].versions takes exactly one version (got {})",
            product.versions.len()
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for version in product.versions.iter() {
        if !seen.insert(version) {
            return Err(config_error(format!(
                "[download.{name}].versions lists '{version}' twice"
            )));
        }
        let retry = product.retry_for(version).ok_or_else(|| {
            config_error(format!(
                "missing [download.{name}.retry.{version}] section"
            ))
        })?;
        if retry.interval.is_zero() {
            return Err(config_error(format!(
                "[download.{name}.retry.{version}].interval must be > 0"
            )));
        }
        if retry.max_time.is_zero() {
            return Err(config_error(format!(
                "[download.{name}.retry.{version}].max_time must be > 0"
            )));
        }
    }

    if let Some(pool) = &product.pool {
        ensure_pool_exists(cfg, pool, &format!("[download.{name}].pool"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ConfigFile::try_from(RawConfigFile::default()).is_ok());
    }

    #[test]
    fn unknown_pool_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.download.tte.pool = Some("nope".to_string());
        match ConfigFile::try_from(raw) {
            Err(TrigdagError::ConfigError(msg)) => assert!(msg.contains("unknown pool 'nope'")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn detector_products_take_one_version() {
        let mut raw = RawConfigFile::default();
        raw.download.cspec.versions.push("v02".to_string());
        assert!(ConfigFile::try_from(raw).is_err());
    }
}
