use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::orchestration::CoordinatorConfig;
use crate::{clog_debug, Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Wave time budget in seconds; tasks not settled by then are
    /// reported as timed out. Defaults to 120.
    pub wave_deadline_secs: Option<u64>,
    /// Worker invoked for terminal aggregation. Defaults to "summarizer".
    pub aggregator: Option<String>,
    /// Context key the summary is stored under. Defaults to "summary".
    pub summary_key: Option<String>,
}

impl Config {
    pub fn crest_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".crest"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::crest_dir()?.join("crest.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        clog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            clog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        clog_debug!(
            "Config loaded: wave_deadline_secs={:?}, aggregator={:?}",
            config.wave_deadline_secs,
            config.aggregator
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let crest_dir = Self::crest_dir()?;
        if !crest_dir.exists() {
            fs::create_dir_all(&crest_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        clog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs() -> Result<()> {
        let crest_dir = Self::crest_dir()?;
        if !crest_dir.exists() {
            fs::create_dir_all(&crest_dir)?;
        }
        Ok(())
    }

    /// Resolve this file config into coordinator settings, applying
    /// defaults for unset fields.
    pub fn coordinator(&self) -> CoordinatorConfig {
        let mut config = CoordinatorConfig::default();
        if let Some(secs) = self.wave_deadline_secs {
            config.wave_deadline = Duration::from_secs(secs);
        }
        if let Some(ref name) = self.aggregator {
            config.aggregator = name.clone();
        }
        if let Some(ref key) = self.summary_key {
            config.summary_key = key.clone();
        }
        config
    }
}
