use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::core::{
    errors::ObligationError,
    utils::{ensure_dir, PathResolver},
};
use crate::utils::{
    persistence::{backup_file_name, list_backup_files, prune_backups, write_atomic},
    DEFAULT_LOG_FILTER,
};

const CONFIG_BACKUP_PREFIX: &str = "config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Configuration backup `{0}` not found")]
    MissingBackup(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<ConfigError> for ObligationError {
    fn from(err: ConfigError) -> Self {
        ObligationError::ConfigError(err.to_string())
    }
}

impl From<ObligationError> for ConfigError {
    fn from(err: ObligationError) -> Self {
        match err {
            ObligationError::StorageError(message) => ConfigError::Storage(message),
            other => ConfigError::Storage(other.to_string()),
        }
    }
}

/// Runtime settings for the engine and its reference stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Overrides the resolved data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Number of store snapshots kept before the oldest are pruned.
    #[serde(default = "Config::default_backup_retention")]
    pub backup_retention: usize,
    #[serde(default = "Config::default_log_filter")]
    pub log_filter: String,
    /// Delete obligations once their rule is exhausted instead of keeping them as
    /// `Completed` records.
    #[serde(default)]
    pub retire_completed: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            backup_retention: Self::default_backup_retention(),
            log_filter: Self::default_log_filter(),
            retire_completed: false,
        }
    }
}

impl Config {
    fn default_backup_retention() -> usize {
        5
    }

    fn default_log_filter() -> String {
        DEFAULT_LOG_FILTER.to_string()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backup_retention == 0 {
            return Err(ConfigError::Invalid(
                "backup_retention must keep at least one snapshot".into(),
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter must not be empty".into()));
        }
        Ok(())
    }

    /// Data directory after applying the override, env var and home fallback.
    pub fn resolved_data_dir(&self) -> PathBuf {
        PathResolver::resolve_base(self.data_dir.clone())
    }
}

/// Handles persistence and backup management for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
    backups_dir: PathBuf,
}

impl ConfigManager {
    /// Uses the default data directory.
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_base_dir(PathResolver::resolve_base(None))
    }

    pub fn with_base_dir(base: PathBuf) -> Result<Self, ConfigError> {
        ensure_dir(&base)?;
        let backups_dir = PathResolver::config_backup_dir_in(&base);
        ensure_dir(&backups_dir)?;
        Ok(Self {
            config_path: PathResolver::config_file_in(&base),
            backups_dir,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Loads the stored config, or the defaults when no file exists yet.
    pub fn load(&self) -> Result<Config, ConfigError> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }
        let data = fs::read_to_string(&self.config_path)?;
        let config: Config =
            serde_json::from_str(&data).map_err(|err| ConfigError::Serde(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        config.validate()?;
        let json = serde_json::to_string_pretty(config)
            .map_err(|err| ConfigError::Serde(err.to_string()))?;
        write_atomic(&self.config_path, &json)?;
        Ok(())
    }

    /// Writes a timestamped copy of `config` and returns the backup file name.
    pub fn backup(&self, config: &Config, note: Option<&str>) -> Result<String, ConfigError> {
        let name = backup_file_name(CONFIG_BACKUP_PREFIX, Utc::now(), note);
        let json = serde_json::to_string_pretty(config)
            .map_err(|err| ConfigError::Serde(err.to_string()))?;
        write_atomic(&self.backups_dir.join(&name), &json)?;
        prune_backups(&self.backups_dir, config.backup_retention)?;
        Ok(name)
    }

    /// Loads a backup and makes it the active config.
    pub fn restore(&self, backup_name: &str) -> Result<Config, ConfigError> {
        let path = self.backups_dir.join(backup_name);
        if !path.exists() {
            return Err(ConfigError::MissingBackup(backup_name.to_string()));
        }
        let data = fs::read_to_string(&path)?;
        let config: Config =
            serde_json::from_str(&data).map_err(|err| ConfigError::Serde(err.to_string()))?;
        self.save(&config)?;
        Ok(config)
    }

    pub fn list_backups(&self) -> Result<Vec<String>, ConfigError> {
        Ok(list_backup_files(&self.backups_dir)?)
    }
}
