use crate::error::{Result, StoreError};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    #[serde(default = "default_db_file")]
    pub db_file: Utf8PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Drop and recreate the store when its tables don't match the
    /// expected columns. When false a mismatch is a startup error.
    #[serde(default = "default_true")]
    pub reset_on_schema_mismatch: bool,
    #[serde(default = "default_worker_queue_size")]
    pub worker_queue_size: usize,
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            db_file: default_db_file(),
            log_level: default_log_level(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reset_on_schema_mismatch: true,
            worker_queue_size: default_worker_queue_size(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

// Default value functions
fn default_db_file() -> Utf8PathBuf {
    dirs::data_dir()
        .map(|p| p.join("rmstore/library.db"))
        .and_then(|p| Utf8PathBuf::try_from(p).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("~/.local/share/rmstore/library.db"))
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_true() -> bool {
    true
}

const fn default_worker_queue_size() -> usize {
    64
}

const fn default_event_channel_capacity() -> usize {
    1024
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::find_config_file()?;
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Loading configuration from {}", path.as_ref().display());
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| StoreError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| StoreError::Config(format!("Failed to parse config: {}", e)))?;

        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            info!("Using default configuration: {}", e);
            Self::default()
        })
    }

    fn find_config_file() -> Result<PathBuf> {
        let candidates = [
            dirs::config_dir().map(|p| p.join("rmstore/rmstore.toml")),
            Some(PathBuf::from("/etc/rmstore/rmstore.toml")),
        ];

        for candidate in candidates.into_iter().flatten() {
            if candidate.exists() {
                return Ok(candidate);
            }
            debug!("No config file at {}", candidate.display());
        }

        Err(StoreError::Config("Config file not found".to_owned()))
    }

    fn expand_paths(&mut self) {
        fn expand_tilde(path: &Utf8PathBuf) -> Utf8PathBuf {
            let path_str = path.as_str();
            if path_str.starts_with("~/") {
                if let Some(home) = dirs::home_dir() {
                    if let Some(home_str) = home.to_str() {
                        return Utf8PathBuf::from(path_str.replacen("~", home_str, 1));
                    }
                }
            }
            path.clone()
        }

        self.general.db_file = expand_tilde(&self.general.db_file);
    }

    fn validate(&self) -> Result<()> {
        if self.general.db_file.as_str().is_empty() {
            return Err(StoreError::Config("db_file must not be empty".to_owned()));
        }
        if self.store.worker_queue_size == 0 {
            return Err(StoreError::Config(
                "worker_queue_size must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}
