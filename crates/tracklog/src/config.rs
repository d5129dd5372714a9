//! Configuration management for tracklog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geolocation::PositionOptions;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "tracklog";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "tracks.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `TRACKLOG_`)
/// 2. TOML config file at `~/.config/tracklog/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sampling and location source configuration.
    pub recorder: RecorderConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// GPX export configuration.
    pub export: ExportConfig,
}

/// Sampling and location source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Minimum time between two accepted points, in milliseconds.
    pub min_interval_ms: u64,
    /// Ask the location source for its most accurate fix.
    pub high_accuracy: bool,
    /// Oldest cached fix the source may hand back, in milliseconds.
    pub maximum_age_ms: u64,
    /// How long a single position request may take, in milliseconds.
    pub timeout_ms: u64,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/tracklog/tracks.db`
    pub database_path: Option<PathBuf>,
}

/// GPX export configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory exported files are written to.
    /// Defaults to the current directory.
    pub output_dir: Option<PathBuf>,
    /// Value of the `creator` attribute on the `<gpx>` root.
    pub creator: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            high_accuracy: true,
            maximum_age_ms: 0, // always fresh
            timeout_ms: 5000,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            creator: crate::gpx::DEFAULT_CREATOR.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("TRACKLOG_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.recorder.timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.export.creator.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "export creator cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the export directory, resolving defaults if not set.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.export
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the sampling interval as a Duration.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.recorder.min_interval_ms)
    }

    /// Build the options passed to every position request.
    #[must_use]
    pub fn position_options(&self) -> PositionOptions {
        PositionOptions {
            high_accuracy: self.recorder.high_accuracy,
            maximum_age: Duration::from_millis(self.recorder.maximum_age_ms),
            timeout: Duration::from_millis(self.recorder.timeout_ms),
        }
    }
}
