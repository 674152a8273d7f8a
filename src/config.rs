//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::patterns::MlOptions;
use crate::source::NightscoutConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Reading store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("glucoscope").join("cgm_data.db"))
        .unwrap_or_else(|| PathBuf::from("./cgm_data.db"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Remote source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Entries endpoint; empty means not configured
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,

    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
}

fn default_page_size() -> usize {
    crate::source::DEFAULT_PAGE_SIZE
}

fn default_page_timeout() -> u64 {
    30
}

fn default_lookup_timeout() -> u64 {
    10
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            page_size: default_page_size(),
            page_timeout_secs: default_page_timeout(),
            lookup_timeout_secs: default_lookup_timeout(),
        }
    }
}

impl SourceConfig {
    /// Settings for the Nightscout HTTP source
    pub fn nightscout(&self) -> NightscoutConfig {
        NightscoutConfig {
            entries_url: self.url.clone(),
            page_timeout: Duration::from_secs(self.page_timeout_secs),
            lookup_timeout: Duration::from_secs(self.lookup_timeout_secs),
        }
    }
}

/// Analysis defaults
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_days")]
    pub default_days: i64,

    #[serde(default = "default_min_occurrences")]
    pub min_occurrences: usize,

    #[serde(default)]
    pub overnight_start_hour: u32,

    #[serde(default = "default_overnight_end")]
    pub overnight_end_hour: u32,

    #[serde(default = "default_clusters")]
    pub clusters: usize,

    #[serde(default = "default_contamination")]
    pub contamination: f64,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_days() -> i64 {
    90
}

fn default_min_occurrences() -> usize {
    crate::patterns::DEFAULT_MIN_OCCURRENCES
}

fn default_overnight_end() -> u32 {
    6
}

fn default_clusters() -> usize {
    crate::patterns::DEFAULT_CLUSTERS
}

fn default_contamination() -> f64 {
    crate::patterns::DEFAULT_CONTAMINATION
}

fn default_seed() -> u64 {
    crate::patterns::DEFAULT_SEED
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_days: default_days(),
            min_occurrences: default_min_occurrences(),
            overnight_start_hour: 0,
            overnight_end_hour: default_overnight_end(),
            clusters: default_clusters(),
            contamination: default_contamination(),
            seed: default_seed(),
        }
    }
}

impl AnalysisConfig {
    /// Options for the combined ML run
    pub fn ml_options(&self) -> MlOptions {
        MlOptions {
            clusters: self.clusters,
            contamination: self.contamination,
            seed: self.seed,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("glucoscope").join("config.toml")),
            Some(PathBuf::from("./glucoscope.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::debug!(path = %path.display(), "Loaded config");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to load config, trying next location");
                    }
                }
            }
        }

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// An explicit path must load; otherwise search the default locations
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_with_env(path),
            None => Ok(Self::load_default()),
        }
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("GLUCOSCOPE_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }

        // The generic name wins over the legacy one
        if let Some(url) = var("GLUCOSCOPE_SOURCE_URL").or_else(|| var("NIGHTSCOUT_URL")) {
            self.source.url = url;
        }

        if let Some(level) = var("GLUCOSCOPE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("GLUCOSCOPE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Glucoscope Configuration
#
# Environment variables override these settings:
# - GLUCOSCOPE_DB_PATH
# - GLUCOSCOPE_SOURCE_URL (or NIGHTSCOUT_URL)
# - GLUCOSCOPE_LOG_LEVEL
# - GLUCOSCOPE_LOG_FORMAT

[storage]
# SQLite database holding synced readings. Defaults to
# <platform data dir>/glucoscope/cgm_data.db; `~` is not expanded.
# db_path = "/var/lib/glucoscope/cgm_data.db"

[source]
# Nightscout entries endpoint
url = "https://your-site.herokuapp.com/api/v1/entries.json"

# Entries requested per page during sync
page_size = 10000

# Timeout for page fetches (seconds)
page_timeout_secs = 30

# Timeout for latest-reading and status lookups (seconds)
lookup_timeout_secs = 10

[analysis]
# Window used when no --days is given
default_days = 90

# Events and distinct days a recurring pattern needs
min_occurrences = 2

# Overnight window for low-severity escalation [start, end)
overnight_start_hour = 0
overnight_end_hour = 6

# Pattern clusters
clusters = 5

# Expected share of anomalous days
contamination = 0.05

# Random seed for clustering and anomaly detection
seed = 42

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
