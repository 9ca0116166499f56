//! Configuration management for tunegate
//!
//! Settings are layered: built-in defaults, then a TOML config file, then
//! environment variables (a `.env` file is honoured by the binary). The TOML
//! representation uses plain seconds and is converted into the `Duration`-typed
//! runtime configs of each component by [`AppConfig::to_runtime_config`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{
    ContextConfig, JanitorConfig, OrchestratorConfig, QuotaConfig, RateLimitConfig,
    SessionConfig, StorageConfig,
};
use crate::constants::{download, env, janitor, limits, quota, session, storage};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Free download allowance
    pub quota: QuotaConfigToml,
    /// Search rate limiting
    pub rate_limit: RateLimitConfigToml,
    /// Session cache lifetimes
    pub session: SessionConfigToml,
    /// Download limits and artifact location
    pub download: DownloadConfigToml,
    /// Background maintenance
    pub janitor: JanitorConfigToml,
    /// Persistence
    pub storage: StorageConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly quota configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfigToml {
    /// Free downloads per user per day
    pub daily_free_limit: u32,
}

impl Default for QuotaConfigToml {
    fn default() -> Self {
        Self {
            daily_free_limit: quota::DEFAULT_DAILY_FREE_LIMIT,
        }
    }
}

/// TOML-friendly rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfigToml {
    /// Searches allowed per window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfigToml {
    fn default() -> Self {
        Self {
            max_requests: limits::DEFAULT_MAX_REQUESTS,
            window_secs: limits::DEFAULT_WINDOW_SECS,
        }
    }
}

/// TOML-friendly session cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfigToml {
    /// Lifetime of cached search results in seconds
    pub search_ttl_secs: u64,
    /// Lifetime of cached chart listings in seconds
    pub chart_ttl_secs: u64,
    /// Lifetime of cached favourites listings in seconds
    pub favorites_ttl_secs: u64,
    /// Number of cache shards
    pub shard_count: usize,
}

impl Default for SessionConfigToml {
    fn default() -> Self {
        Self {
            search_ttl_secs: session::SEARCH_RESULTS_TTL.as_secs(),
            chart_ttl_secs: session::CHART_RESULTS_TTL.as_secs(),
            favorites_ttl_secs: session::FAVORITES_TTL.as_secs(),
            shard_count: session::SHARD_COUNT,
        }
    }
}

/// TOML-friendly download configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfigToml {
    /// Largest deliverable file in bytes
    pub max_file_size_bytes: u64,
    /// Longest track in seconds
    pub max_duration_secs: u32,
    /// Upper bound on one fetch in seconds
    pub fetch_timeout_secs: u64,
    /// Fetch starts per second across all users (0 = unthrottled)
    pub fetch_rate_limit_rps: u32,
    /// Directory for in-flight artifacts
    pub artifact_dir: PathBuf,
}

impl Default for DownloadConfigToml {
    fn default() -> Self {
        Self {
            max_file_size_bytes: download::DEFAULT_MAX_FILE_SIZE_BYTES,
            max_duration_secs: download::DEFAULT_MAX_DURATION_SECS,
            fetch_timeout_secs: download::DEFAULT_FETCH_TIMEOUT.as_secs(),
            fetch_rate_limit_rps: limits::DEFAULT_FETCH_RATE_LIMIT_RPS,
            artifact_dir: PathBuf::from(download::DEFAULT_ARTIFACT_DIR),
        }
    }
}

/// TOML-friendly janitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfigToml {
    /// Seconds between temp sweeps
    pub sweep_interval_secs: u64,
    /// Artifacts older than this many seconds are removed
    pub artifact_max_age_secs: u64,
    /// Local hour (0-23) of the daily chart publish
    pub publish_hour: u32,
    /// Seconds to wait before retrying a failed publish
    pub publish_retry_backoff_secs: u64,
    /// Publish attempts per daily slot
    pub publish_max_attempts: u32,
    /// Directory chart snapshots are written to
    pub publish_dir: PathBuf,
    /// Seconds each task gets to stop at shutdown
    pub shutdown_grace_secs: u64,
}

impl Default for JanitorConfigToml {
    fn default() -> Self {
        Self {
            sweep_interval_secs: janitor::DEFAULT_SWEEP_INTERVAL.as_secs(),
            artifact_max_age_secs: janitor::DEFAULT_ARTIFACT_MAX_AGE.as_secs(),
            publish_hour: janitor::DEFAULT_PUBLISH_HOUR,
            publish_retry_backoff_secs: janitor::PUBLISH_RETRY_BACKOFF.as_secs(),
            publish_max_attempts: janitor::PUBLISH_MAX_ATTEMPTS,
            publish_dir: PathBuf::from(janitor::DEFAULT_PUBLISH_DIR),
            shutdown_grace_secs: janitor::TASK_SHUTDOWN_TIMEOUT.as_secs(),
        }
    }
}

/// TOML-friendly storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfigToml {
    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for StorageConfigToml {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(storage::DEFAULT_DATABASE_PATH),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Runtime configuration of every component
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub context: ContextConfig,
    pub janitor: JanitorConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> RuntimeConfig {
        let orchestrator = OrchestratorConfig {
            max_file_size_bytes: self.download.max_file_size_bytes,
            max_duration_seconds: self.download.max_duration_secs,
            fetch_timeout: Duration::from_secs(self.download.fetch_timeout_secs),
            artifact_dir: self.download.artifact_dir.clone(),
            fetch_rate_limit_rps: self.download.fetch_rate_limit_rps,
        };

        let janitor = JanitorConfig {
            artifact_dir: self.download.artifact_dir.clone(),
            sweep_interval: Duration::from_secs(self.janitor.sweep_interval_secs),
            artifact_max_age: Duration::from_secs(self.janitor.artifact_max_age_secs),
            publish_hour: self.janitor.publish_hour,
            publish_retry_backoff: Duration::from_secs(self.janitor.publish_retry_backoff_secs),
            publish_max_attempts: self.janitor.publish_max_attempts,
            publish_dir: self.janitor.publish_dir.clone(),
            shutdown_grace: Duration::from_secs(self.janitor.shutdown_grace_secs),
        };

        RuntimeConfig {
            context: ContextConfig {
                session: SessionConfig {
                    search_ttl: Duration::from_secs(self.session.search_ttl_secs),
                    chart_ttl: Duration::from_secs(self.session.chart_ttl_secs),
                    favorites_ttl: Duration::from_secs(self.session.favorites_ttl_secs),
                    shard_count: self.session.shard_count.max(1),
                },
                rate_limit: RateLimitConfig::new(
                    self.rate_limit.max_requests,
                    Duration::from_secs(self.rate_limit.window_secs),
                ),
                quota: QuotaConfig {
                    daily_limit: self.quota.daily_free_limit,
                },
                orchestrator,
            },
            janitor,
            storage: StorageConfig {
                database_path: self.storage.database_path.clone(),
            },
        }
    }

    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (explicit path, or the first one found in standard locations)
    /// 3. Environment variables
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(ref path) => Some(path.clone()),
            None => Self::find_config_file(),
        };

        let mut config = match config_path {
            Some(path) if path.exists() => Self::load_from_file(&path).await?,
            Some(path) if config_file_override.is_some() => {
                return Err(ConfigError::NotFound { path });
            }
            _ => Self::default(),
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from environment-style variables
    ///
    /// `lookup` returns the value of a variable, if set.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, env::FREE_DAILY_LIMIT)? {
            self.quota.daily_free_limit = v;
        }
        if let Some(v) = parse_var(&lookup, env::RATE_LIMIT_REQUESTS)? {
            self.rate_limit.max_requests = v;
        }
        if let Some(v) = parse_var(&lookup, env::RATE_LIMIT_PERIOD)? {
            self.rate_limit.window_secs = v;
        }
        if let Some(v) = parse_var(&lookup, env::MAX_FILE_SIZE)? {
            self.download.max_file_size_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, env::MAX_DURATION)? {
            self.download.max_duration_secs = v;
        }
        if let Some(v) = lookup(env::TEMP_DIR) {
            self.download.artifact_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(env::DATABASE_PATH) {
            self.storage.database_path = PathBuf::from(v);
        }
        if let Some(v) = parse_var(&lookup, env::CLEANUP_INTERVAL)? {
            self.janitor.sweep_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, env::CLEANUP_MAX_AGE)? {
            self.janitor.artifact_max_age_secs = v;
        }
        if let Some(v) = parse_var(&lookup, env::CHANNEL_POST_HOUR)? {
            self.janitor.publish_hour = v;
        }
        if let Some(v) = lookup(env::LOG_LEVEL) {
            self.logging.level = v.to_lowercase();
        }
        Ok(())
    }

    /// Validate the whole configuration, reporting every problem at once
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.quota.daily_free_limit == 0 {
            errors.push("quota.daily_free_limit must be greater than zero".to_string());
        }
        if self.rate_limit.max_requests == 0 {
            errors.push("rate_limit.max_requests must be greater than zero".to_string());
        }
        if self.rate_limit.window_secs == 0 {
            errors.push("rate_limit.window_secs must be greater than zero".to_string());
        }
        if self.session.search_ttl_secs == 0
            || self.session.chart_ttl_secs == 0
            || self.session.favorites_ttl_secs == 0
        {
            errors.push("session TTLs must be greater than zero".to_string());
        }
        if !matches!(
            self.logging.level.as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            errors.push(format!("logging.level '{}' is not a log level", self.logging.level));
        }

        let runtime = self.to_runtime_config();
        if let Err(e) = runtime.context.orchestrator.validate() {
            errors.push(e);
        }
        if let Err(e) = runtime.janitor.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }

    /// Initialize configuration on first run
    ///
    /// Creates a default config file if none exists and notifies the user
    pub async fn initialize_first_run() -> ConfigResult<Option<PathBuf>> {
        let Some(config_path) = Self::get_default_config_path() else {
            debug!("No user config directory, skipping first-run config");
            return Ok(None);
        };

        if config_path.exists() {
            return Ok(Some(config_path));
        }

        info!("Creating default configuration file...");
        Self::write_default_config(&config_path).await?;

        println!("📁 Created default configuration file:");
        println!("   {}", config_path.display());
        println!("   You can customize settings by editing this file.");
        println!();

        Ok(Some(config_path))
    }

    /// Write the commented default configuration to `path`
    pub async fn write_default_config(path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(path, Self::generate_default_config_content())
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![
            PathBuf::from("./tunegate.toml"),
            PathBuf::from("./config.toml"),
        ];
        search_paths.extend(Self::get_default_config_path());

        let found = search_paths.into_iter().find(|path| path.exists());
        match &found {
            Some(path) => debug!("Found config file: {}", path.display()),
            None => debug!("No config file found in standard locations"),
        }
        found
    }

    /// Default config file path for the current user
    pub fn get_default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tunegate").join("config.toml"))
    }

    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    fn generate_default_config_content() -> String {
        format!(
            r#"# tunegate configuration
# Generated on first run. Environment variables (or a .env file) override
# anything set here.

[quota]
# Free downloads per user per day (FREE_DAILY_LIMIT)
daily_free_limit = {daily}

[rate_limit]
# Searches per user per window (RATE_LIMIT_REQUESTS / RATE_LIMIT_PERIOD)
max_requests = {requests}
window_secs = {window}

[session]
# How long search results stay selectable
search_ttl_secs = {search_ttl}
chart_ttl_secs = {chart_ttl}
favorites_ttl_secs = {favorites_ttl}
shard_count = {shards}

[download]
# 50MB is the bot API upload limit (MAX_FILE_SIZE)
max_file_size_bytes = {max_size}
# Longest track in seconds (MAX_DURATION)
max_duration_secs = {max_duration}
fetch_timeout_secs = {fetch_timeout}
# Fetch starts per second across all users, 0 disables
fetch_rate_limit_rps = {fetch_rps}
# Working directory for downloads (TEMP_DIR)
artifact_dir = "{artifact_dir}"

[janitor]
# Temp sweep (CLEANUP_INTERVAL / CLEANUP_MAX_AGE)
sweep_interval_secs = {sweep}
artifact_max_age_secs = {max_age}
# Local hour of the daily chart publish (CHANNEL_POST_HOUR)
publish_hour = {hour}
publish_retry_backoff_secs = {backoff}
publish_max_attempts = {attempts}
publish_dir = "{publish_dir}"
shutdown_grace_secs = {grace}

[storage]
# SQLite database (DATABASE_PATH)
database_path = "{database}"

[logging]
level = "info"  # error, warn, info, debug, trace (LOG_LEVEL)
"#,
            daily = quota::DEFAULT_DAILY_FREE_LIMIT,
            requests = limits::DEFAULT_MAX_REQUESTS,
            window = limits::DEFAULT_WINDOW_SECS,
            search_ttl = session::SEARCH_RESULTS_TTL.as_secs(),
            chart_ttl = session::CHART_RESULTS_TTL.as_secs(),
            favorites_ttl = session::FAVORITES_TTL.as_secs(),
            shards = session::SHARD_COUNT,
            max_size = download::DEFAULT_MAX_FILE_SIZE_BYTES,
            max_duration = download::DEFAULT_MAX_DURATION_SECS,
            fetch_timeout = download::DEFAULT_FETCH_TIMEOUT.as_secs(),
            fetch_rps = limits::DEFAULT_FETCH_RATE_LIMIT_RPS,
            artifact_dir = download::DEFAULT_ARTIFACT_DIR,
            sweep = janitor::DEFAULT_SWEEP_INTERVAL.as_secs(),
            max_age = janitor::DEFAULT_ARTIFACT_MAX_AGE.as_secs(),
            hour = janitor::DEFAULT_PUBLISH_HOUR,
            backoff = janitor::PUBLISH_RETRY_BACKOFF.as_secs(),
            attempts = janitor::PUBLISH_MAX_ATTEMPTS,
            publish_dir = janitor::DEFAULT_PUBLISH_DIR,
            grace = janitor::TASK_SHUTDOWN_TIMEOUT.as_secs(),
            database = storage::DEFAULT_DATABASE_PATH,
        )
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };

    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            field: name.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}
