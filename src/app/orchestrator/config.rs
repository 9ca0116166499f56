//! Configuration for the download orchestrator

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{download, limits};

/// Configuration for the download orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Largest artifact that may be delivered
    pub max_file_size_bytes: u64,
    /// Longest track that may be fetched
    pub max_duration_seconds: u32,
    /// Upper bound on a single fetch
    pub fetch_timeout: Duration,
    /// Directory that holds artifacts while they are owned by a download
    pub artifact_dir: PathBuf,
    /// Fetch starts per second across all users (0 disables throttling)
    pub fetch_rate_limit_rps: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: download::DEFAULT_MAX_FILE_SIZE_BYTES,
            max_duration_seconds: download::DEFAULT_MAX_DURATION_SECS,
            fetch_timeout: download::DEFAULT_FETCH_TIMEOUT,
            artifact_dir: PathBuf::from(download::DEFAULT_ARTIFACT_DIR),
            fetch_rate_limit_rps: limits::DEFAULT_FETCH_RATE_LIMIT_RPS,
        }
    }
}

impl OrchestratorConfig {
    /// Set the artifact directory
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    /// Set the size and duration limits
    pub fn with_limits(mut self, max_file_size_bytes: u64, max_duration_seconds: u32) -> Self {
        self.max_file_size_bytes = max_file_size_bytes;
        self.max_duration_seconds = max_duration_seconds;
        self
    }

    /// Set the fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the outbound fetch rate (0 disables throttling)
    pub fn with_fetch_rate_limit(mut self, rps: u32) -> Self {
        self.fetch_rate_limit_rps = rps;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_file_size_bytes == 0 {
            return Err("Maximum file size cannot be zero".to_string());
        }

        if self.max_duration_seconds == 0 {
            return Err("Maximum duration cannot be zero".to_string());
        }

        if self.fetch_timeout.is_zero() {
            return Err("Fetch timeout cannot be zero".to_string());
        }

        if self.artifact_dir.as_os_str().is_empty() {
            return Err("Artifact directory cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that default configuration is valid
    ///
    /// Defaults follow the bot API upload limit and a ten minute track cap.
    #[test]
    fn test_default_config_is_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_file_size_bytes, 50 * 1024 * 1024);
        assert_eq!(config.max_duration_seconds, 600);
    }

    #[test]
    fn test_config_validation() {
        let config = OrchestratorConfig::default().with_limits(0, 600);
        assert!(config.validate().is_err());

        let config = OrchestratorConfig::default().with_fetch_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = OrchestratorConfig::default().with_artifact_dir("");
        assert!(config.validate().is_err());
    }
}
