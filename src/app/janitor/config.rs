//! Configuration for the background maintenance tasks

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{download, janitor};

/// Configuration for the janitor scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Directory scanned by the temp sweep
    pub artifact_dir: PathBuf,
    /// Time between sweeps
    pub sweep_interval: Duration,
    /// Files last modified longer ago than this are removed
    pub artifact_max_age: Duration,
    /// Local hour of day (0-23) of the scheduled publish
    pub publish_hour: u32,
    /// Wait before retrying a failed publish
    pub publish_retry_backoff: Duration,
    /// Publish attempts per scheduled slot before waiting for the next day
    pub publish_max_attempts: u32,
    /// Directory chart snapshots are written to
    pub publish_dir: PathBuf,
    /// How long each task gets to stop at shutdown
    pub shutdown_grace: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from(download::DEFAULT_ARTIFACT_DIR),
            sweep_interval: janitor::DEFAULT_SWEEP_INTERVAL,
            artifact_max_age: janitor::DEFAULT_ARTIFACT_MAX_AGE,
            publish_hour: janitor::DEFAULT_PUBLISH_HOUR,
            publish_retry_backoff: janitor::PUBLISH_RETRY_BACKOFF,
            publish_max_attempts: janitor::PUBLISH_MAX_ATTEMPTS,
            publish_dir: PathBuf::from(janitor::DEFAULT_PUBLISH_DIR),
            shutdown_grace: janitor::TASK_SHUTDOWN_TIMEOUT,
        }
    }
}

impl JanitorConfig {
    /// Set the directory scanned by the temp sweep
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    /// Set sweep interval and maximum artifact age
    pub fn with_sweep(mut self, interval: Duration, max_age: Duration) -> Self {
        self.sweep_interval = interval;
        self.artifact_max_age = max_age;
        self
    }

    /// Set the publish hour
    pub fn with_publish_hour(mut self, hour: u32) -> Self {
        self.publish_hour = hour;
        self
    }

    /// Set the publish retry back-off
    pub fn with_publish_retry_backoff(mut self, backoff: Duration) -> Self {
        self.publish_retry_backoff = backoff;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_interval.is_zero() {
            return Err("Sweep interval cannot be zero".to_string());
        }

        if self.artifact_max_age.is_zero() {
            return Err("Artifact max age cannot be zero".to_string());
        }

        if self.publish_hour > 23 {
            return Err(format!(
                "Publish hour must be between 0 and 23, got {}",
                self.publish_hour
            ));
        }

        if self.publish_retry_backoff.is_zero() {
            return Err("Publish retry back-off cannot be zero".to_string());
        }

        if self.publish_max_attempts == 0 {
            return Err("Publish attempts cannot be zero".to_string());
        }

        Ok(())
    }
}
