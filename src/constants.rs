//! Application constants for tunegate
//!
//! This module centralizes the defaults and fixed values used throughout the
//! application, organized by functional domain.

use std::time::Duration;

/// Environment variable names for configuration overrides
pub mod env {
    /// Free downloads per user per day
    pub const FREE_DAILY_LIMIT: &str = "FREE_DAILY_LIMIT";

    /// Maximum searches per rate-limit window
    pub const RATE_LIMIT_REQUESTS: &str = "RATE_LIMIT_REQUESTS";

    /// Rate-limit window in seconds
    pub const RATE_LIMIT_PERIOD: &str = "RATE_LIMIT_PERIOD";

    /// Maximum artifact size in bytes
    pub const MAX_FILE_SIZE: &str = "MAX_FILE_SIZE";

    /// Maximum track duration in seconds
    pub const MAX_DURATION: &str = "MAX_DURATION";

    /// Artifact (temp) directory
    pub const TEMP_DIR: &str = "TEMP_DIR";

    /// SQLite database path
    pub const DATABASE_PATH: &str = "DATABASE_PATH";

    /// Temp sweep interval in seconds
    pub const CLEANUP_INTERVAL: &str = "CLEANUP_INTERVAL";

    /// Maximum artifact age in seconds
    pub const CLEANUP_MAX_AGE: &str = "CLEANUP_MAX_AGE";

    /// Hour of day (0-23) for the scheduled chart publish
    pub const CHANNEL_POST_HOUR: &str = "CHANNEL_POST_HOUR";

    /// Log level
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
}

/// Session cache defaults
pub mod session {
    use super::Duration;

    /// TTL for cached search results (10 minutes)
    pub const SEARCH_RESULTS_TTL: Duration = Duration::from_secs(600);

    /// TTL for cached chart listings (1 hour)
    pub const CHART_RESULTS_TTL: Duration = Duration::from_secs(3600);

    /// TTL for cached favourites listings (10 minutes)
    pub const FAVORITES_TTL: Duration = Duration::from_secs(600);

    /// Number of independently locked shards
    pub const SHARD_COUNT: usize = 16;

    /// Tracks shown per results page
    pub const PAGE_SIZE: usize = 10;
}

/// Request rate limiting defaults
pub mod limits {
    /// Searches allowed per window
    pub const DEFAULT_MAX_REQUESTS: u32 = 5;

    /// Window length in seconds
    pub const DEFAULT_WINDOW_SECS: u64 = 60;

    /// Smallest wait ever reported to a rejected requester
    pub const MIN_WAIT_SECS: u64 = 1;

    /// Outbound fetch starts per second (0 = unthrottled)
    pub const DEFAULT_FETCH_RATE_LIMIT_RPS: u32 = 2;
}

/// Download quota defaults
pub mod quota {
    /// Free downloads per user per day
    pub const DEFAULT_DAILY_FREE_LIMIT: u32 = 10;

    /// Sentinel for unlimited remaining downloads (premium)
    pub const UNLIMITED: i64 = -1;
}

/// Download orchestration defaults
pub mod download {
    use super::Duration;

    /// Maximum artifact size (50MB, the bot API upload limit)
    pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024;

    /// Maximum track duration (10 minutes)
    pub const DEFAULT_MAX_DURATION_SECS: u32 = 600;

    /// Timeout for a single fetch
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

    /// Default artifact directory
    pub const DEFAULT_ARTIFACT_DIR: &str = "./data/temp";
}

/// Janitor scheduler defaults
pub mod janitor {
    use super::Duration;

    /// Temp sweep interval (1 hour)
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

    /// Artifacts older than this are removed (1 hour)
    pub const DEFAULT_ARTIFACT_MAX_AGE: Duration = Duration::from_secs(3600);

    /// Local hour of the daily chart publish
    pub const DEFAULT_PUBLISH_HOUR: u32 = 12;

    /// Back-off after a failed publish (5 minutes)
    pub const PUBLISH_RETRY_BACKOFF: Duration = Duration::from_secs(300);

    /// Publish attempts per scheduled slot
    pub const PUBLISH_MAX_ATTEMPTS: u32 = 3;

    /// Grace period for each background task at shutdown
    pub const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

    /// Tracks included in a published chart
    pub const CHART_SIZE: usize = 10;

    /// Default directory for published chart snapshots
    pub const DEFAULT_PUBLISH_DIR: &str = "./data/charts";
}

/// Persistence defaults
pub mod storage {
    /// Default SQLite database path
    pub const DEFAULT_DATABASE_PATH: &str = "./data/database.db";

    /// Date format used for daily counter keys
    pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";
}

// Re-export commonly used constants at module level for convenience
pub use download::{DEFAULT_MAX_DURATION_SECS, DEFAULT_MAX_FILE_SIZE_BYTES};
pub use limits::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECS};
pub use quota::DEFAULT_DAILY_FREE_LIMIT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bot_limits() {
        assert_eq!(DEFAULT_MAX_REQUESTS, 5);
        assert_eq!(DEFAULT_WINDOW_SECS, 60);
        assert_eq!(DEFAULT_MAX_FILE_SIZE_BYTES, 52_428_800);
        assert_eq!(DEFAULT_MAX_DURATION_SECS, 600);
    }

    #[test]
    fn test_janitor_defaults() {
        assert!(janitor::DEFAULT_PUBLISH_HOUR < 24);
        assert_eq!(janitor::PUBLISH_RETRY_BACKOFF, Duration::from_secs(300));
        assert!(janitor::TASK_SHUTDOWN_TIMEOUT < janitor::DEFAULT_SWEEP_INTERVAL);
    }
}
