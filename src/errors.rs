//! Error types for tunegate
//!
//! This module defines the error taxonomy for every component of the admission and
//! download coordination layer. Collaborators raise typed failures
//! ([`FetchFailure`], [`DeliveryFailure`], [`StorageError`]); the download
//! orchestrator is the only place that translates them into a user-facing
//! [`DownloadError`].

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the fetcher collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Result exceeds the configured size or duration limit
    #[error("Track exceeds download limits: {reason}")]
    TooLarge { reason: String },

    /// Source video was removed or is otherwise unavailable
    #[error("Track is unavailable")]
    Unavailable,

    /// Source video is private
    #[error("Track is private")]
    Private,

    /// Source video is not available in the fetcher's region
    #[error("Track is blocked in this region")]
    GeoBlocked,

    /// Source video was taken down on copyright grounds
    #[error("Track is blocked on copyright grounds")]
    CopyrightBlocked,

    /// Anything the fetcher could not classify
    #[error("Fetch failed: {0}")]
    Unknown(String),
}

impl FetchFailure {
    /// Short machine-friendly name of the failure subtype
    pub fn kind(&self) -> &'static str {
        match self {
            FetchFailure::TooLarge { .. } => "too_large",
            FetchFailure::Unavailable => "unavailable",
            FetchFailure::Private => "private",
            FetchFailure::GeoBlocked => "geo_blocked",
            FetchFailure::CopyrightBlocked => "copyright_blocked",
            FetchFailure::Unknown(_) => "unknown",
        }
    }
}

/// Failure raised by the transport collaborator when delivery to the user fails
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Delivery failed: {reason}")]
pub struct DeliveryFailure {
    pub reason: String,
}

impl DeliveryFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Persistence errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite driver error
    #[error("Database error")]
    Sqlite(#[from] rusqlite::Error),

    /// Blocking database task panicked or was cancelled
    #[error("Database task failed: {0}")]
    TaskFailed(String),

    /// I/O error while preparing the database location
    #[error("Storage I/O error")]
    Io(#[from] std::io::Error),

    /// Stored value could not be interpreted
    #[error("Corrupt stored value in {field}: {value}")]
    CorruptValue { field: String, value: String },

    /// Database connection lock was poisoned by a panicking task
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

/// Outcomes of a download orchestration other than success
///
/// Every variant leaves quota untouched, writes no download record and leaves no
/// artifact on disk.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Session data referenced by the selection is absent or expired
    #[error("Search results expired")]
    CacheExpired,

    /// Selected position is outside the cached result set
    #[error("Invalid selection {position}: {available} results available")]
    InvalidSelection { position: usize, available: usize },

    /// Eligibility check failed before any fetch attempt
    #[error("Download quota exhausted (daily limit {daily_limit})")]
    QuotaExceeded { daily_limit: u32 },

    /// Another selection for the same user is still being processed
    #[error("A download for this user is already in progress")]
    AlreadyInProgress,

    /// Fetcher collaborator failed
    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    /// Fetch succeeded but delivery to the user failed
    #[error(transparent)]
    Delivery(#[from] DeliveryFailure),

    /// Unexpected fault before delivery
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for DownloadError {
    fn from(error: StorageError) -> Self {
        DownloadError::Internal(error.to_string())
    }
}

impl DownloadError {
    /// Whether the user can sensibly try again (possibly after re-searching)
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DownloadError::Delivery(_) | DownloadError::Internal(_))
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            DownloadError::CacheExpired => "cache_expired",
            DownloadError::InvalidSelection { .. } => "invalid_selection",
            DownloadError::QuotaExceeded { .. } => "quota_exceeded",
            DownloadError::AlreadyInProgress => "in_progress",
            DownloadError::Fetch(_) => "fetch",
            DownloadError::Delivery(_) => "delivery",
            DownloadError::Internal(_) => "internal",
        }
    }

    /// Actionable guidance to show the requester
    pub fn user_message(&self) -> String {
        match self {
            DownloadError::CacheExpired => {
                "Search results have expired. Please search again.".to_string()
            }
            DownloadError::InvalidSelection { available, .. } => {
                format!("Invalid track number. Choose between 1 and {}.", available)
            }
            DownloadError::QuotaExceeded { daily_limit } => format!(
                "Download limit reached: {} free tracks per day. The limit resets at midnight, or upgrade to premium for unlimited downloads.",
                daily_limit
            ),
            DownloadError::AlreadyInProgress => {
                "Your previous track is still downloading. Please wait for it to finish."
                    .to_string()
            }
            DownloadError::Fetch(FetchFailure::TooLarge { .. }) => {
                "This track is too large to send. Try a shorter track.".to_string()
            }
            DownloadError::Fetch(
                FetchFailure::Unavailable | FetchFailure::Private | FetchFailure::GeoBlocked,
            ) => "This track is not available. It may have been removed or restricted. Try another one."
                .to_string(),
            DownloadError::Fetch(FetchFailure::CopyrightBlocked) => {
                "This track is blocked by its rights holder. Try another one.".to_string()
            }
            DownloadError::Fetch(FetchFailure::Unknown(_)) => {
                "Download failed. The track may be unavailable, try another one.".to_string()
            }
            DownloadError::Delivery(_) => {
                "The track could not be sent. Please try again.".to_string()
            }
            DownloadError::Internal(_) => {
                "Unexpected error. Please try again or run a new search.".to_string()
            }
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Failed to serialize configuration")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<String> },

    /// Reading or writing the configuration file failed
    #[error("Configuration file I/O error: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Background scheduler errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Publish action failed
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Artifact directory could not be scanned
    #[error("Failed to scan artifact directory {path}")]
    SweepFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Storage error while building the published chart
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Chart snapshot could not be serialized
    #[error("Failed to serialize chart snapshot")]
    Serialize(#[from] serde_json::Error),

    /// I/O error while writing the published chart
    #[error("Publish I/O error")]
    Io(#[from] std::io::Error),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Download orchestration error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Persistence error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Scheduler error
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Download(e) => e.is_retryable(),
            AppError::Storage(StorageError::Sqlite(_))
            | AppError::Storage(StorageError::TaskFailed(_))
            | AppError::Scheduler(SchedulerError::PublishFailed(_)) => true,

            AppError::Config(_) | AppError::Storage(StorageError::CorruptValue { .. }) => false,

            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Download(_) => "download",
            AppError::Storage(_) => "storage",
            AppError::Config(_) => "config",
            AppError::Scheduler(_) => "scheduler",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Download orchestration result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Storage result type alias
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Scheduler result type alias
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_failures_are_retryable_and_delivery_is_not() {
        let fetch = DownloadError::from(FetchFailure::GeoBlocked);
        assert!(fetch.is_retryable());
        assert_eq!(fetch.category(), "fetch");

        let delivery = DownloadError::from(DeliveryFailure::new("chat not found"));
        assert!(!delivery.is_retryable());
        assert_eq!(delivery.category(), "delivery");
    }

    #[test]
    fn test_storage_error_maps_to_internal() {
        let error: DownloadError = StorageError::LockPoisoned.into();
        assert!(matches!(error, DownloadError::Internal(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_user_messages_are_actionable() {
        let expired = DownloadError::CacheExpired.user_message();
        assert!(expired.contains("search again"));

        let invalid = DownloadError::InvalidSelection {
            position: 12,
            available: 10,
        }
        .user_message();
        assert!(invalid.contains("between 1 and 10"));

        let quota = DownloadError::QuotaExceeded { daily_limit: 10 }.user_message();
        assert!(quota.contains("10 free tracks"));
    }

    #[test]
    fn test_app_error_category() {
        let app_error = AppError::from(DownloadError::CacheExpired);
        assert_eq!(app_error.category(), "download");
        assert!(app_error.is_recoverable());

        let config_error = AppError::from(ConfigError::ValidationFailed { errors: vec![] });
        assert_eq!(config_error.category(), "config");
        assert!(!config_error.is_recoverable());
    }

    #[test]
    fn test_fetch_failure_kind() {
        assert_eq!(FetchFailure::Private.kind(), "private");
        assert_eq!(
            FetchFailure::TooLarge {
                reason: "60MB".to_string()
            }
            .kind(),
            "too_large"
        );
    }
}
