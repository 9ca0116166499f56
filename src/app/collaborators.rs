//! Contracts of the external collaborators the coordination layer drives
//!
//! The fetcher, the transport and the publisher live outside this crate; the
//! persistence contract is implemented by [`crate::app::storage`]. All traits are
//! object safe so the application context can hold them as `Arc<dyn ...>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::app::models::{
    DeliveryId, DeliveryMetadata, DownloadRecord, Period, PremiumStatus, TopTrack, UserId,
};
use crate::errors::{DeliveryFailure, FetchFailure, SchedulerResult, StorageResult};

/// Parameters of a single fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Platform video id
    pub track_id: String,
    /// Path prefix the fetcher must write under; the extension is the fetcher's choice
    pub artifact_stem: PathBuf,
    /// Results larger than this must be rejected with `TooLarge`
    pub max_file_size_bytes: u64,
    /// Sources longer than this must be rejected with `TooLarge`
    pub max_duration_seconds: u32,
}

/// Retrieves and transcodes a track into a local audio file
///
/// Implementations delete any partial output before returning an error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the track, returning the path of the produced file
    async fn fetch(&self, request: &FetchRequest) -> Result<PathBuf, FetchFailure>;
}

/// Delivers an audio file to a user
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(
        &self,
        user_id: UserId,
        file: &Path,
        metadata: &DeliveryMetadata,
    ) -> Result<DeliveryId, DeliveryFailure>;
}

/// Persistent counters and download history
///
/// `increment_daily_count` and `consume_bonus_credit` must be atomic at the storage
/// layer: more than one process may update the same user concurrently.
#[async_trait]
pub trait DownloadStore: Send + Sync {
    /// Append a completed download to the history
    async fn record_download(&self, record: &DownloadRecord) -> StorageResult<()>;

    /// Upsert-increment the user's counter for `date`, returning the new count
    async fn increment_daily_count(&self, user_id: UserId, date: NaiveDate) -> StorageResult<u32>;

    /// Downloads counted for the user on `date` (0 when none)
    async fn get_daily_count(&self, user_id: UserId, date: NaiveDate) -> StorageResult<u32>;

    /// Current bonus credit balance
    async fn get_bonus_credits(&self, user_id: UserId) -> StorageResult<u32>;

    /// Decrement the bonus balance if it is positive; `false` when it was already zero
    async fn consume_bonus_credit(&self, user_id: UserId) -> StorageResult<bool>;

    /// Stored premium flags
    async fn get_premium_status(&self, user_id: UserId) -> StorageResult<PremiumStatus>;

    /// Add bonus credits, returning the new balance
    async fn add_bonus_credits(&self, user_id: UserId, amount: u32) -> StorageResult<u32>;

    /// Grant premium until `until`, or for life with `None`
    async fn set_premium(
        &self,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;

    /// Most downloaded tracks within `period`, most popular first
    async fn top_tracks(&self, period: Period, limit: usize) -> StorageResult<Vec<TopTrack>>;
}

/// Publishes a download chart somewhere users can see it
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_top(&self, period: Period) -> SchedulerResult<()>;
}
