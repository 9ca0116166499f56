//! Data models for tunegate
//!
//! This module contains the core data structures shared by the session cache, the
//! quota coordinator, the download orchestrator and the persistence layer.

use std::fmt;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a bot user (chat platforms hand out signed 64-bit ids)
pub type UserId = i64;

/// A search result as presented to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Platform video id
    pub id: String,
    /// Song title
    pub title: String,
    /// Artist name
    pub artist: String,
    /// Duration in seconds (0 when unknown)
    pub duration_seconds: u32,
    /// Source URL
    pub url: String,
}

impl Track {
    /// Create a track with an unknown artist placeholder and no URL
    pub fn new(id: impl Into<String>, title: impl Into<String>, duration_seconds: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: "Unknown".to_string(),
            duration_seconds,
            url: String::new(),
        }
    }

    /// Set the artist name
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    /// Duration as `M:SS`
    pub fn formatted_duration(&self) -> String {
        format!(
            "{}:{:02}",
            self.duration_seconds / 60,
            self.duration_seconds % 60
        )
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({})",
            self.artist,
            self.title,
            self.formatted_duration()
        )
    }
}

/// Cached search context for one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSession {
    /// Query text the results came from
    pub query: String,
    /// Ordered results; selections are 1-based positions into this list
    pub tracks: Vec<Track>,
}

/// Which allowance pays for a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsumptionPath {
    /// Active premium subscription; nothing is consumed
    Premium,
    /// Free daily counter
    Daily,
    /// Single-use bonus credit
    Bonus,
}

impl fmt::Display for ConsumptionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsumptionPath::Premium => "premium",
            ConsumptionPath::Daily => "daily",
            ConsumptionPath::Bonus => "bonus",
        };
        f.write_str(name)
    }
}

/// Ephemeral unit of work created at selection time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub duration_seconds: u32,
    pub path: ConsumptionPath,
}

impl DownloadJob {
    pub fn new(track: &Track, path: ConsumptionPath) -> Self {
        Self {
            track_id: track.id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            duration_seconds: track.duration_seconds,
            path,
        }
    }

    /// Metadata handed to the transport alongside the file
    pub fn delivery_metadata(&self) -> DeliveryMetadata {
        DeliveryMetadata {
            title: self.title.clone(),
            artist: self.artist.clone(),
            duration_seconds: self.duration_seconds,
        }
    }

    /// History row written after confirmed delivery
    pub fn record(&self, user_id: UserId) -> DownloadRecord {
        DownloadRecord {
            user_id,
            track_id: self.track_id.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            duration_seconds: self.duration_seconds,
        }
    }
}

/// Metadata attached to a delivered audio file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryMetadata {
    pub title: String,
    pub artist: String,
    pub duration_seconds: u32,
}

/// Identifier returned by the transport for a delivered message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryId(pub String);

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A completed download as persisted in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub user_id: UserId,
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub duration_seconds: u32,
}

/// Stored premium flags for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PremiumStatus {
    /// Premium flag as stored
    pub is_premium: bool,
    /// Expiry; `None` means no expiry
    pub until: Option<DateTime<Utc>>,
}

impl PremiumStatus {
    /// Premium with no expiry
    pub fn lifetime() -> Self {
        Self {
            is_premium: true,
            until: None,
        }
    }

    /// Premium until the given instant
    pub fn until(until: DateTime<Utc>) -> Self {
        Self {
            is_premium: true,
            until: Some(until),
        }
    }

    /// Whether premium is in effect at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.until.map_or(true, |until| until > now)
    }
}

/// Quota counters for one user, derived from persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    pub daily_count: u32,
    pub bonus_credits: u32,
    pub is_premium: bool,
    pub premium_until: Option<DateTime<Utc>>,
}

impl QuotaState {
    pub fn premium(&self) -> PremiumStatus {
        PremiumStatus {
            is_premium: self.is_premium,
            until: self.premium_until,
        }
    }
}

/// Aggregation period for download charts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
    All,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::All => "all",
        }
    }

    /// Start of the period ending at `now`, `None` for all time
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Period::Day => Some(now - ChronoDuration::days(1)),
            Period::Week => Some(now - ChronoDuration::days(7)),
            Period::Month => Some(now - ChronoDuration::days(30)),
            Period::All => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chart entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopTrack {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub download_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_duration() {
        let track = Track::new("abc", "Song", 185).with_artist("Band");
        assert_eq!(track.formatted_duration(), "3:05");
        assert_eq!(track.to_string(), "Band - Song (3:05)");
    }

    #[test]
    fn test_premium_activity() {
        let now = Utc::now();
        assert!(PremiumStatus::lifetime().is_active_at(now));
        assert!(PremiumStatus::until(now + ChronoDuration::days(1)).is_active_at(now));
        assert!(!PremiumStatus::until(now - ChronoDuration::seconds(1)).is_active_at(now));
        assert!(!PremiumStatus::default().is_active_at(now));
    }

    #[test]
    fn test_job_carries_track_metadata() {
        let track = Track::new("vid1", "Title", 200).with_artist("Artist");
        let job = DownloadJob::new(&track, ConsumptionPath::Bonus);

        let record = job.record(42);
        assert_eq!(record.user_id, 42);
        assert_eq!(record.track_id, "vid1");
        assert_eq!(job.delivery_metadata().duration_seconds, 200);
    }

    #[test]
    fn test_period_bounds() {
        let now = Utc::now();
        assert_eq!(Period::Week.since(now), Some(now - ChronoDuration::days(7)));
        assert_eq!(Period::All.since(now), None);
        assert_eq!(Period::Day.to_string(), "day");
    }
}
