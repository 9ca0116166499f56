//! In-process download store
//!
//! Keeps every counter behind a single mutex, so each trait call is atomic with
//! respect to the others. Useful for tests and for running without a database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::app::collaborators::DownloadStore;
use crate::app::models::{DownloadRecord, Period, PremiumStatus, TopTrack, UserId};
use crate::errors::{StorageError, StorageResult};

#[derive(Debug, Default)]
struct UserRow {
    bonus_credits: u32,
    premium: PremiumStatus,
    downloads: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<UserId, UserRow>,
    daily: HashMap<(UserId, NaiveDate), u32>,
    history: Vec<(DownloadRecord, DateTime<Utc>)>,
}

/// Mutex-guarded in-memory implementation of [`DownloadStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Seed the daily counter for a user
    pub fn set_daily_count(&self, user_id: UserId, date: NaiveDate, count: u32) -> StorageResult<()> {
        self.lock()?.daily.insert((user_id, date), count);
        Ok(())
    }

    /// Every recorded download, oldest first
    pub fn records(&self) -> StorageResult<Vec<DownloadRecord>> {
        Ok(self
            .lock()?
            .history
            .iter()
            .map(|(record, _)| record.clone())
            .collect())
    }

    /// Lifetime download count of a user
    pub fn lifetime_downloads(&self, user_id: UserId) -> StorageResult<u64> {
        Ok(self.lock()?.users.get(&user_id).map_or(0, |row| row.downloads))
    }
}

#[async_trait]
impl DownloadStore for MemoryStore {
    async fn record_download(&self, record: &DownloadRecord) -> StorageResult<()> {
        let mut state = self.lock()?;
        state.users.entry(record.user_id).or_default().downloads += 1;
        state.history.push((record.clone(), Utc::now()));
        Ok(())
    }

    async fn increment_daily_count(&self, user_id: UserId, date: NaiveDate) -> StorageResult<u32> {
        let mut state = self.lock()?;
        let count = state.daily.entry((user_id, date)).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn get_daily_count(&self, user_id: UserId, date: NaiveDate) -> StorageResult<u32> {
        Ok(self.lock()?.daily.get(&(user_id, date)).copied().unwrap_or(0))
    }

    async fn get_bonus_credits(&self, user_id: UserId) -> StorageResult<u32> {
        Ok(self
            .lock()?
            .users
            .get(&user_id)
            .map_or(0, |row| row.bonus_credits))
    }

    async fn consume_bonus_credit(&self, user_id: UserId) -> StorageResult<bool> {
        let mut state = self.lock()?;
        match state.users.get_mut(&user_id) {
            Some(row) if row.bonus_credits > 0 => {
                row.bonus_credits -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_premium_status(&self, user_id: UserId) -> StorageResult<PremiumStatus> {
        Ok(self
            .lock()?
            .users
            .get(&user_id)
            .map(|row| row.premium)
            .unwrap_or_default())
    }

    async fn add_bonus_credits(&self, user_id: UserId, amount: u32) -> StorageResult<u32> {
        let mut state = self.lock()?;
        let row = state.users.entry(user_id).or_default();
        row.bonus_credits = row.bonus_credits.saturating_add(amount);
        Ok(row.bonus_credits)
    }

    async fn set_premium(&self, user_id: UserId, until: Option<DateTime<Utc>>) -> StorageResult<()> {
        let mut state = self.lock()?;
        state.users.entry(user_id).or_default().premium = PremiumStatus {
            is_premium: true,
            until,
        };
        Ok(())
    }

    async fn top_tracks(&self, period: Period, limit: usize) -> StorageResult<Vec<TopTrack>> {
        let since = period.since(Utc::now());
        let state = self.lock()?;

        let mut counts: HashMap<&str, TopTrack> = HashMap::new();
        for (record, at) in &state.history {
            if since.map_or(false, |since| *at < since) {
                continue;
            }
            let entry = counts
                .entry(record.track_id.as_str())
                .or_insert_with(|| TopTrack {
                    track_id: record.track_id.clone(),
                    title: record.title.clone(),
                    artist: record.artist.clone(),
                    download_count: 0,
                });
            entry.download_count += 1;
        }

        let mut chart: Vec<TopTrack> = counts.into_values().collect();
        chart.sort_by(|a, b| {
            b.download_count
                .cmp(&a.download_count)
                .then_with(|| a.track_id.cmp(&b.track_id))
        });
        chart.truncate(limit);
        Ok(chart)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn record(user_id: UserId, track_id: &str) -> DownloadRecord {
        DownloadRecord {
            user_id,
            track_id: track_id.to_string(),
            title: format!("Title {}", track_id),
            artist: "Artist".to_string(),
            duration_seconds: 180,
        }
    }

    #[tokio::test]
    async fn test_daily_counter_is_keyed_by_date() {
        let store = MemoryStore::new();
        let monday = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2024, 5, 7).unwrap();

        assert_eq!(store.increment_daily_count(1, monday).await.unwrap(), 1);
        assert_eq!(store.increment_daily_count(1, monday).await.unwrap(), 2);
        assert_eq!(store.get_daily_count(1, tuesday).await.unwrap(), 0);
        assert_eq!(store.get_daily_count(2, monday).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_bonus_consumption_never_goes_negative() {
        let store = Arc::new(MemoryStore::new());
        store.add_bonus_credits(5, 1).await.unwrap();

        let a = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.consume_bonus_credit(5).await.unwrap() }
        });
        let b = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.consume_bonus_credit(5).await.unwrap() }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert!(a ^ b, "exactly one consumption must succeed");
        assert_eq!(store.get_bonus_credits(5).await.unwrap(), 0);
        assert!(!store.consume_bonus_credit(5).await.unwrap());
    }

    #[tokio::test]
    async fn test_top_tracks_orders_by_count() {
        let store = MemoryStore::new();
        for track in ["b", "a", "b", "c", "b", "a"] {
            store.record_download(&record(1, track)).await.unwrap();
        }

        let chart = store.top_tracks(Period::Day, 2).await.unwrap();
        let ids: Vec<_> = chart.iter().map(|t| t.track_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(chart[0].download_count, 3);
        assert_eq!(store.lifetime_downloads(1).unwrap(), 6);
    }

    #[tokio::test]
    async fn test_unknown_user_defaults() {
        let store = MemoryStore::new();
        assert_eq!(store.get_bonus_credits(9).await.unwrap(), 0);
        assert!(!store.consume_bonus_credit(9).await.unwrap());
        assert_eq!(store.get_premium_status(9).await.unwrap(), PremiumStatus::default());
    }
}
