//! Daily top-chart publishing
//!
//! Builds the most downloaded tracks of the period from the download history and
//! writes a JSON snapshot for the channel poster to pick up. A quiet day falls back
//! to the weekly chart; an empty chart is not published at all.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::collaborators::{DownloadStore, Publisher};
use crate::app::models::{Period, TopTrack};
use crate::constants::janitor::CHART_SIZE;
use crate::errors::SchedulerResult;

/// Published chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSnapshot {
    /// Period the chart was asked for
    pub requested_period: Period,
    /// Period the tracks were actually counted over
    pub period: Period,
    pub generated_at: DateTime<Utc>,
    pub tracks: Vec<TopTrack>,
}

/// [`Publisher`] writing chart snapshots into a directory
pub struct TopChartPublisher {
    store: Arc<dyn DownloadStore>,
    publish_dir: PathBuf,
    chart_size: usize,
}

impl TopChartPublisher {
    pub fn new(store: Arc<dyn DownloadStore>, publish_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            publish_dir: publish_dir.into(),
            chart_size: CHART_SIZE,
        }
    }

    /// Set the number of tracks per chart
    pub fn with_chart_size(mut self, size: usize) -> Self {
        self.chart_size = size.max(1);
        self
    }

    pub fn publish_dir(&self) -> &Path {
        &self.publish_dir
    }

    /// Build the chart for `period`, widening a quiet day to the week
    pub async fn build_chart(&self, period: Period) -> SchedulerResult<Option<ChartSnapshot>> {
        let mut counted_over = period;
        let mut tracks = self.store.top_tracks(period, self.chart_size).await?;

        if tracks.is_empty() && period == Period::Day {
            debug!("No downloads today, falling back to the weekly chart");
            counted_over = Period::Week;
            tracks = self.store.top_tracks(Period::Week, self.chart_size).await?;
        }

        if tracks.is_empty() {
            return Ok(None);
        }

        Ok(Some(ChartSnapshot {
            requested_period: period,
            period: counted_over,
            generated_at: Utc::now(),
            tracks,
        }))
    }

    /// Build and write the chart, returning the snapshot path if one was written
    pub async fn publish_snapshot(&self, period: Period) -> SchedulerResult<Option<PathBuf>> {
        let Some(snapshot) = self.build_chart(period).await? else {
            info!("No downloads to chart for {}, skipping publish", period);
            return Ok(None);
        };

        tokio::fs::create_dir_all(&self.publish_dir).await?;
        let file_name = format!(
            "top-{}-{}.json",
            period,
            Local::now().format("%Y-%m-%d")
        );
        let target = self.publish_dir.join(&file_name);
        let staging = self.publish_dir.join(format!(".{}.tmp", file_name));

        // Write then rename so readers never see a half-written chart
        let body = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(&staging, body).await?;
        tokio::fs::rename(&staging, &target).await?;

        info!(
            "Published {} chart with {} tracks to {}",
            snapshot.period,
            snapshot.tracks.len(),
            target.display()
        );
        Ok(Some(target))
    }
}

#[async_trait]
impl Publisher for TopChartPublisher {
    async fn publish_top(&self, period: Period) -> SchedulerResult<()> {
        self.publish_snapshot(period).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::app::models::DownloadRecord;
    use crate::app::storage::MemoryStore;

    async fn seeded_store(tracks: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (n, track) in tracks.iter().enumerate() {
            store
                .record_download(&DownloadRecord {
                    user_id: n as i64,
                    track_id: track.to_string(),
                    title: format!("Song {}", track),
                    artist: "Band".to_string(),
                    duration_seconds: 180,
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_snapshot_written_with_ranking() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&["a", "b", "b", "c", "b", "a"]).await;
        let publisher = TopChartPublisher::new(store, dir.path()).with_chart_size(2);

        let path = publisher
            .publish_snapshot(Period::Day)
            .await
            .unwrap()
            .expect("chart should be written");

        let snapshot: ChartSnapshot =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(snapshot.period, Period::Day);
        assert_eq!(snapshot.tracks.len(), 2);
        assert_eq!(snapshot.tracks[0].track_id, "b");
        assert_eq!(snapshot.tracks[0].download_count, 3);

        // No staging file left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_empty_chart_is_skipped() {
        let dir = TempDir::new().unwrap();
        let publisher = TopChartPublisher::new(Arc::new(MemoryStore::new()), dir.path().join("charts"));

        assert_eq!(publisher.publish_snapshot(Period::Day).await.unwrap(), None);
        assert!(publisher.publish_top(Period::Day).await.is_ok());
        assert!(!dir.path().join("charts").exists());
    }
}
