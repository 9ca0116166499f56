//! Unit tests for the download orchestrator
//!
//! Collaborators are replaced by in-process fakes; artifacts are written into a
//! temporary directory so every test can assert that nothing is left behind.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tempfile::TempDir;
use tokio::sync::Notify;

use crate::app::collaborators::{DownloadStore, FetchRequest, Fetcher, Transport};
use crate::app::models::{
    ConsumptionPath, DeliveryId, DeliveryMetadata, DownloadRecord, Period, PremiumStatus,
    SearchSession, TopTrack, Track, UserId,
};
use crate::app::quota::{today, QuotaConfig, QuotaCoordinator};
use crate::app::session::{SessionCache, SessionKey, SessionScope};
use crate::app::storage::MemoryStore;
use crate::errors::{
    DeliveryFailure, DownloadError, FetchFailure, StorageError, StorageResult,
};

use super::*;

const USER: UserId = 1001;

/// What the fake fetcher does when called
#[derive(Debug, Clone)]
pub enum FetchBehavior {
    /// Write a file of the given size and return it
    Produce { bytes: usize },
    /// Fail without touching the disk
    Fail(FetchFailure),
    /// Leave a partial file behind, then fail
    PartialThenFail(FetchFailure),
    /// Never finish
    Hang,
    /// Write the file, signal `started`, then wait for `release`
    Gated,
}

pub struct FakeFetcher {
    behavior: FetchBehavior,
    calls: AtomicUsize,
    started: Notify,
    release: Notify,
}

impl FakeFetcher {
    pub fn new(behavior: FetchBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<PathBuf, FetchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let output = request.artifact_stem.with_extension("mp3");
        let write = |path: PathBuf, bytes: usize| async move {
            tokio::fs::write(&path, vec![0u8; bytes])
                .await
                .map_err(|e| FetchFailure::Unknown(e.to_string()))
        };

        match &self.behavior {
            FetchBehavior::Produce { bytes } => {
                write(output.clone(), *bytes).await?;
                Ok(output)
            }
            FetchBehavior::Fail(failure) => Err(failure.clone()),
            FetchBehavior::PartialThenFail(failure) => {
                write(request.artifact_stem.with_extension("webm.part"), 64).await?;
                Err(failure.clone())
            }
            FetchBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(output)
            }
            FetchBehavior::Gated => {
                write(output.clone(), 128).await?;
                self.started.notify_one();
                self.release.notified().await;
                Ok(output)
            }
        }
    }
}

/// Transport that records deliveries and whether the file existed at that moment
pub struct FakeTransport {
    fail: bool,
    deliveries: Mutex<Vec<(UserId, PathBuf, bool)>>,
}

impl FakeTransport {
    pub fn new(fail: bool) -> Self {
        Self {
            fail,
            deliveries: Mutex::new(Vec::new()),
        }
    }

    pub fn deliveries(&self) -> Vec<(UserId, PathBuf, bool)> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn deliver(
        &self,
        user_id: UserId,
        file: &Path,
        _metadata: &DeliveryMetadata,
    ) -> Result<DeliveryId, DeliveryFailure> {
        let existed = file.exists();
        let mut deliveries = self.deliveries.lock().unwrap();
        deliveries.push((user_id, file.to_path_buf(), existed));
        if self.fail {
            return Err(DeliveryFailure::new("bot was blocked by the user"));
        }
        Ok(DeliveryId(format!("msg-{}", deliveries.len())))
    }
}

/// Store whose history writes always fail
pub struct FailingHistoryStore {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl DownloadStore for FailingHistoryStore {
    async fn record_download(&self, _record: &DownloadRecord) -> StorageResult<()> {
        Err(StorageError::TaskFailed("database is locked".to_string()))
    }
    async fn increment_daily_count(&self, user_id: UserId, date: NaiveDate) -> StorageResult<u32> {
        self.inner.increment_daily_count(user_id, date).await
    }
    async fn get_daily_count(&self, user_id: UserId, date: NaiveDate) -> StorageResult<u32> {
        self.inner.get_daily_count(user_id, date).await
    }
    async fn get_bonus_credits(&self, user_id: UserId) -> StorageResult<u32> {
        self.inner.get_bonus_credits(user_id).await
    }
    async fn consume_bonus_credit(&self, user_id: UserId) -> StorageResult<bool> {
        self.inner.consume_bonus_credit(user_id).await
    }
    async fn get_premium_status(&self, user_id: UserId) -> StorageResult<PremiumStatus> {
        self.inner.get_premium_status(user_id).await
    }
    async fn add_bonus_credits(&self, user_id: UserId, amount: u32) -> StorageResult<u32> {
        self.inner.add_bonus_credits(user_id, amount).await
    }
    async fn set_premium(&self, user_id: UserId, until: Option<DateTime<Utc>>) -> StorageResult<()> {
        self.inner.set_premium(user_id, until).await
    }
    async fn top_tracks(&self, period: Period, limit: usize) -> StorageResult<Vec<TopTrack>> {
        self.inner.top_tracks(period, limit).await
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<MemoryStore>,
    pub sessions: Arc<SessionCache<SearchSession>>,
    pub fetcher: Arc<FakeFetcher>,
    pub transport: Arc<FakeTransport>,
    pub orchestrator: Arc<DownloadOrchestrator>,
}

impl Harness {
    pub fn artifacts_left(&self) -> usize {
        std::fs::read_dir(self.dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub async fn daily_count(&self) -> u32 {
        self.store.get_daily_count(USER, today()).await.unwrap()
    }
}

/// Test listing: a normal track and one longer than the duration limit
pub fn test_tracks() -> Vec<Track> {
    vec![
        Track::new("dQw4w9WgXcQ", "Never Gonna Give You Up", 213).with_artist("Rick Astley"),
        Track::new("long00000001", "Ten Hour Loop", 36_000).with_artist("Loops"),
    ]
}

pub fn create_test_config(dir: &Path) -> OrchestratorConfig {
    OrchestratorConfig::default()
        .with_artifact_dir(dir)
        .with_limits(1024 * 1024, 600)
        .with_fetch_rate_limit(0)
}

/// Build an orchestrator over fakes with a cached search for [`USER`]
pub async fn create_harness(behavior: FetchBehavior, deliver_fails: bool) -> Harness {
    create_harness_with(behavior, deliver_fails, |config| config, None).await
}

pub async fn create_harness_with(
    behavior: FetchBehavior,
    deliver_fails: bool,
    adjust: impl FnOnce(OrchestratorConfig) -> OrchestratorConfig,
    store_override: Option<Arc<dyn DownloadStore>>,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let quota_store: Arc<dyn DownloadStore> = store_override.unwrap_or_else(|| store.clone() as Arc<dyn DownloadStore>);
    let quota = QuotaCoordinator::new(quota_store, QuotaConfig { daily_limit: 10 });

    let sessions = Arc::new(SessionCache::default());
    sessions
        .set(
            SessionKey::search(USER),
            SearchSession {
                query: "rick astley".to_string(),
                tracks: test_tracks(),
            },
            Duration::from_secs(600),
        )
        .await;

    let fetcher = Arc::new(FakeFetcher::new(behavior));
    let transport = Arc::new(FakeTransport::new(deliver_fails));
    let orchestrator = Arc::new(DownloadOrchestrator::new(
        adjust(create_test_config(dir.path())),
        sessions.clone(),
        quota,
        fetcher.clone(),
        transport.clone(),
    ));

    Harness {
        dir,
        store,
        sessions,
        fetcher,
        transport,
        orchestrator,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_successful_download_charges_daily_once() {
    let h = create_harness(FetchBehavior::Produce { bytes: 4096 }, false).await;

    let receipt = h
        .orchestrator
        .execute(USER, Selection::search(1))
        .await
        .unwrap();

    assert_eq!(receipt.path, ConsumptionPath::Daily);
    assert_eq!(receipt.remaining_daily, 9);
    assert!(receipt.accounting_complete);
    assert_eq!(receipt.track.id, "dQw4w9WgXcQ");

    let records = h.store.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].track_id, "dQw4w9WgXcQ");
    assert_eq!(h.daily_count().await, 1);

    let deliveries = h.transport.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].2, "file must exist while it is delivered");
    assert!(!deliveries[0].1.exists());
    assert_eq!(h.artifacts_left(), 0);
    assert!(h.orchestrator.in_flight().is_empty());
}

/// Test every fetch failure subtype
///
/// None of them may consume quota, write history or leave files behind, even when
/// the fetcher left a partial download in the artifact directory.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_failures_leave_no_trace() {
    let failures = vec![
        FetchFailure::TooLarge {
            reason: "80MB".to_string(),
        },
        FetchFailure::Unavailable,
        FetchFailure::Private,
        FetchFailure::GeoBlocked,
        FetchFailure::CopyrightBlocked,
        FetchFailure::Unknown("extractor crashed".to_string()),
    ];

    for failure in failures {
        let h = create_harness(FetchBehavior::PartialThenFail(failure.clone()), false).await;

        let error = h
            .orchestrator
            .execute(USER, Selection::search(1))
            .await
            .unwrap_err();

        match error {
            DownloadError::Fetch(ref got) => assert_eq!(got, &failure),
            other => panic!("expected fetch failure, got {:?}", other),
        }
        assert!(error.is_retryable());
        assert_eq!(h.fetcher.calls(), 1);
        assert!(h.transport.deliveries().is_empty());
        assert!(h.store.records().unwrap().is_empty());
        assert_eq!(h.daily_count().await, 0);
        assert_eq!(h.artifacts_left(), 0, "partial file for {:?} left", failure);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delivery_failure_keeps_quota() {
    let h = create_harness(FetchBehavior::Produce { bytes: 1000 }, true).await;

    let error = h
        .orchestrator
        .execute(USER, Selection::search(1))
        .await
        .unwrap_err();

    assert!(matches!(error, DownloadError::Delivery(_)));
    assert!(!error.is_retryable());
    assert_eq!(h.transport.deliveries().len(), 1);
    assert!(h.store.records().unwrap().is_empty());
    assert_eq!(h.daily_count().await, 0);
    assert_eq!(h.artifacts_left(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_expired_session_is_reported() {
    let h = create_harness(FetchBehavior::Produce { bytes: 10 }, false).await;
    tokio::time::advance(Duration::from_secs(601)).await;

    let error = h
        .orchestrator
        .execute(USER, Selection::search(1))
        .await
        .unwrap_err();
    assert!(matches!(error, DownloadError::CacheExpired));

    let error = h
        .orchestrator
        .execute(USER + 1, Selection::search(1))
        .await
        .unwrap_err();
    assert!(matches!(error, DownloadError::CacheExpired));
    assert_eq!(h.fetcher.calls(), 0);
}

#[tokio::test]
async fn test_other_scopes_are_separate() {
    let h = create_harness(FetchBehavior::Produce { bytes: 10 }, false).await;

    let error = h
        .orchestrator
        .execute(USER, Selection::new(SessionScope::Favorites, 1))
        .await
        .unwrap_err();
    assert!(matches!(error, DownloadError::CacheExpired));
    assert_eq!(h.sessions.len().await, 1);
}

#[tokio::test]
async fn test_out_of_range_selection() {
    let h = create_harness(FetchBehavior::Produce { bytes: 10 }, false).await;

    for position in [0, 3, 99] {
        let error = h
            .orchestrator
            .execute(USER, Selection::search(position))
            .await
            .unwrap_err();
        match error {
            DownloadError::InvalidSelection {
                position: got,
                available,
            } => {
                assert_eq!(got, position);
                assert_eq!(available, 2);
            }
            other => panic!("expected invalid selection, got {:?}", other),
        }
    }
    assert_eq!(h.fetcher.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_quota_checked_before_fetch() {
    let h = create_harness(FetchBehavior::Produce { bytes: 10 }, false).await;
    h.store.set_daily_count(USER, today(), 10).unwrap();

    let error = h
        .orchestrator
        .execute(USER, Selection::search(1))
        .await
        .unwrap_err();

    assert!(matches!(error, DownloadError::QuotaExceeded { daily_limit: 10 }));
    assert_eq!(h.fetcher.calls(), 0);
    assert_eq!(h.artifacts_left(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bonus_credit_spent_once() {
    let h = create_harness(FetchBehavior::Produce { bytes: 10 }, false).await;
    h.store.set_daily_count(USER, today(), 10).unwrap();
    h.store.add_bonus_credits(USER, 1).await.unwrap();

    let receipt = h
        .orchestrator
        .execute(USER, Selection::search(1))
        .await
        .unwrap();
    assert_eq!(receipt.path, ConsumptionPath::Bonus);
    assert_eq!(h.store.get_bonus_credits(USER).await.unwrap(), 0);
    assert_eq!(h.daily_count().await, 10);

    let error = h
        .orchestrator
        .execute(USER, Selection::search(1))
        .await
        .unwrap_err();
    assert!(matches!(error, DownloadError::QuotaExceeded { .. }));
    assert_eq!(h.store.records().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_premium_download_is_free() {
    let h = create_harness(FetchBehavior::Produce { bytes: 10 }, false).await;
    h.store.set_daily_count(USER, today(), 25).unwrap();
    h.store.set_premium(USER, None).await.unwrap();

    let receipt = h
        .orchestrator
        .execute(USER, Selection::search(1))
        .await
        .unwrap();

    assert_eq!(receipt.path, ConsumptionPath::Premium);
    assert_eq!(receipt.remaining_daily, -1);
    assert_eq!(h.daily_count().await, 25);
    assert_eq!(h.store.records().unwrap().len(), 1);
}

#[tokio::test]
async fn test_overlong_track_rejected_without_fetch() {
    let h = create_harness(FetchBehavior::Produce { bytes: 10 }, false).await;

    let error = h
        .orchestrator
        .execute(USER, Selection::search(2))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        DownloadError::Fetch(FetchFailure::TooLarge { .. })
    ));
    assert_eq!(h.fetcher.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_file_is_rejected_and_removed() {
    let h = create_harness(FetchBehavior::Produce { bytes: 4096 }, false).await;
    let small = create_harness_with(
        FetchBehavior::Produce { bytes: 4096 },
        false,
        |config| config.with_limits(1024, 600),
        None,
    )
    .await;

    assert!(h.orchestrator.execute(USER, Selection::search(1)).await.is_ok());

    let error = small
        .orchestrator
        .execute(USER, Selection::search(1))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        DownloadError::Fetch(FetchFailure::TooLarge { .. })
    ));
    assert!(small.transport.deliveries().is_empty());
    assert_eq!(small.artifacts_left(), 0);
    assert_eq!(small.daily_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_timeout_maps_to_unknown() {
    let h = create_harness_with(
        FetchBehavior::Hang,
        false,
        |config| config.with_fetch_timeout(Duration::from_millis(50)),
        None,
    )
    .await;

    let error = h
        .orchestrator
        .execute(USER, Selection::search(1))
        .await
        .unwrap_err();

    assert!(matches!(error, DownloadError::Fetch(FetchFailure::Unknown(_))));
    assert_eq!(h.daily_count().await, 0);
    assert_eq!(h.artifacts_left(), 0);
}

/// Test that a second selection during a running download is turned away
///
/// The first download completes normally and is charged exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_selection_rejected_while_in_flight() {
    let h = create_harness(FetchBehavior::Gated, false).await;

    let first = tokio::spawn({
        let orchestrator = Arc::clone(&h.orchestrator);
        async move { orchestrator.execute(USER, Selection::search(1)).await }
    });
    h.fetcher.started.notified().await;
    assert!(h.orchestrator.in_flight().is_active(USER));

    let error = h
        .orchestrator
        .execute(USER, Selection::search(1))
        .await
        .unwrap_err();
    assert!(matches!(error, DownloadError::AlreadyInProgress));
    assert!(error.is_retryable());

    h.fetcher.release.notify_one();
    let receipt = first.await.unwrap().unwrap();
    assert_eq!(receipt.path, ConsumptionPath::Daily);

    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(h.daily_count().await, 1);
    assert!(!h.orchestrator.in_flight().is_active(USER));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_download_cleans_up() {
    let h = create_harness(FetchBehavior::Gated, false).await;

    let task = tokio::spawn({
        let orchestrator = Arc::clone(&h.orchestrator);
        async move { orchestrator.execute(USER, Selection::search(1)).await }
    });
    h.fetcher.started.notified().await;
    assert_eq!(h.artifacts_left(), 1);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_eq!(h.artifacts_left(), 0);
    assert!(h.orchestrator.in_flight().is_empty());
    assert_eq!(h.daily_count().await, 0);
}

/// Test bookkeeping failure after delivery
///
/// The user already has the file, so the outcome is still a success; the receipt
/// flags the missing history row and the quota is still charged.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bookkeeping_failure_after_delivery() {
    let inner = Arc::new(MemoryStore::new());
    let failing: Arc<dyn DownloadStore> = Arc::new(FailingHistoryStore {
        inner: inner.clone(),
    });
    let h = create_harness_with(
        FetchBehavior::Produce { bytes: 10 },
        false,
        |config| config,
        Some(failing),
    )
    .await;

    let receipt = h
        .orchestrator
        .execute(USER, Selection::search(1))
        .await
        .unwrap();

    assert!(!receipt.accounting_complete);
    assert_eq!(inner.get_daily_count(USER, today()).await.unwrap(), 1);
    assert!(inner.records().unwrap().is_empty());
    assert_eq!(h.artifacts_left(), 0);
}
