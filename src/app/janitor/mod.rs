//! Supervised background maintenance
//!
//! The janitor owns two independent loops that share one broadcast shutdown channel:
//! a periodic temp sweep of the artifact directory and a daily chart publisher.
//! Neither loop ever terminates on a failed iteration; failures are logged and the
//! loop waits for its next slot.
//!
//! # Module Organization
//!
//! - [`config`] - Intervals, publish hour and shutdown grace
//! - [`sweep`] - Stale artifact removal
//! - [`schedule`] - Next-slot arithmetic for the daily publish
//! - [`publisher`] - Top-chart snapshot publisher
//! - [`signals`] - Ctrl-C / SIGTERM to shutdown broadcast

pub mod config;
pub mod publisher;
pub mod schedule;
pub mod signals;
pub mod sweep;

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::app::collaborators::Publisher;
use crate::app::limiter::RateLimiter;
use crate::app::models::{Period, SearchSession};
use crate::app::session::SessionCache;
use crate::errors::SchedulerResult;

pub use config::JanitorConfig;
pub use publisher::{ChartSnapshot, TopChartPublisher};
pub use schedule::{next_occurrence, DailySlots};
pub use signals::{create_shutdown_channel, wait_for_shutdown_signal, SignalHandler};
pub use sweep::{sweep_artifacts, SweepReport};

/// In-memory state the sweep tick also tidies
#[derive(Clone, Default)]
pub struct SweepTargets {
    pub sessions: Option<Arc<SessionCache<SearchSession>>>,
    pub limiter: Option<Arc<RateLimiter>>,
}

/// Supervisor for the temp sweep and publisher loops
pub struct JanitorScheduler {
    config: JanitorConfig,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl JanitorScheduler {
    /// Create a scheduler with its own shutdown channel
    pub fn new(config: JanitorConfig) -> Self {
        let (shutdown_tx, _) = create_shutdown_channel();
        Self::with_shutdown(config, shutdown_tx)
    }

    /// Create a scheduler listening on an existing shutdown channel
    pub fn with_shutdown(config: JanitorConfig, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            config,
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn config(&self) -> &JanitorConfig {
        &self.config
    }

    /// Sender that stops every loop when fired
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Number of loops started
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Start the periodic temp sweep
    ///
    /// The first sweep runs immediately, then every `sweep_interval`.
    pub fn start_temp_sweep(&mut self, targets: SweepTargets) {
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.sweep_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match run_sweep_tick(&config, &targets).await {
                            Ok(report) if report.removed > 0 || report.failed > 0 => info!(
                                "Temp sweep removed {} of {} files ({} failed)",
                                report.removed, report.scanned, report.failed
                            ),
                            Ok(_) => debug!("Temp sweep found nothing to remove"),
                            Err(e) => error!("Temp sweep failed: {}", e),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Temp sweep received shutdown signal");
                        break;
                    }
                }
            }
        });

        self.tasks.push(("temp-sweep", task));
    }

    /// Start the daily publisher at `publish_hour` local time
    pub fn start_publisher(&mut self, publisher: Arc<dyn Publisher>) {
        let mut slots = DailySlots::new(self.config.publish_hour);
        let shutdown_rx = self.shutdown_tx.subscribe();

        let task = tokio::spawn(publish_loop(
            publisher,
            move || slots.next_delay(&Local::now()),
            self.config.publish_retry_backoff,
            self.config.publish_max_attempts,
            shutdown_rx,
        ));

        self.tasks.push(("publisher", task));
    }

    /// Broadcast shutdown and wait up to `grace` for each loop
    ///
    /// Loops still running after their grace period are aborted. Returns how many
    /// had to be aborted.
    pub async fn shutdown(self, grace: Duration) -> usize {
        debug!("Stopping {} janitor tasks", self.tasks.len());
        let _ = self.shutdown_tx.send(());

        let mut aborted = 0;
        for (name, mut task) in self.tasks {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                warn!("Janitor task {} did not stop within {:?}, aborting", name, grace);
                task.abort();
                aborted += 1;
            }
        }

        info!("Janitor stopped");
        aborted
    }
}

/// One sweep iteration: artifact directory plus expired in-memory state
pub async fn run_sweep_tick(
    config: &JanitorConfig,
    targets: &SweepTargets,
) -> SchedulerResult<SweepReport> {
    if let Some(sessions) = &targets.sessions {
        let purged = sessions.purge_expired().await;
        if purged > 0 {
            debug!("Purged {} expired sessions", purged);
        }
    }

    if let Some(limiter) = &targets.limiter {
        let pruned = limiter.prune_idle().await;
        if pruned > 0 {
            debug!("Dropped {} idle rate windows", pruned);
        }
    }

    sweep_artifacts(&config.artifact_dir, config.artifact_max_age).await
}

/// Publish loop: wait for the slot, publish, retry a failed publish after `backoff`
///
/// A slot gets at most `max_attempts` attempts; after that the loop waits for the
/// next slot. `next_delay` is asked for the wait before every slot.
pub async fn publish_loop<F>(
    publisher: Arc<dyn Publisher>,
    mut next_delay: F,
    backoff: Duration,
    max_attempts: u32,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    F: FnMut() -> Duration + Send,
{
    loop {
        let delay = next_delay();
        debug!("Next chart publish in {:?}", delay);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.recv() => {
                debug!("Publisher received shutdown signal");
                return;
            }
        }

        let mut attempt = 1;
        loop {
            let outcome = tokio::select! {
                outcome = publisher.publish_top(Period::Day) => outcome,
                _ = shutdown_rx.recv() => return,
            };

            match outcome {
                Ok(()) => {
                    info!("Daily chart published");
                    break;
                }
                Err(e) if attempt < max_attempts => {
                    warn!(
                        "Chart publish attempt {}/{} failed: {}, retrying in {:?}",
                        attempt, max_attempts, e, backoff
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown_rx.recv() => return,
                    }
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Chart publish failed after {} attempts: {}, waiting for next slot",
                        attempt, e
                    );
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::app::limiter::RateLimitConfig;
    use crate::app::session::{SessionConfig, SessionKey};
    use crate::errors::SchedulerError;

    const HOUR: Duration = Duration::from_secs(3600);
    const DAY: Duration = Duration::from_secs(24 * 3600);
    const BACKOFF: Duration = Duration::from_secs(300);

    /// Publisher failing its first `failures` calls
    struct FlakyPublisher {
        calls: AtomicU32,
        failures: u32,
    }

    impl FlakyPublisher {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                failures,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Publisher for FlakyPublisher {
        async fn publish_top(&self, _period: Period) -> SchedulerResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(SchedulerError::PublishFailed(format!("attempt {}", call)))
            } else {
                Ok(())
            }
        }
    }

    fn first_slot_in_an_hour() -> impl FnMut() -> Duration + Send {
        let mut first = true;
        move || {
            if std::mem::take(&mut first) {
                HOUR
            } else {
                DAY
            }
        }
    }

    /// Test publish retry after back-off
    ///
    /// Two failures followed by success are retried 5 minutes apart and then the
    /// loop waits for the next day.
    #[tokio::test(start_paused = true)]
    async fn test_publish_retried_after_backoff() {
        let publisher = FlakyPublisher::new(2);
        let (tx, rx) = create_shutdown_channel();
        let handle = tokio::spawn(publish_loop(
            publisher.clone(),
            first_slot_in_an_hour(),
            BACKOFF,
            3,
            rx,
        ));

        tokio::time::sleep(HOUR - Duration::from_secs(1)).await;
        assert_eq!(publisher.calls(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(publisher.calls(), 1);

        tokio::time::sleep(BACKOFF).await;
        assert_eq!(publisher.calls(), 2);

        tokio::time::sleep(BACKOFF).await;
        assert_eq!(publisher.calls(), 3);

        // Succeeded; nothing more until tomorrow
        tokio::time::sleep(HOUR).await;
        assert_eq!(publisher.calls(), 3);

        let _ = tx.send(());
        handle.await.unwrap();
    }

    /// Test attempts per slot are bounded
    ///
    /// A publisher that always fails is tried `max_attempts` times, then again at
    /// the next slot.
    #[tokio::test(start_paused = true)]
    async fn test_publish_gives_up_until_next_slot() {
        let publisher = FlakyPublisher::new(u32::MAX);
        let (tx, rx) = create_shutdown_channel();
        let handle = tokio::spawn(publish_loop(
            publisher.clone(),
            first_slot_in_an_hour(),
            BACKOFF,
            3,
            rx,
        ));

        tokio::time::sleep(HOUR + BACKOFF * 4).await;
        assert_eq!(publisher.calls(), 3);

        tokio::time::sleep(DAY).await;
        assert_eq!(publisher.calls(), 4);

        let _ = tx.send(());
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_loop_stops_during_backoff() {
        let publisher = FlakyPublisher::new(u32::MAX);
        let (tx, rx) = create_shutdown_channel();
        let handle = tokio::spawn(publish_loop(
            publisher.clone(),
            || Duration::ZERO,
            HOUR,
            3,
            rx,
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(publisher.calls(), 1);

        let _ = tx.send(());
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should stop during back-off")
            .unwrap();
    }

    /// Test sweep tick tidies in-memory state
    #[tokio::test]
    async fn test_sweep_tick_purges_sessions_and_windows() {
        let dir = TempDir::new().unwrap();
        let config = JanitorConfig::default().with_artifact_dir(dir.path());

        let sessions = Arc::new(SessionCache::new(&SessionConfig::default()));
        sessions
            .set(
                SessionKey::search(7),
                SearchSession {
                    query: "q".to_string(),
                    tracks: Vec::new(),
                },
                Duration::from_millis(5),
            )
            .await;

        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(
            5,
            Duration::from_millis(5),
        )));
        assert!(limiter.is_allowed(7).await.allowed);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let targets = SweepTargets {
            sessions: Some(sessions.clone()),
            limiter: Some(limiter.clone()),
        };
        let report = run_sweep_tick(&config, &targets).await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert!(sessions.is_empty().await);
        assert_eq!(limiter.tracked_identities().await, 0);
    }

    /// Test shutdown is prompt
    ///
    /// Both loops are idle in their waits and stop well inside the grace period.
    #[tokio::test]
    async fn test_shutdown_stops_both_loops() {
        let dir = TempDir::new().unwrap();
        let config = JanitorConfig::default().with_artifact_dir(dir.path());
        let mut janitor = JanitorScheduler::new(config);

        janitor.start_temp_sweep(SweepTargets::default());
        janitor.start_publisher(FlakyPublisher::new(0));
        assert_eq!(janitor.task_count(), 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let aborted = tokio::time::timeout(
            Duration::from_secs(2),
            janitor.shutdown(Duration::from_secs(1)),
        )
        .await
        .expect("shutdown should complete");
        assert_eq!(aborted, 0);
    }

    #[tokio::test]
    async fn test_external_shutdown_sender() {
        let (tx, _rx) = create_shutdown_channel();
        let mut janitor = JanitorScheduler::with_shutdown(JanitorConfig::default(), tx.clone());
        janitor.start_publisher(FlakyPublisher::new(0));

        let _ = tx.send(());
        assert_eq!(janitor.shutdown(Duration::from_millis(500)).await, 0);
    }
}
