//! Download orchestration: from a user's selection to a delivered audio file
//!
//! The orchestrator is the single place where a selection is turned into a download.
//! It sequences the steps, owns the temporary artifact, and is the only component
//! that translates collaborator failures into a user-facing [`DownloadError`].
//!
//! # Sequence
//!
//! 1. Mark the user as busy (one download per user at a time)
//! 2. Resolve the selection against the user's cached results
//! 3. Check quota eligibility (nothing is consumed yet)
//! 4. Fetch into a freshly allocated [`TempArtifact`]
//! 5. Deliver through the transport
//! 6. After confirmed delivery, record the download and charge the quota
//! 7. Release the artifact, whatever happened above
//!
//! # Module Organization
//!
//! - [`config`] - Limits, timeouts and the artifact directory
//! - [`artifact`] - Scoped ownership of downloaded files
//! - [`inflight`] - Per-user in-flight markers
//! - [`throttle`] - Process-wide pacing of outbound fetches

pub mod artifact;
pub mod config;
pub mod inflight;
pub mod throttle;

#[cfg(test)]
pub mod tests;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::app::collaborators::{FetchRequest, Fetcher, Transport};
use crate::app::models::{ConsumptionPath, DeliveryId, DownloadJob, SearchSession, Track, UserId};
use crate::app::quota::{Eligibility, QuotaCoordinator};
use crate::app::session::{SessionCache, SessionKey, SessionScope};
use crate::constants::quota::UNLIMITED;
use crate::errors::{DownloadError, DownloadResult, FetchFailure};

pub use artifact::TempArtifact;
pub use config::OrchestratorConfig;
pub use inflight::{InFlightRegistry, InFlightTicket};
pub use throttle::FetchThrottle;

/// A user's pick from a cached listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Listing the position refers to
    pub scope: SessionScope,
    /// 1-based position in the listing
    pub position: usize,
}

impl Selection {
    pub fn new(scope: SessionScope, position: usize) -> Self {
        Self { scope, position }
    }

    /// Pick the `position`-th (1-based) track of the latest search
    pub fn search(position: usize) -> Self {
        Self::new(SessionScope::Search, position)
    }
}

/// Outcome of a delivered download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReceipt {
    /// Transport's id for the delivered message
    pub delivery_id: DeliveryId,
    /// Track that was delivered
    pub track: Track,
    /// Allowance that paid for the download
    pub path: ConsumptionPath,
    /// Free downloads left today after this one; `-1` for premium users
    pub remaining_daily: i64,
    /// False when the history record or quota charge could not be written
    pub accounting_complete: bool,
}

/// Sequences fetch, delivery and bookkeeping for one selection at a time per user
pub struct DownloadOrchestrator {
    config: OrchestratorConfig,
    sessions: Arc<SessionCache<SearchSession>>,
    quota: QuotaCoordinator,
    fetcher: Arc<dyn Fetcher>,
    transport: Arc<dyn Transport>,
    in_flight: InFlightRegistry,
    throttle: FetchThrottle,
}

impl DownloadOrchestrator {
    /// Create an orchestrator
    ///
    /// # Arguments
    ///
    /// * `config` - Limits, timeouts and the artifact directory
    /// * `sessions` - Cache holding the listings selections refer to
    /// * `quota` - Eligibility and consumption
    /// * `fetcher` - Produces audio files
    /// * `transport` - Delivers audio files to users
    pub fn new(
        config: OrchestratorConfig,
        sessions: Arc<SessionCache<SearchSession>>,
        quota: QuotaCoordinator,
        fetcher: Arc<dyn Fetcher>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let throttle = FetchThrottle::new(config.fetch_rate_limit_rps);
        if throttle.is_enabled() {
            debug!(
                "Outbound fetches limited to {} per second",
                config.fetch_rate_limit_rps
            );
        }
        Self {
            config,
            sessions,
            quota,
            fetcher,
            transport,
            in_flight: InFlightRegistry::new(),
            throttle,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    /// Download and deliver the selected track
    ///
    /// On any error the user's quota is untouched, no download is recorded and no
    /// artifact is left on disk.
    ///
    /// # Errors
    ///
    /// Returns the [`DownloadError`] describing why the track was not delivered
    pub async fn execute(
        &self,
        user_id: UserId,
        selection: Selection,
    ) -> DownloadResult<DownloadReceipt> {
        let result = self.run(user_id, selection).await;

        match &result {
            Ok(receipt) => info!(
                "Delivered {} to user {} via {} quota ({})",
                receipt.track.id, user_id, receipt.path, receipt.delivery_id
            ),
            Err(DownloadError::Internal(message)) => {
                error!("Download for user {} failed internally: {}", user_id, message)
            }
            Err(e @ (DownloadError::Fetch(_) | DownloadError::Delivery(_))) => warn!(
                "Download for user {} failed ({}): {}",
                user_id,
                e.category(),
                e
            ),
            Err(e) => info!(
                "Download for user {} rejected ({}): {}",
                user_id,
                e.category(),
                e
            ),
        }

        result
    }

    async fn run(&self, user_id: UserId, selection: Selection) -> DownloadResult<DownloadReceipt> {
        let _ticket = self
            .in_flight
            .try_acquire(user_id)
            .ok_or(DownloadError::AlreadyInProgress)?;

        let track = self.resolve(user_id, selection).await?;

        let eligibility = self.quota.check_eligibility(user_id).await?;
        let path = match eligibility.path {
            Some(path) if eligibility.can_download => path,
            _ => {
                return Err(DownloadError::QuotaExceeded {
                    daily_limit: self.quota.config().daily_limit,
                })
            }
        };

        if track.duration_seconds > self.config.max_duration_seconds {
            return Err(FetchFailure::TooLarge {
                reason: format!(
                    "duration {}s exceeds {}s",
                    track.duration_seconds, self.config.max_duration_seconds
                ),
            }
            .into());
        }

        let job = DownloadJob::new(&track, path);
        let mut artifact = TempArtifact::allocate(&self.config.artifact_dir, user_id, &job.track_id)
            .await
            .map_err(|e| {
                DownloadError::Internal(format!(
                    "cannot prepare artifact directory {}: {}",
                    self.config.artifact_dir.display(),
                    e
                ))
            })?;

        let outcome = match self.fetch_and_deliver(user_id, &job, &mut artifact).await {
            Ok(delivery_id) => Ok(self.settle(user_id, track, &job, delivery_id, eligibility).await),
            Err(e) => Err(e),
        };

        artifact.release().await;
        outcome
    }

    /// Look up the selected track in the user's cached listing
    async fn resolve(&self, user_id: UserId, selection: Selection) -> DownloadResult<Track> {
        let key = SessionKey::new(user_id, selection.scope);
        let session = self
            .sessions
            .get(&key)
            .await
            .filter(|session| !session.tracks.is_empty())
            .ok_or(DownloadError::CacheExpired)?;

        let available = session.tracks.len();
        selection
            .position
            .checked_sub(1)
            .and_then(|index| session.tracks.get(index))
            .cloned()
            .ok_or(DownloadError::InvalidSelection {
                position: selection.position,
                available,
            })
    }

    async fn fetch_and_deliver(
        &self,
        user_id: UserId,
        job: &DownloadJob,
        artifact: &mut TempArtifact,
    ) -> DownloadResult<DeliveryId> {
        self.throttle.until_ready().await;

        let request = FetchRequest {
            track_id: job.track_id.clone(),
            artifact_stem: artifact.stem().to_path_buf(),
            max_file_size_bytes: self.config.max_file_size_bytes,
            max_duration_seconds: self.config.max_duration_seconds,
        };

        debug!("Fetching {} for user {}", job.track_id, user_id);
        let produced: PathBuf =
            match tokio::time::timeout(self.config.fetch_timeout, self.fetcher.fetch(&request))
                .await
            {
                Ok(Ok(path)) => path,
                Ok(Err(failure)) => return Err(failure.into()),
                Err(_) => {
                    return Err(FetchFailure::Unknown(format!(
                        "fetch timed out after {}s",
                        self.config.fetch_timeout.as_secs()
                    ))
                    .into())
                }
            };
        artifact.set_produced(produced.clone());

        let size = tokio::fs::metadata(&produced)
            .await
            .map_err(|e| {
                FetchFailure::Unknown(format!(
                    "fetched file {} is not readable: {}",
                    produced.display(),
                    e
                ))
            })?
            .len();
        if size > self.config.max_file_size_bytes {
            return Err(FetchFailure::TooLarge {
                reason: format!(
                    "file is {} bytes, limit is {}",
                    size, self.config.max_file_size_bytes
                ),
            }
            .into());
        }

        debug!("Delivering {} ({} bytes) to user {}", job.track_id, size, user_id);
        let delivery_id = self
            .transport
            .deliver(user_id, &produced, &job.delivery_metadata())
            .await?;
        Ok(delivery_id)
    }

    /// Record the download and charge the quota after confirmed delivery
    ///
    /// Failures here are logged but never undo a delivery.
    async fn settle(
        &self,
        user_id: UserId,
        track: Track,
        job: &DownloadJob,
        delivery_id: DeliveryId,
        eligibility: Eligibility,
    ) -> DownloadReceipt {
        let mut accounting_complete = true;

        if let Err(e) = self.quota.store().record_download(&job.record(user_id)).await {
            error!(
                "Failed to record download of {} for user {}: {}",
                job.track_id, user_id, e
            );
            accounting_complete = false;
        }

        let charged = match self.quota.commit(user_id, job.path).await {
            Ok(charged) => charged,
            Err(e) => {
                error!(
                    "Failed to charge {} quota for user {}: {}",
                    job.path, user_id, e
                );
                accounting_complete = false;
                job.path
            }
        };

        let remaining_daily = match charged {
            ConsumptionPath::Premium => UNLIMITED,
            ConsumptionPath::Daily => (eligibility.remaining_daily - 1).max(0),
            ConsumptionPath::Bonus => eligibility.remaining_daily.max(0),
        };

        DownloadReceipt {
            delivery_id,
            track,
            path: charged,
            remaining_daily,
            accounting_complete,
        }
    }
}
