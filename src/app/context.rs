//! Explicit application context
//!
//! [`AppContext`] wires the admission and download components together and is the
//! entry point a bot front end talks to: admit a search, remember its results, page
//! through them and turn a selection into a download.

use std::sync::Arc;

use tracing::debug;

use crate::app::collaborators::{DownloadStore, Fetcher, Transport};
use crate::app::janitor::SweepTargets;
use crate::app::limiter::{RateDecision, RateLimitConfig, RateLimiter};
use crate::app::models::{SearchSession, Track, UserId};
use crate::app::orchestrator::{DownloadOrchestrator, DownloadReceipt, OrchestratorConfig, Selection};
use crate::app::quota::{Eligibility, QuotaConfig, QuotaCoordinator};
use crate::app::session::{SessionCache, SessionConfig, SessionKey, SessionScope};
use crate::constants::session::PAGE_SIZE;
use crate::errors::{DownloadResult, StorageResult};

/// Runtime settings of the components owned by [`AppContext`]
#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub quota: QuotaConfig,
    pub orchestrator: OrchestratorConfig,
}

/// One page of a cached listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    pub query: String,
    /// 0-based page index, clamped to the last page
    pub page: usize,
    pub total_pages: usize,
    pub total_tracks: usize,
    /// Tracks with their 1-based selection numbers
    pub entries: Vec<(usize, Track)>,
}

impl SearchPage {
    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }
}

/// Shared components of a running bot
pub struct AppContext {
    config: ContextConfig,
    sessions: Arc<SessionCache<SearchSession>>,
    limiter: Arc<RateLimiter>,
    quota: QuotaCoordinator,
    orchestrator: DownloadOrchestrator,
}

impl AppContext {
    pub fn new(
        config: ContextConfig,
        store: Arc<dyn DownloadStore>,
        fetcher: Arc<dyn Fetcher>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let sessions = Arc::new(SessionCache::new(&config.session));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let quota = QuotaCoordinator::new(store, config.quota);
        let orchestrator = DownloadOrchestrator::new(
            config.orchestrator.clone(),
            sessions.clone(),
            quota.clone(),
            fetcher,
            transport,
        );

        Self {
            config,
            sessions,
            limiter,
            quota,
            orchestrator,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionCache<SearchSession>> {
        &self.sessions
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn quota(&self) -> &QuotaCoordinator {
        &self.quota
    }

    pub fn orchestrator(&self) -> &DownloadOrchestrator {
        &self.orchestrator
    }

    /// State the janitor's sweep tick should tidy
    pub fn sweep_targets(&self) -> SweepTargets {
        SweepTargets {
            sessions: Some(self.sessions.clone()),
            limiter: Some(self.limiter.clone()),
        }
    }

    /// Rate-limit a search request from `user_id`
    pub async fn admit_search(&self, user_id: UserId) -> RateDecision {
        self.limiter.is_allowed(user_id).await
    }

    /// Cache search results as the user's current listing
    pub async fn remember_search(&self, user_id: UserId, query: impl Into<String>, tracks: Vec<Track>) {
        let session = SearchSession {
            query: query.into(),
            tracks,
        };
        debug!(
            "Caching {} results for user {}",
            session.tracks.len(),
            user_id
        );
        self.sessions
            .set(SessionKey::search(user_id), session, self.config.session.search_ttl)
            .await;
    }

    /// Cache a chart listing, which lives longer than search results
    pub async fn remember_chart(&self, user_id: UserId, title: impl Into<String>, tracks: Vec<Track>) {
        let session = SearchSession {
            query: title.into(),
            tracks,
        };
        self.sessions
            .set(
                SessionKey::new(user_id, SessionScope::Chart),
                session,
                self.config.session.chart_ttl,
            )
            .await;
    }

    /// Cache a user's favourites listing so its entries can be selected
    pub async fn remember_favorites(&self, user_id: UserId, tracks: Vec<Track>) {
        let session = SearchSession {
            query: "favorites".to_string(),
            tracks,
        };
        self.sessions
            .set(
                SessionKey::new(user_id, SessionScope::Favorites),
                session,
                self.config.session.favorites_ttl,
            )
            .await;
    }

    /// Page `page` (0-based) of a cached listing, `None` once it has expired
    pub async fn page(&self, user_id: UserId, scope: SessionScope, page: usize) -> Option<SearchPage> {
        let session = self.sessions.get(&SessionKey::new(user_id, scope)).await?;
        Some(paginate(session, page, PAGE_SIZE))
    }

    /// Turn a selection into a delivered download
    pub async fn select(&self, user_id: UserId, selection: Selection) -> DownloadResult<DownloadReceipt> {
        self.orchestrator.execute(user_id, selection).await
    }

    /// Current download allowance of `user_id`
    pub async fn quota_status(&self, user_id: UserId) -> StorageResult<Eligibility> {
        self.quota.check_eligibility(user_id).await
    }
}

fn paginate(session: SearchSession, page: usize, page_size: usize) -> SearchPage {
    let total_tracks = session.tracks.len();
    let total_pages = total_tracks.div_ceil(page_size).max(1);
    let page = page.min(total_pages - 1);
    let start = page * page_size;

    let entries = session
        .tracks
        .into_iter()
        .enumerate()
        .skip(start)
        .take(page_size)
        .map(|(index, track)| (index + 1, track))
        .collect();

    SearchPage {
        query: session.query,
        page,
        total_pages,
        total_tracks,
        entries,
    }
}
