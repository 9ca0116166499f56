//! Per-identity sliding-window request admission
//!
//! Each identity keeps a log of the instants at which its requests were admitted.
//! A request is admitted while fewer than `max_requests` entries fall inside the
//! trailing window ending now; rejected requests are told how long to wait until the
//! oldest entry leaves the window. Unlike fixed buckets, this never admits a burst of
//! `2 * max_requests` across a bucket boundary.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::app::models::UserId;
use crate::constants::limits;

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per window
    pub max_requests: u32,
    /// Length of the trailing window
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: limits::DEFAULT_MAX_REQUESTS,
            window: Duration::from_secs(limits::DEFAULT_WINDOW_SECS),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Seconds until the next request would be admitted (0 when allowed)
    pub wait_seconds: u64,
}

impl RateDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            wait_seconds: 0,
        }
    }

    fn denied(wait_seconds: u64) -> Self {
        Self {
            allowed: false,
            wait_seconds,
        }
    }
}

/// Read-only view of one identity's window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStats {
    pub requests_in_window: u32,
    pub max_requests: u32,
    pub window: Duration,
}

impl RateStats {
    pub fn remaining(&self) -> u32 {
        self.max_requests.saturating_sub(self.requests_in_window)
    }
}

/// Ordered admission instants of one identity
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    admitted: VecDeque<Instant>,
}

impl RateWindow {
    /// Drop entries that have left the window ending at `now`
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.admitted.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    fn count_within(&self, now: Instant, window: Duration) -> usize {
        self.admitted
            .iter()
            .filter(|at| now.saturating_duration_since(**at) < window)
            .count()
    }

    pub fn len(&self) -> usize {
        self.admitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }
}

/// Sliding-window log rate limiter keyed by user
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<UserId, RateWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and, when admitted, record a request for `identity`
    pub async fn is_allowed(&self, identity: UserId) -> RateDecision {
        let now = Instant::now();
        let window = self.config.window;
        let max_requests = self.config.max_requests as usize;

        let mut windows = self.windows.lock().await;
        let log = windows.entry(identity).or_default();
        log.prune(now, window);

        if log.admitted.len() < max_requests {
            log.admitted.push_back(now);
            info!(
                "Rate limit check passed for user {}: {}/{} requests",
                identity,
                log.admitted.len(),
                max_requests
            );
            return RateDecision::allowed();
        }

        let wait_seconds = match log.admitted.front() {
            Some(oldest) => Self::wait_seconds(*oldest + window, now),
            // Only reachable with max_requests == 0
            None => Self::wait_seconds(now + window, now),
        };

        warn!(
            "Rate limit exceeded for user {}: wait {} seconds",
            identity, wait_seconds
        );
        RateDecision::denied(wait_seconds)
    }

    /// Whole seconds until `free_at`, rounded up, never below the minimum wait
    fn wait_seconds(free_at: Instant, now: Instant) -> u64 {
        let remaining = free_at.saturating_duration_since(now);
        let mut secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            secs += 1;
        }
        secs.max(limits::MIN_WAIT_SECS)
    }

    /// Current window occupancy for `identity` without recording a request
    pub async fn stats(&self, identity: UserId) -> RateStats {
        let now = Instant::now();
        let windows = self.windows.lock().await;
        let requests_in_window = windows
            .get(&identity)
            .map_or(0, |log| log.count_within(now, self.config.window));

        RateStats {
            requests_in_window: requests_in_window as u32,
            max_requests: self.config.max_requests,
            window: self.config.window,
        }
    }

    /// Forget the window of one identity
    pub async fn reset_identity(&self, identity: UserId) {
        if self.windows.lock().await.remove(&identity).is_some() {
            info!("Rate limit reset for user {}", identity);
        }
    }

    /// Forget every window
    pub async fn clear_all(&self) {
        self.windows.lock().await.clear();
        info!("All rate limits cleared");
    }

    /// Drop identities whose windows hold no live entries
    pub async fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let window = self.config.window;
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, log| {
            log.prune(now, window);
            !log.is_empty()
        });
        before - windows.len()
    }

    /// Number of identities currently tracked
    pub async fn tracked_identities(&self) -> usize {
        self.windows.lock().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
