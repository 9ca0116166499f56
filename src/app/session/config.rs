//! Session cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::session;

/// Configuration for the per-user session cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of cached search results
    pub search_ttl: Duration,
    /// Lifetime of cached chart listings
    pub chart_ttl: Duration,
    /// Lifetime of cached favourites listings
    pub favorites_ttl: Duration,
    /// Number of independently locked shards
    pub shard_count: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            search_ttl: session::SEARCH_RESULTS_TTL,
            chart_ttl: session::CHART_RESULTS_TTL,
            favorites_ttl: session::FAVORITES_TTL,
            shard_count: session::SHARD_COUNT,
        }
    }
}

impl SessionConfig {
    /// Set the search results TTL
    pub fn with_search_ttl(mut self, ttl: Duration) -> Self {
        self.search_ttl = ttl;
        self
    }

    /// Set the shard count (clamped to at least one)
    pub fn with_shard_count(mut self, count: usize) -> Self {
        self.shard_count = count.max(1);
        self
    }
}
