//! Process-wide pacing of outbound fetches

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Jitter, Quota, RateLimiter};

/// Spreads fetch starts so the upstream platform is not hammered
#[derive(Debug)]
pub struct FetchThrottle {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl FetchThrottle {
    /// Allow `rate_limit_rps` fetch starts per second; 0 disables throttling
    pub fn new(rate_limit_rps: u32) -> Self {
        let limiter = NonZeroU32::new(rate_limit_rps)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));
        Self { limiter }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Wait for a fetch slot
    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            // Jitter avoids synchronized bursts after a quiet period
            limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                .await;
        }
    }
}
