//! Download quota decisions and consumption
//!
//! Eligibility is checked before a download starts and charged only after the track
//! has been delivered, so a failed download never costs the user anything. The
//! decision order is premium, then the free daily counter, then bonus credits.

use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::collaborators::DownloadStore;
use crate::app::models::{ConsumptionPath, QuotaState, UserId};
use crate::constants::quota::{DEFAULT_DAILY_FREE_LIMIT, UNLIMITED};
use crate::errors::StorageResult;

/// Quota configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Free downloads per user per calendar day
    pub daily_limit: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_FREE_LIMIT,
        }
    }
}

/// Outcome of an eligibility check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub can_download: bool,
    /// Free downloads left today; `-1` for premium users
    pub remaining_daily: i64,
    /// Bonus credits on the account (only looked up once the daily quota is spent)
    pub bonus_available: u32,
    /// Allowance that would pay for the download
    pub path: Option<ConsumptionPath>,
}

impl Eligibility {
    fn premium() -> Self {
        Self {
            can_download: true,
            remaining_daily: UNLIMITED,
            bonus_available: 0,
            path: Some(ConsumptionPath::Premium),
        }
    }

    fn daily(remaining: i64) -> Self {
        Self {
            can_download: true,
            remaining_daily: remaining,
            bonus_available: 0,
            path: Some(ConsumptionPath::Daily),
        }
    }

    fn bonus(available: u32) -> Self {
        Self {
            can_download: true,
            remaining_daily: 0,
            bonus_available: available,
            path: Some(ConsumptionPath::Bonus),
        }
    }

    fn exhausted() -> Self {
        Self {
            can_download: false,
            remaining_daily: 0,
            bonus_available: 0,
            path: None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.remaining_daily == UNLIMITED
    }
}

/// Current calendar date used to key daily counters
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Decides and commits download eligibility against a [`DownloadStore`]
#[derive(Clone)]
pub struct QuotaCoordinator {
    store: Arc<dyn DownloadStore>,
    config: QuotaConfig,
}

impl QuotaCoordinator {
    pub fn new(store: Arc<dyn DownloadStore>, config: QuotaConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DownloadStore> {
        &self.store
    }

    /// Decide whether `user_id` may download now, without consuming anything
    pub async fn check_eligibility(&self, user_id: UserId) -> StorageResult<Eligibility> {
        let premium = self.store.get_premium_status(user_id).await?;
        if premium.is_active_at(Utc::now()) {
            debug!("User {} is premium, download allowed", user_id);
            return Ok(Eligibility::premium());
        }

        let used = self.store.get_daily_count(user_id, today()).await?;
        let remaining = i64::from(self.config.daily_limit) - i64::from(used);
        if remaining > 0 {
            debug!(
                "User {} has {} of {} free downloads left today",
                user_id, remaining, self.config.daily_limit
            );
            return Ok(Eligibility::daily(remaining));
        }

        let bonus = self.store.get_bonus_credits(user_id).await?;
        if bonus > 0 {
            debug!("User {} falls back to {} bonus credits", user_id, bonus);
            return Ok(Eligibility::bonus(bonus));
        }

        info!("User {} has exhausted today's download quota", user_id);
        Ok(Eligibility::exhausted())
    }

    /// Charge one download to `path`, returning the allowance actually charged
    ///
    /// Call only after the download has been delivered. A bonus credit that was spent
    /// by a concurrent download in the meantime is replaced by a daily charge, so a
    /// delivered track is never left unaccounted.
    pub async fn commit(
        &self,
        user_id: UserId,
        path: ConsumptionPath,
    ) -> StorageResult<ConsumptionPath> {
        match path {
            ConsumptionPath::Premium => Ok(ConsumptionPath::Premium),
            ConsumptionPath::Daily => {
                let count = self.store.increment_daily_count(user_id, today()).await?;
                debug!("User {} daily count is now {}", user_id, count);
                Ok(ConsumptionPath::Daily)
            }
            ConsumptionPath::Bonus => {
                if self.store.consume_bonus_credit(user_id).await? {
                    debug!("Consumed bonus credit for user {}", user_id);
                    return Ok(ConsumptionPath::Bonus);
                }
                warn!(
                    "Bonus credit for user {} was already spent, charging the daily counter",
                    user_id
                );
                self.store.increment_daily_count(user_id, today()).await?;
                Ok(ConsumptionPath::Daily)
            }
        }
    }

    /// Assemble the user's counters
    pub async fn snapshot(&self, user_id: UserId) -> StorageResult<QuotaState> {
        let premium = self.store.get_premium_status(user_id).await?;
        Ok(QuotaState {
            daily_count: self.store.get_daily_count(user_id, today()).await?,
            bonus_credits: self.store.get_bonus_credits(user_id).await?,
            is_premium: premium.is_premium,
            premium_until: premium.until,
        })
    }
}
