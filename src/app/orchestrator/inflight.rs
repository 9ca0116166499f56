//! Per-user in-flight markers
//!
//! At most one download runs per user. A second selection that arrives while the
//! first is still executing is turned away instead of fetching and charging twice.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::app::models::UserId;

type ActiveSet = Arc<Mutex<HashSet<UserId>>>;

fn lock(active: &ActiveSet) -> MutexGuard<'_, HashSet<UserId>> {
    // The set stays consistent even if a holder panicked
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of users with a download in progress
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    active: ActiveSet,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `user_id` as busy, or `None` if a download is already running for them
    pub fn try_acquire(&self, user_id: UserId) -> Option<InFlightTicket> {
        if lock(&self.active).insert(user_id) {
            Some(InFlightTicket {
                user_id,
                active: Arc::clone(&self.active),
            })
        } else {
            None
        }
    }

    pub fn is_active(&self, user_id: UserId) -> bool {
        lock(&self.active).contains(&user_id)
    }

    /// Number of users with a download in progress
    pub fn len(&self) -> usize {
        lock(&self.active).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Marker held for the duration of one download; released on drop
#[derive(Debug)]
pub struct InFlightTicket {
    user_id: UserId,
    active: ActiveSet,
}

impl InFlightTicket {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected_until_drop() {
        let registry = InFlightRegistry::new();

        let ticket = registry.try_acquire(1).unwrap();
        assert!(registry.try_acquire(1).is_none());
        assert!(registry.try_acquire(2).is_some());
        assert!(registry.is_active(1));

        drop(ticket);
        assert!(!registry.is_active(1));
        assert!(registry.try_acquire(1).is_some());
    }

    #[test]
    fn test_ticket_released_on_panic() {
        let registry = InFlightRegistry::new();
        let cloned = registry.clone();

        let result = std::panic::catch_unwind(move || {
            let _ticket = cloned.try_acquire(9).unwrap();
            panic!("download task failed");
        });

        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
