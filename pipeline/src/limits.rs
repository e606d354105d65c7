//! Per-user daily quotas and the single-flight concurrency guard.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::warn;

use shared::{AssistantStore, LimitsConfig, Mode};

use crate::texts::quota_reply;

/// Outcome of a quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    /// Carries the user-facing refusal.
    Exceeded(String),
}

/// Daily limiter over persisted message counts, with the boost override.
pub struct RateLimiter {
    store: Arc<dyn AssistantStore>,
    config: LimitsConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn AssistantStore>, config: LimitsConfig) -> Self {
        Self { store, config }
    }

    /// Effective limit for the mode right now, honoring an active boost.
    /// A boost raises both counters simultaneously.
    pub async fn effective_limit(&self, user_id: i64, mode: Mode) -> i64 {
        let boosted = match self.store.boost_until(user_id).await {
            Ok(Some(until)) => until > Utc::now(),
            Ok(None) => false,
            Err(error) => {
                warn!(user_id, error = %error, "Boost lookup failed, using base limit");
                false
            }
        };

        match (mode, boosted) {
            (Mode::Chat, false) => self.config.daily_chat_limit,
            (Mode::Chat, true) => self.config.boosted_chat_limit,
            (Mode::Country, false) => self.config.daily_country_limit,
            (Mode::Country, true) => self.config.boosted_country_limit,
        }
    }

    /// Check the user's quota for the mode. Storage failures fail open:
    /// a broken counter must not lock users out.
    pub async fn check(&self, user_id: i64, mode: Mode) -> QuotaDecision {
        let limit = self.effective_limit(user_id, mode).await;

        let used = match self.store.daily_message_count(user_id, mode).await {
            Ok(count) => count,
            Err(error) => {
                warn!(user_id, error = %error, "Daily count failed, allowing request");
                return QuotaDecision::Allowed;
            }
        };

        if used >= limit {
            QuotaDecision::Exceeded(quota_reply(limit))
        } else {
            QuotaDecision::Allowed
        }
    }
}

/// Per-user single-flight guard: one in-flight request per user, later
/// arrivals are rejected immediately (no queueing).
#[derive(Default)]
pub struct ConcurrencyGuard {
    busy: Mutex<HashSet<i64>>,
}

impl ConcurrencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the user busy. `None` means a request is already in flight.
    /// The returned token releases the flag on drop, on every exit path.
    pub fn try_acquire(&self, user_id: i64) -> Option<BusyToken<'_>> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(user_id) {
            return None;
        }
        Some(BusyToken {
            guard: self,
            user_id,
        })
    }

    fn release(&self, user_id: i64) {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        busy.remove(&user_id);
    }
}

/// RAII handle for one user's busy flag.
pub struct BusyToken<'a> {
    guard: &'a ConcurrencyGuard,
    user_id: i64,
}

impl Drop for BusyToken<'_> {
    fn drop(&mut self) {
        self.guard.release(self.user_id);
    }
}
