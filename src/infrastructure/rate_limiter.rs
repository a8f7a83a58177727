//! Request pacing for upstream API calls.
//!
//! Implements a fixed-interval limiter: admissions are spaced at least
//! `ceil(60000 / requests_per_minute)` ms apart and granted in arrival order.
//! Limiters are shared process-wide per `(key, requests_per_minute)` so that
//! every client talking to the same base URL draws from one budget.

use crate::config::interval_for_budget;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Fixed-interval FIFO limiter.
///
/// `tokio::sync::Mutex` queues waiters fairly, so callers are admitted in
/// the order they called [`FixedIntervalLimiter::wait_turn`].
#[derive(Debug)]
pub struct FixedIntervalLimiter {
    interval: Duration,
    next_allowed: tokio::sync::Mutex<Option<Instant>>,
}

impl FixedIntervalLimiter {
    /// Create a limiter for the given budget; values below 1 are treated as 1.
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            interval: interval_for_budget(requests_per_minute),
            next_allowed: tokio::sync::Mutex::new(None),
        }
    }

    /// Minimum spacing between two admissions.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until this caller may issue one request.
    ///
    /// The first call on a fresh limiter returns immediately. A dropped waiter
    /// leaves the schedule untouched.
    pub async fn wait_turn(&self) {
        let mut next_allowed = self.next_allowed.lock().await;
        if let Some(at) = *next_allowed {
            let now = Instant::now();
            if at > now {
                debug!("Rate limiter holding request for {:?}", at - now);
                tokio::time::sleep_until(at).await;
            }
        }
        *next_allowed = Some(Instant::now() + self.interval);
    }
}

type LimiterKey = (String, u32);

static SHARED_LIMITERS: Lazy<Mutex<HashMap<LimiterKey, Arc<FixedIntervalLimiter>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Process-wide limiter for `(key, requests_per_minute)`.
///
/// Repeated calls with the same pair return the same instance; a different
/// budget for the same key yields a distinct limiter.
pub fn shared_limiter(key: &str, requests_per_minute: u32) -> Arc<FixedIntervalLimiter> {
    let budget = requests_per_minute.max(1);
    let mut registry = SHARED_LIMITERS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    registry
        .entry((key.to_string(), budget))
        .or_insert_with(|| Arc::new(FixedIntervalLimiter::new(budget)))
        .clone()
}
