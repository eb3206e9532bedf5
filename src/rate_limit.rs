//! Per-session sliding-window message rate limiting
//!
//! Each session keeps the send times of its recent messages. A send is
//! permitted while fewer than `limit` of them fall inside the trailing
//! window. Checking never commits; the caller appends the timestamp only
//! once the message is actually accepted, so rejected attempts do not
//! consume quota.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Fixed length of the rate-limit window
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    /// Allow `limit` messages per `RATE_LIMIT_WINDOW`
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            window: RATE_LIMIT_WINDOW,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Drop timestamps that are no longer inside the window ending at `now`.
    ///
    /// Timestamps are appended in order, so pruning stops at the first
    /// entry still inside the window.
    pub fn prune(&self, window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = window.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Prune, then report whether one more send is permitted at `now`.
    pub fn record_and_check(&self, window: &mut VecDeque<Instant>, now: Instant) -> bool {
        self.prune(window, now);
        window.len() < self.limit
    }

    /// Record an accepted send.
    pub fn commit(&self, window: &mut VecDeque<Instant>, now: Instant) {
        window.push_back(now);
    }
}
