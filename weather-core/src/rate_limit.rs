//! Per-caller fixed-window rate limiting.
//!
//! Windows are aligned to the Unix epoch: with the default one-hour window a
//! caller's count resets whenever the UTC wall-clock hour (date included)
//! changes, regardless of how far into the previous hour the first request was.
//!
//! Counters live in memory only and are lost on restart. Entries for windows
//! that have already ended can be dropped with [`RateLimiter::purge_stale`].

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// Source of wall-clock time for window calculations.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerUsage {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

#[derive(Debug)]
pub struct RateLimiter {
    usage: DashMap<String, CallerUsage>,
    max_requests: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            usage: DashMap::new(),
            max_requests,
            // A zero-length window would divide by zero below.
            window: window.max(Duration::from_secs(1)),
            clock,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_requests,
            Duration::from_secs(config.window_secs),
            Arc::new(SystemClock),
        )
    }

    /// Count a request from `caller_key` if it is still under the limit.
    ///
    /// The limit is checked before incrementing, and both happen while the map
    /// entry for `caller_key` is locked, so concurrent calls for the same key can
    /// never push the count past `max_requests`.
    pub fn check_and_record(&self, caller_key: &str) -> RateDecision {
        let now = self.clock.now();
        let window_start = self.window_start(now);

        let mut usage = self
            .usage
            .entry(caller_key.to_owned())
            .or_insert(CallerUsage {
                count: 0,
                window_start,
            });

        if usage.window_start < window_start {
            tracing::debug!(
                previous_window = %usage.window_start,
                window = %window_start,
                "Resetting rate limit window"
            );
            usage.count = 0;
            usage.window_start = window_start;
        }

        if usage.count >= self.max_requests {
            return RateDecision::Limited {
                retry_after: self.retry_after(usage.window_start, now),
            };
        }

        usage.count += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - usage.count,
        }
    }

    /// Current usage for `caller_key`, if it has made any request.
    pub fn usage(&self, caller_key: &str) -> Option<CallerUsage> {
        self.usage.get(caller_key).map(|entry| *entry)
    }

    /// Drop entries whose window has ended. Returns the number removed.
    pub fn purge_stale(&self) -> usize {
        let current = self.window_start(self.clock.now());
        let before = self.usage.len();
        self.usage.retain(|_, usage| usage.window_start >= current);
        before.saturating_sub(self.usage.len())
    }

    pub fn tracked_callers(&self) -> usize {
        self.usage.len()
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    fn window_secs(&self) -> i64 {
        i64::try_from(self.window.as_secs()).unwrap_or(i64::MAX)
    }

    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.window_secs();
        let start = now.timestamp().div_euclid(secs) * secs;
        DateTime::from_timestamp(start, 0).unwrap_or(now)
    }

    fn retry_after(&self, window_start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let window_end = window_start.timestamp().saturating_add(self.window_secs());
        let remaining = window_end.saturating_sub(now.timestamp()).max(1);
        Duration::from_secs(remaining.unsigned_abs())
    }
}
