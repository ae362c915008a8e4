//! Sliding-window rate limiting for the dispatch boundary.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const GLOBAL_KEY: &str = "*";

/// Shared window for callers the dispatcher cannot resolve to an agent.
///
/// Keying unresolved names individually would let arbitrary strings grow the
/// window map without bound.
pub const UNKNOWN_CALLER: &str = "<unknown>";

/// Configuration for a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Maximum number of requests allowed in the window.
    pub max_requests: u32,
    /// Length of the sliding window.
    pub window: Duration,
    /// Minimum time a caller is rejected for once the limit trips.
    pub cooldown: Duration,
}

impl RateLimit {
    /// Creates a limit of `max_requests` per `window` with no cooldown.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            cooldown: Duration::ZERO,
        }
    }

    /// Creates a limit of N requests per minute.
    #[must_use]
    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    /// Sets the cooldown.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::per_minute(60).with_cooldown(Duration::from_secs(1))
    }
}

/// Which callers share a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    /// Each agent has its own window.
    #[default]
    PerAgent,
    /// One window for every caller.
    Global,
}

/// Returned when a caller exceeds its rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limit exceeded; retry after {}ms", retry_after.as_millis())]
pub struct RateLimitExceeded {
    /// Time until the next request will be accepted.
    pub retry_after: Duration,
}

#[derive(Debug, Default)]
struct WindowTracker {
    requests: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

impl WindowTracker {
    fn try_request(&mut self, limit: &RateLimit, now: Instant) -> Result<(), RateLimitExceeded> {
        if let Some(until) = self.blocked_until {
            if until > now {
                return Err(RateLimitExceeded {
                    retry_after: until - now,
                });
            }
            self.blocked_until = None;
        }

        while self
            .requests
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= limit.window)
        {
            self.requests.pop_front();
        }

        if self.requests.len() < limit.max_requests as usize {
            self.requests.push_back(now);
            return Ok(());
        }

        let slot_free = self
            .requests
            .front()
            .map_or(now, |oldest| *oldest + limit.window);
        let until = slot_free.max(now + limit.cooldown);
        self.blocked_until = Some(until);
        Err(RateLimitExceeded {
            retry_after: until - now,
        })
    }

    fn is_idle(&self, limit: &RateLimit, now: Instant) -> bool {
        self.blocked_until.is_none_or(|until| until <= now)
            && self
                .requests
                .back()
                .is_none_or(|newest| now.duration_since(*newest) >= limit.window)
    }

    fn remaining(&self, limit: &RateLimit, now: Instant) -> u32 {
        if self.blocked_until.is_some_and(|until| until > now) {
            return 0;
        }
        let live = self
            .requests
            .iter()
            .filter(|at| now.duration_since(**at) < limit.window)
            .count();
        limit
            .max_requests
            .saturating_sub(u32::try_from(live).unwrap_or(u32::MAX))
    }
}

/// Sliding-window limiter keyed by agent or shared globally.
///
/// Rejects rather than queues: an over-limit call fails immediately with
/// [`RateLimitExceeded`].
#[derive(Debug)]
pub struct RateLimiter {
    limit: RateLimit,
    scope: RateLimitScope,
    windows: Mutex<HashMap<String, WindowTracker>>,
}

impl RateLimiter {
    /// Creates a limiter.
    #[must_use]
    pub fn new(limit: RateLimit, scope: RateLimitScope) -> Self {
        Self {
            limit,
            scope,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configured limit.
    #[must_use]
    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Returns the configured scope.
    #[must_use]
    pub fn scope(&self) -> RateLimitScope {
        self.scope
    }

    /// Records a request from `agent`.
    ///
    /// Pass [`UNKNOWN_CALLER`] rather than an unvetted name. Windows that
    /// have emptied out are dropped whenever a new caller is first seen.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitExceeded`] when the window is full or the caller is
    /// still cooling down.
    pub fn check(&self, agent: &str) -> Result<(), RateLimitExceeded> {
        self.check_at(agent, Instant::now())
    }

    /// Returns how many requests `agent` may still make in the current window.
    #[must_use]
    pub fn remaining(&self, agent: &str) -> u32 {
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows
            .get(self.key(agent))
            .map_or(self.limit.max_requests, |tracker| {
                tracker.remaining(&self.limit, Instant::now())
            })
    }

    /// Forgets all recorded requests.
    pub fn reset(&self) {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn check_at(&self, agent: &str, now: Instant) -> Result<(), RateLimitExceeded> {
        let key = self.key(agent);
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        if !windows.contains_key(key) {
            windows.retain(|_, tracker| !tracker.is_idle(&self.limit, now));
        }
        let outcome = windows
            .entry(key.to_owned())
            .or_default()
            .try_request(&self.limit, now);
        if let Err(err) = &outcome {
            warn!(agent, scope = ?self.scope, retry_after_ms = err.retry_after.as_millis(), "rate limit exceeded");
        }
        outcome
    }

    fn key<'a>(&self, agent: &'a str) -> &'a str {
        match self.scope {
            RateLimitScope::PerAgent => agent,
            RateLimitScope::Global => GLOBAL_KEY,
        }
    }
}
