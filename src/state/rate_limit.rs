//! Sliding-window limiter for session join attempts.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;

/// Error returned when a user exceeded the allowed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("too many join attempts: max {max} per {window:?}")]
pub struct RateLimited {
    /// Allowed attempts in the window.
    pub max: usize,
    /// Window length.
    pub window: Duration,
    /// Time until the oldest attempt leaves the window.
    pub retry_after: Duration,
}

/// Per-user sliding window of attempt timestamps.
pub struct JoinRateLimiter {
    max_attempts: usize,
    window: Duration,
    attempts: DashMap<String, Vec<Instant>>,
}

impl JoinRateLimiter {
    /// Build a limiter allowing `max_attempts` per `window`.
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            attempts: DashMap::new(),
        }
    }

    /// Record an attempt for `user_id`, failing when the window is already full.
    pub fn check(&self, user_id: &str) -> Result<(), RateLimited> {
        self.check_at(user_id, Instant::now())
    }

    fn check_at(&self, user_id: &str, now: Instant) -> Result<(), RateLimited> {
        let mut entries = self.attempts.entry(user_id.to_owned()).or_default();
        entries.retain(|t| now.duration_since(*t) < self.window);

        if entries.len() >= self.max_attempts {
            let oldest = entries.first().copied().unwrap_or(now);
            return Err(RateLimited {
                max: self.max_attempts,
                window: self.window,
                retry_after: self.window.saturating_sub(now.duration_since(oldest)),
            });
        }

        entries.push(now);
        Ok(())
    }

    /// Drop users whose attempts all fell out of the window and return how many went.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    fn prune_at(&self, now: Instant) -> usize {
        let before = self.attempts.len();
        self.attempts.retain(|_, entries| {
            entries.retain(|t| now.duration_since(*t) < self.window);
            !entries.is_empty()
        });
        before.saturating_sub(self.attempts.len())
    }

    /// Users currently holding at least one recorded attempt.
    pub fn tracked_users(&self) -> usize {
        self.attempts.len()
    }
}
