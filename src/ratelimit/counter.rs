//! Per-key fixed-window counter.

use std::time::{Duration, Instant};

use super::policy::Policy;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub permitted: bool,
    /// How long a denied caller should wait; zero when permitted
    pub retry_after: Duration,
    /// Quota left in the current window after this call
    pub remaining: u64,
}

impl Decision {
    /// A permit with `remaining` requests left in the window.
    pub fn permit(remaining: u64) -> Self {
        Self {
            permitted: true,
            retry_after: Duration::ZERO,
            remaining,
        }
    }

    /// A denial advising the caller to wait `retry_after`.
    pub fn deny(retry_after: Duration) -> Self {
        Self {
            permitted: false,
            retry_after,
            remaining: 0,
        }
    }

    /// The decision returned when limiting is switched off.
    pub fn unlimited() -> Self {
        Self::permit(u64::MAX)
    }

    /// Retry delay in whole seconds, rounded up and never below one.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self
            .retry_after
            .as_secs()
            .saturating_add(u64::from(self.retry_after.subsec_nanos() > 0));
        secs.max(1)
    }
}

/// Counter and window start for one client key.
///
/// Not synchronised on its own: the limiter holds the map shard lock for
/// the key across every call to [`KeyState::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    count: u64,
    window_start: Instant,
}

impl KeyState {
    /// Fresh state for a key first seen at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Requests admitted in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// When the current window opened.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Roll the window if it has elapsed, then try to take one slot.
    pub fn try_acquire(&mut self, now: Instant, policy: &Policy) -> Decision {
        let window = policy.window();

        // Rollover first so a stale counter never blocks a new window.
        if now.saturating_duration_since(self.window_start) >= window {
            self.count = 0;
            self.window_start = now;
        }

        if self.count < policy.max_requests() {
            self.count += 1;
            return Decision::permit(policy.max_requests() - self.count);
        }

        // A window end past the representable range is treated as a full window.
        let retry_after = self
            .window_start
            .checked_add(window)
            .map_or(window, |end| end.saturating_duration_since(now))
            .min(window);
        Decision::deny(retry_after)
    }

    /// Whether this entry has been idle for at least `horizon`.
    pub fn is_stale(&self, now: Instant, horizon: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= horizon
    }
}
