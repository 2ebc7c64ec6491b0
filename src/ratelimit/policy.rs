//! Immutable rate limit policy.

use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// The admission policy applied to every client key.
///
/// Built once at startup and never mutated. A malformed policy is rejected
/// here, so no request can reach a limiter configured with one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    max_requests: u64,
    window: Duration,
    enabled: bool,
}

impl Policy {
    /// Create a policy admitting `max_requests` per `window`.
    ///
    /// Fails when the policy is enabled and either the limit or the window
    /// is zero. A disabled policy accepts any values.
    pub fn new(max_requests: u64, window: Duration, enabled: bool) -> Result<Self> {
        if enabled {
            if max_requests == 0 {
                return Err(TurnstileError::InvalidPolicy(
                    "max_requests must be greater than zero".to_string(),
                ));
            }
            if window.is_zero() {
                return Err(TurnstileError::InvalidPolicy(
                    "window must be greater than zero".to_string(),
                ));
            }
        }

        Ok(Self {
            max_requests,
            window,
            enabled,
        })
    }

    /// A policy that admits everything.
    pub fn disabled() -> Self {
        Self {
            max_requests: 0,
            window: Duration::ZERO,
            enabled: false,
        }
    }

    /// Maximum requests admitted per key in one window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Length of a window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether the limiter enforces anything at all.
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}
