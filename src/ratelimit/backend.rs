//! Limiter trait for abstracting the admission algorithm.

use super::counter::Decision;
use super::policy::Policy;

/// Trait for rate limiter implementations.
///
/// The admission layer only sees this trait, so the fixed-window
/// [`RateLimiter`](super::RateLimiter) can be replaced by a sliding-window or
/// token-bucket implementation without touching the HTTP side.
///
/// `allow` is called on every request from many tasks at once. It must not
/// block on I/O and must not fail.
pub trait Limiter: Send + Sync {
    /// Decide whether the caller identified by `key` may proceed.
    fn allow(&self, key: &str) -> Decision;

    /// The policy this limiter enforces.
    fn policy(&self) -> &Policy;
}
