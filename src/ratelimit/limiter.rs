//! Core rate limiter implementation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::backend::Limiter;
use super::clock::{Clock, SystemClock};
use super::counter::{Decision, KeyState};
use super::policy::Policy;
use super::sweep::Retention;

/// Key state plus the insertion sequence used to match eviction order
/// entries against the live map.
#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: KeyState,
    seq: u64,
}

/// Fixed-window rate limiter keyed by client identifier.
///
/// Key states live in a sharded map. A decision holds the write lock of the
/// key's shard for the whole read-modify-write, so updates to one key are
/// linearizable and concurrent callers can never be granted more than
/// `max_requests` permits in a window. Distinct keys on different shards
/// proceed in parallel.
///
/// When a key cap is configured, keys are also queued in first-seen order.
/// A new key arriving at the cap evicts from the front of that queue, so
/// admission never scans or sweeps the map.
///
/// This struct is thread-safe and is shared across request tasks behind an
/// `Arc`.
pub struct RateLimiter<C: Clock = SystemClock> {
    /// Policy applied to every key
    policy: Policy,
    /// How long idle entries are kept and how many may be tracked
    retention: Retention,
    /// Per-key state indexed by client key
    keys: DashMap<String, Tracked>,
    /// First-seen order of keys, maintained only when a cap is set.
    /// Lock order: `order` before any map shard.
    order: Mutex<VecDeque<(String, u64)>>,
    next_seq: AtomicU64,
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Create a rate limiter driven by the system clock.
    pub fn new(policy: Policy) -> Self {
        Self::with_clock(policy, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter reading time from `clock`.
    pub fn with_clock(policy: Policy, clock: C) -> Self {
        Self {
            policy,
            retention: Retention::default(),
            keys: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            next_seq: AtomicU64::new(0),
            clock,
        }
    }

    /// Replace the retention settings.
    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    /// Check and consume quota for `key`.
    pub fn allow(&self, key: &str) -> Decision {
        if !self.policy.enabled() {
            return Decision::unlimited();
        }

        let now = self.clock.now();

        // Fast path: the key is already tracked, no allocation needed.
        let decision = match self.keys.get_mut(key) {
            Some(mut tracked) => tracked.state.try_acquire(now, &self.policy),
            None => self.admit_new(key, now),
        };

        if decision.permitted {
            trace!(key = %key, remaining = decision.remaining, "Request admitted");
        } else {
            debug!(
                key = %key,
                retry_after_ms = decision.retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Slow path of [`allow`](Self::allow) for a key not seen in the map.
    fn admit_new(&self, key: &str, now: Instant) -> Decision {
        let cap = self.retention.max_tracked_keys;
        if let Some(cap) = cap {
            if self.keys.len() >= cap {
                self.evict_one(cap, now);
            }
        }

        // Another caller may have inserted the key since the fast path missed.
        let (decision, inserted) = match self.keys.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                (occupied.get_mut().state.try_acquire(now, &self.policy), None)
            }
            Entry::Vacant(vacant) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                let mut state = KeyState::new(now);
                let decision = state.try_acquire(now, &self.policy);
                vacant.insert(Tracked { state, seq });
                (decision, Some(seq))
            }
        };

        // The shard guard is released above; queue after inserting.
        if let (Some(seq), Some(_)) = (inserted, cap) {
            self.order.lock().push_back((key.to_owned(), seq));
        }

        decision
    }

    /// Evict the earliest-seen key still tracked.
    ///
    /// Returns the number of order entries inspected. Entries whose key was
    /// already removed (or removed and re-inserted) are discarded on the way,
    /// and [`sweep`](Self::sweep) prunes them in bulk, so this is O(1)
    /// amortized.
    fn evict_one(&self, cap: usize, now: Instant) -> usize {
        let mut order = self.order.lock();
        let mut inspected = 0;

        while let Some((victim, seq)) = order.pop_front() {
            inspected += 1;
            if let Some((_, tracked)) = self.keys.remove_if(&victim, |_, t| t.seq == seq) {
                warn!(
                    evicted = %victim,
                    cap,
                    age_ms = now
                        .saturating_duration_since(tracked.state.window_start())
                        .as_millis() as u64,
                    "Key cap reached, evicting earliest-seen entry"
                );
                break;
            }
        }

        inspected
    }

    /// Remove every entry idle for at least the eviction horizon.
    ///
    /// Returns the number of entries removed. Uses the same shard locks as
    /// [`allow`](Self::allow), so an in-flight decision for a key is never
    /// lost to a concurrent sweep.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let horizon = self.retention.horizon(self.policy.window());
        let mut removed = 0;

        self.keys.retain(|_, tracked| {
            let keep = !tracked.state.is_stale(now, horizon);
            if !keep {
                removed += 1;
            }
            keep
        });

        if self.retention.max_tracked_keys.is_some() {
            self.prune_order();
        }

        if removed > 0 {
            debug!(
                removed,
                remaining = self.keys.len(),
                horizon_ms = horizon.as_millis() as u64,
                "Evicted stale rate limit entries"
            );
        }

        removed
    }

    /// Drop order entries that no longer match a tracked key.
    ///
    /// Filtering runs without the order lock held; keys queued meanwhile
    /// stay behind the surviving older entries.
    fn prune_order(&self) {
        let pending = std::mem::take(&mut *self.order.lock());

        let mut kept: VecDeque<(String, u64)> = pending
            .into_iter()
            .filter(|(key, seq)| self.keys.get(key).is_some_and(|t| t.seq == *seq))
            .collect();

        let mut order = self.order.lock();
        kept.extend(order.drain(..));
        *order = kept;
    }

    /// The policy this limiter enforces.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// The retention settings in effect.
    pub fn retention(&self) -> &Retention {
        &self.retention
    }

    /// Requests admitted for `key` in its current window.
    ///
    /// Returns `None` if the key is not tracked.
    pub fn count_for(&self, key: &str) -> Option<u64> {
        self.keys.get(key).map(|tracked| tracked.state.count())
    }

    /// Get the number of tracked keys.
    pub fn tracked_keys(&self) -> usize {
        self.keys.len()
    }

    /// Clear all key state.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        let mut order = self.order.lock();
        self.keys.clear();
        order.clear();
    }
}

impl<C: Clock> Limiter for RateLimiter<C> {
    fn allow(&self, key: &str) -> Decision {
        RateLimiter::allow(self, key)
    }

    fn policy(&self) -> &Policy {
        &self.policy
    }
}
