//! Eviction of stale key state.
//!
//! Without eviction the key map grows with every distinct client key ever
//! seen, and a caller that controls its key (a spoofed forwarded-for header,
//! say) can grow it without bound. Two mechanisms keep it in check:
//!
//! - a periodic [`Sweeper`] task removing entries idle for
//!   `eviction_factor` windows, and
//! - an optional cap on tracked keys, enforced inline by the limiter when
//!   a new key arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::clock::Clock;
use super::limiter::RateLimiter;

/// Default number of windows an entry may sit idle before it is evicted.
pub const DEFAULT_EVICTION_FACTOR: u32 = 2;

/// How long idle key state is kept, and how much of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// Entries idle for this many windows are evicted
    pub eviction_factor: u32,
    /// Upper bound on tracked keys, if any
    pub max_tracked_keys: Option<usize>,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            eviction_factor: DEFAULT_EVICTION_FACTOR,
            max_tracked_keys: None,
        }
    }
}

impl Retention {
    /// Idle time after which an entry carries no information for `window`.
    pub fn horizon(&self, window: Duration) -> Duration {
        window
            .checked_mul(self.eviction_factor.max(1))
            .unwrap_or(Duration::MAX)
    }
}

/// Background task that periodically sweeps a limiter.
pub struct Sweeper {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl Sweeper {
    /// Spawn a sweep task running every `interval` on the current runtime.
    ///
    /// `interval` must be non-zero.
    pub fn spawn<C: Clock>(limiter: Arc<RateLimiter<C>>, interval: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing to sweep yet.
            ticker.tick().await;

            info!(interval_ms = interval.as_millis() as u64, "Eviction sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        limiter.sweep();
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Eviction sweeper stopped");
        });

        Self { handle, shutdown }
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
