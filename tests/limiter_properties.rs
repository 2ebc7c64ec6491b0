//! Behavioural properties of the fixed-window limiter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use turnstile::ratelimit::{Limiter, ManualClock, Policy, RateLimiter, Retention};

fn limiter(limit: u64, window: Duration) -> (RateLimiter<ManualClock>, ManualClock) {
    let clock = ManualClock::default();
    let policy = Policy::new(limit, window, true).unwrap();
    (RateLimiter::with_clock(policy, clock.clone()), clock)
}

#[test]
fn test_burst_of_22_against_limit_of_20() {
    let (limiter, _) = limiter(20, Duration::from_secs(5));
    let key = "203.0.113.7";

    for i in 1..=20 {
        let decision = limiter.allow(key);
        assert!(decision.permitted, "call {} should be admitted", i);
        assert_eq!(decision.retry_after, Duration::ZERO);
    }

    for i in 21..=22 {
        let decision = limiter.allow(key);
        assert!(!decision.permitted, "call {} should be denied", i);
        assert!(decision.retry_after > Duration::ZERO);
        assert!(decision.retry_after <= Duration::from_secs(5));
    }
}

#[test]
fn test_burst_with_system_clock_retry_close_to_window() {
    let limiter = RateLimiter::new(Policy::new(20, Duration::from_secs(5), true).unwrap());

    for _ in 0..20 {
        assert!(limiter.allow("203.0.113.7").permitted);
    }

    let decision = limiter.allow("203.0.113.7");
    assert!(!decision.permitted);
    assert!(decision.retry_after <= Duration::from_secs(5));
    assert!(decision.retry_after > Duration::from_secs(4));
    assert_eq!(decision.retry_after_secs(), 5);
}

#[test]
fn test_window_rollover_admits_full_quota_again() {
    let (limiter, clock) = limiter(3, Duration::from_secs(5));

    for _ in 0..3 {
        assert!(limiter.allow("k").permitted);
    }
    assert!(!limiter.allow("k").permitted);

    clock.advance(Duration::from_secs(5));

    for i in 1..=3 {
        assert!(limiter.allow("k").permitted, "call {} of new window", i);
    }
    assert!(!limiter.allow("k").permitted);
}

#[test]
fn test_retry_after_shrinks_as_window_ages() {
    let (limiter, clock) = limiter(1, Duration::from_secs(10));

    assert!(limiter.allow("k").permitted);

    for elapsed in 1..10 {
        clock.advance(Duration::from_secs(1));
        let decision = limiter.allow("k");
        assert!(!decision.permitted);
        assert_eq!(decision.retry_after, Duration::from_secs(10 - elapsed));
    }

    clock.advance(Duration::from_secs(1));
    assert!(limiter.allow("k").permitted);
}

#[test]
fn test_keys_are_independent() {
    let (limiter, _) = limiter(2, Duration::from_secs(60));

    assert!(limiter.allow("a").permitted);
    assert!(limiter.allow("a").permitted);
    assert!(!limiter.allow("a").permitted);

    assert!(limiter.allow("b").permitted);
    assert!(limiter.allow("b").permitted);
    assert!(!limiter.allow("b").permitted);
}

#[test]
fn test_disabled_limiter_admits_everything() {
    let limiter = RateLimiter::new(Policy::new(0, Duration::ZERO, false).unwrap());

    for i in 0..500 {
        let decision = limiter.allow(&format!("client-{}", i % 7));
        assert!(decision.permitted);
        assert_eq!(decision.retry_after, Duration::ZERO);
    }
}

#[test]
fn test_concurrent_callers_never_exceed_limit() {
    const CALLERS: usize = 64;
    const LIMIT: u64 = 20;

    let limiter = Arc::new(RateLimiter::new(
        Policy::new(LIMIT, Duration::from_secs(60), true).unwrap(),
    ));
    let barrier = Arc::new(Barrier::new(CALLERS));
    let permitted = Arc::new(AtomicU64::new(0));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let limiter = limiter.clone();
            let barrier = barrier.clone();
            let permitted = permitted.clone();
            thread::spawn(move || {
                barrier.wait();
                if limiter.allow("shared").permitted {
                    permitted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(permitted.load(Ordering::SeqCst), LIMIT);
    assert_eq!(limiter.count_for("shared"), Some(LIMIT));
}

#[test]
fn test_concurrent_callers_with_partial_quota() {
    const CALLERS: usize = 40;

    let limiter = Arc::new(RateLimiter::new(
        Policy::new(20, Duration::from_secs(60), true).unwrap(),
    ));
    for _ in 0..15 {
        assert!(limiter.allow("shared").permitted);
    }

    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let limiter = limiter.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                limiter.allow("shared").permitted
            })
        })
        .collect();

    let outcomes: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let admitted = outcomes.iter().filter(|p| **p).count();

    assert_eq!(admitted, 5);
    assert_eq!(outcomes.len() - admitted, CALLERS - 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_tasks_through_trait_object() {
    let limiter: Arc<dyn Limiter> = Arc::new(RateLimiter::new(
        Policy::new(50, Duration::from_secs(60), true).unwrap(),
    ));

    let tasks: Vec<_> = (0..400)
        .map(|i| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let key = if i % 2 == 0 { "even" } else { "odd" };
                (key, limiter.allow(key).permitted)
            })
        })
        .collect();

    let mut even = 0;
    let mut odd = 0;
    for task in tasks {
        let (key, permitted) = task.await.unwrap();
        if permitted {
            if key == "even" {
                even += 1;
            } else {
                odd += 1;
            }
        }
    }

    assert_eq!(even, 50);
    assert_eq!(odd, 50);
}

#[test]
fn test_sweep_keeps_live_keys_under_churn() {
    let (limiter, clock) = limiter(5, Duration::from_secs(1));

    for i in 0..1000 {
        limiter.allow(&format!("spoofed-{}", i));
    }
    assert_eq!(limiter.tracked_keys(), 1000);

    clock.advance(Duration::from_secs(2));
    limiter.allow("live");

    assert_eq!(limiter.sweep(), 1000);
    assert_eq!(limiter.tracked_keys(), 1);
    assert_eq!(limiter.count_for("live"), Some(1));
}

#[test]
fn test_concurrent_new_keys_at_cap() {
    const CAP: usize = 64;
    const THREADS: usize = 16;
    const KEYS_PER_THREAD: usize = 200;

    let limiter = Arc::new(
        RateLimiter::new(Policy::new(3, Duration::from_secs(60), true).unwrap()).with_retention(
            Retention {
                max_tracked_keys: Some(CAP),
                ..Retention::default()
            },
        ),
    );
    let barrier = Arc::new(Barrier::new(THREADS));
    let permitted = Arc::new(AtomicU64::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let limiter = limiter.clone();
            let barrier = barrier.clone();
            let permitted = permitted.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 0..KEYS_PER_THREAD {
                    if limiter.allow(&format!("client-{}-{}", t, i)).permitted {
                        permitted.fetch_add(1, Ordering::SeqCst);
                    }
                    assert!(limiter.tracked_keys() <= CAP + THREADS);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Every key is new, so every call takes the first slot of a fresh window.
    assert_eq!(
        permitted.load(Ordering::SeqCst),
        (THREADS * KEYS_PER_THREAD) as u64
    );
    assert!(limiter.tracked_keys() <= CAP + THREADS);
    assert!(limiter.tracked_keys() >= CAP - THREADS);

    // A live key at the cap still sees exact counts.
    for _ in 0..3 {
        assert!(limiter.allow("steady").permitted);
    }
    assert!(!limiter.allow("steady").permitted);
    assert_eq!(limiter.count_for("steady"), Some(3));
}
