//! Request budget shared by every fetch of one run.
//!
//! A budget of `N` requests per hour becomes a fixed spacing of `3600s / N`
//! between consecutive requests. Slots are handed out one at a time from a
//! single clock, so concurrent fetchers never burst past the budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Evenly spaced request slots.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
    granted: AtomicU64,
}

impl RateLimiter {
    /// A limiter allowing `requests_per_hour` requests; 0 means unlimited.
    pub fn per_hour(requests_per_hour: u32) -> Self {
        let interval = if requests_per_hour == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(3600) / requests_per_hour
        };
        RateLimiter::with_interval(interval)
    }

    pub fn unlimited() -> Self {
        RateLimiter::with_interval(Duration::ZERO)
    }

    pub fn with_interval(interval: Duration) -> Self {
        RateLimiter {
            interval,
            next_slot: Mutex::new(None),
            granted: AtomicU64::new(0),
        }
    }

    /// Minimum delay between two requests.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of slots handed out so far.
    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }

    /// Wait for the next request slot.
    ///
    /// Dropping the returned future before it completes (for example when a
    /// caller races it against cancellation) consumes no slot.
    pub async fn acquire(&self) {
        if !self.interval.is_zero() {
            let mut next = self.next_slot.lock().await;
            if let Some(at) = *next {
                tokio::time::sleep_until(at).await;
            }
            *next = Some(Instant::now() + self.interval);
        }
        self.granted.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn interval_from_hourly_budget() {
        assert_eq!(RateLimiter::per_hour(3600).interval(), Duration::from_secs(1));
        assert_eq!(RateLimiter::per_hour(10_000).interval(), Duration::from_millis(360));
        assert!(RateLimiter::per_hour(0).interval().is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn slots_are_evenly_spaced() {
        let limiter = RateLimiter::per_hour(3600);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(1));
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(limiter.granted(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_across_concurrent_callers() {
        let limiter = Arc::new(RateLimiter::per_hour(3600));
        let start = Instant::now();
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        // Four slots need three full intervals regardless of concurrency.
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(limiter.granted(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.granted(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_wait_consumes_no_slot() {
        let limiter = RateLimiter::per_hour(1);
        limiter.acquire().await;

        let abandoned = tokio::time::timeout(Duration::from_secs(1), limiter.acquire()).await;
        assert!(abandoned.is_err());
        assert_eq!(limiter.granted(), 1);

        // The slot clock still points at the first slot plus one interval.
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(3598));
        assert_eq!(limiter.granted(), 2);
    }
}
