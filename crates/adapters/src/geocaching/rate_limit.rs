//! Request pacing for the listing site

use rand::Rng;
use std::ops::RangeInclusive;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};

/// Single-token bucket: at most one request per `interval`.
/// An unthrottled limiter never waits.
#[derive(Debug)]
pub struct RequestLimiter {
    interval: Option<Duration>,
    last_grant: Mutex<Option<Instant>>,
}

impl RequestLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: Some(interval),
            last_grant: Mutex::new(None),
        }
    }

    pub fn unthrottled() -> Self {
        Self {
            interval: None,
            last_grant: Mutex::new(None),
        }
    }

    pub fn is_throttled(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait until a request may be issued
    pub async fn acquire(&self) {
        let Some(interval) = self.interval else {
            return;
        };

        loop {
            let mut last_grant = self.last_grant.lock().await;
            let now = Instant::now();

            let wait_for = match *last_grant {
                Some(granted) => interval.saturating_sub(now.duration_since(granted)),
                None => Duration::ZERO,
            };

            if wait_for.is_zero() {
                *last_grant = Some(now);
                return;
            }

            drop(last_grant);
            sleep(wait_for).await;
        }
    }

    /// Extra human-like pause of a random whole number of seconds in `secs`.
    /// Skipped entirely when unthrottled.
    pub async fn pause(&self, secs: RangeInclusive<u64>) {
        if !self.is_throttled() {
            return;
        }
        let delay = rand::rng().random_range(secs);
        tracing::debug!(delay_secs = delay, "Pausing between requests");
        sleep(Duration::from_secs(delay)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_limiter_spaces_requests() {
        let limiter = RequestLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        // First grant is immediate, the next two wait a second each
        assert_eq!(start.elapsed().as_secs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_does_not_wait_after_idle_period() {
        let limiter = RequestLimiter::new(Duration::from_secs(1));
        limiter.acquire().await;
        sleep(Duration::from_secs(5)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unthrottled_never_waits() {
        let limiter = RequestLimiter::unthrottled();
        let start = Instant::now();

        for _ in 0..10 {
            limiter.acquire().await;
        }
        limiter.pause(3..=8).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!limiter.is_throttled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stays_in_range() {
        let limiter = RequestLimiter::new(Duration::from_secs(1));
        let start = Instant::now();
        limiter.pause(2..=4).await;

        let waited = start.elapsed().as_secs();
        assert!((2..=4).contains(&waited));
    }
}
