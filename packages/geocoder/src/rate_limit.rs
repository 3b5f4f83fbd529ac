//! Minimum-interval rate limiter shared by concurrent geocoding workers.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between consecutive requests.
///
/// The lock is held while waiting, so concurrent callers are serialized
/// and the interval holds globally across every worker sharing the
/// limiter.
#[derive(Debug)]
pub struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    /// Creates a limiter allowing one request per `min_interval`.
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::const_new(None),
            min_interval,
        }
    }

    /// The configured interval.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the next request is allowed, then records it.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                log::trace!("Rate limiting: waiting {wait_time:?}");
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_request_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn enforces_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn interval_holds_across_concurrent_workers() {
        let limiter = std::sync::Arc::new(RateLimiter::new(Duration::from_millis(100)));
        let start = Instant::now();

        let workers: Vec<_> = (0..5)
            .map(|_| {
                let limiter = std::sync::Arc::clone(&limiter);
                tokio::spawn(async move { limiter.wait().await })
            })
            .collect();
        for worker in workers {
            worker.await.unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn zero_interval_never_waits() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.wait().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
