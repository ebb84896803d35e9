use log::debug;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const EPSILON: f64 = 1e-9;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token bucket gating outbound LLM requests.
///
/// Holds up to `capacity` permits and regains one every `interval`. A zero
/// interval never waits.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    interval: Duration,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, interval: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            interval,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    /// One permit per `interval` with no burst beyond the first request.
    pub fn per_interval(interval: Duration) -> Self {
        Self::new(1, interval)
    }

    pub fn unlimited() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until a permit is available and takes it.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.refilled_at);
                let regained = elapsed.as_secs_f64() / self.interval.as_secs_f64();
                bucket.tokens = (bucket.tokens + regained).min(self.capacity);
                bucket.refilled_at = now;

                if bucket.tokens + EPSILON >= 1.0 {
                    bucket.tokens = (bucket.tokens - 1.0).max(0.0);
                    return;
                }

                self.interval
                    .mul_f64(1.0 - bucket.tokens)
                    .max(Duration::from_millis(1))
            };

            debug!("Rate limiter waiting {:?} for a permit", wait);
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_permits_are_spaced_by_interval() {
        let limiter = RateLimiter::per_interval(Duration::from_secs(2));
        let start = Instant::now();

        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_capacity() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
