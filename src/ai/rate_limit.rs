//! Endpoint Rate Limiter
//!
//! Token bucket per client key. Each bucket holds up to `burst` tokens and
//! refills continuously at `requests_per_minute / 60` tokens per second.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::constants::rate_limit as rl_constants;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-key token bucket limiter
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    /// Tokens per second
    refill_rate: f64,
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, burst: u32) -> Self {
        Self {
            capacity: f64::from(burst.max(1)),
            refill_rate: f64::from(requests_per_minute.max(1)) / 60.0,
            buckets: DashMap::new(),
        }
    }

    /// Take one token for `key`.
    ///
    /// Returns the wait until the next token becomes available when the
    /// bucket is empty.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: self.capacity,
                last_refill: now,
            });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - bucket.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    /// Drop buckets that have been idle long enough to be full again
    pub fn prune(&self) {
        let full_after = Duration::from_secs_f64(self.capacity / self.refill_rate);
        self.buckets
            .retain(|_, bucket| bucket.last_refill.elapsed() < full_after);
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(rl_constants::REQUESTS_PER_MINUTE, rl_constants::BURST_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_reject() {
        let limiter = RateLimiter::new(60, 3);
        for _ in 0..3 {
            assert!(limiter.check("1.2.3.4").is_ok());
        }
        let wait = limiter.check("1.2.3.4").unwrap_err();
        assert!(wait <= Duration::from_secs(1));
        assert!(wait > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refills_over_time() {
        let limiter = RateLimiter::new(60, 1);
        assert!(limiter.check("k").is_ok());
        assert!(limiter.check("k").is_err());

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(limiter.check("k").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(30, 1);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_idle_buckets() {
        let limiter = RateLimiter::new(60, 2);
        limiter.check("a").unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        limiter.prune();
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_default_matches_constants() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.capacity, f64::from(rl_constants::BURST_LIMIT));
        assert!((limiter.refill_rate - 0.5).abs() < f64::EPSILON);
    }
}
