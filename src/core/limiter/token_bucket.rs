//! Token bucket: refills at a fixed rate, admits while tokens remain.
use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::core::{
    errors::{GatewayError, GatewayResult},
    limiter::RateLimiter,
};

/// Counter-based token bucket. The bucket starts full so burst capacity is
/// available immediately; a background task tops it up once per second,
/// capped at `capacity`.
pub struct TokenBucketRateLimiter {
    tokens: Arc<AtomicI64>,
    refill_task: tokio::task::JoinHandle<()>,
}

impl TokenBucketRateLimiter {
    pub fn new(capacity: u32, refill_per_second: u64) -> Self {
        let capacity = i64::from(capacity);
        let refill = refill_per_second as i64;
        let tokens = Arc::new(AtomicI64::new(capacity));

        let bucket = tokens.clone();
        let refill_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(1000));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // the first tick completes immediately
            loop {
                ticker.tick().await;
                let _ = bucket.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    Some((current + refill).min(capacity))
                });
            }
        });

        Self {
            tokens,
            refill_task,
        }
    }
}

#[async_trait]
impl RateLimiter for TokenBucketRateLimiter {
    async fn try_consume(&self) -> GatewayResult<()> {
        // Optimistically take a token; put it back when none was available.
        if self.tokens.fetch_sub(1, Ordering::AcqRel) > 0 {
            Ok(())
        } else {
            self.tokens.fetch_add(1, Ordering::AcqRel);
            Err(GatewayError::Limited)
        }
    }
}

impl Drop for TokenBucketRateLimiter {
    fn drop(&mut self) {
        self.refill_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_capacity_then_rejects() {
        let limiter = TokenBucketRateLimiter::new(2, 1);
        assert!(limiter.try_consume().await.is_ok());
        assert!(limiter.try_consume().await.is_ok());
        assert!(matches!(
            limiter.try_consume().await,
            Err(GatewayError::Limited)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refill_restores_tokens() {
        let limiter = TokenBucketRateLimiter::new(2, 2);
        assert!(limiter.try_consume().await.is_ok());
        assert!(limiter.try_consume().await.is_ok());
        assert!(limiter.try_consume().await.is_err());

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert!(limiter.try_consume().await.is_ok());
        assert!(limiter.try_consume().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refill_never_exceeds_capacity() {
        let limiter = TokenBucketRateLimiter::new(1, 100);
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert!(limiter.try_consume().await.is_ok());
        assert!(limiter.try_consume().await.is_err());
    }
}
