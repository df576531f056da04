//! Per-service rate limiting.
//!
//! Three algorithms with distinct admission semantics: the token bucket
//! admits bursts up to its capacity and refills on a one-second cadence, the
//! sliding window bounds admissions inside any window of the configured
//! width, and the leaky bucket smooths traffic by parking admissions in a
//! queue drained at a fixed interval. Limiters are created per service by
//! the flow filter and dropped when the service's route changes.
pub mod leaky_bucket;
pub mod sliding_window;
pub mod token_bucket;

use std::sync::Arc;

use async_trait::async_trait;

pub use leaky_bucket::LeakyBucketRateLimiter;
pub use sliding_window::SlidingWindowRateLimiter;
pub use token_bucket::TokenBucketRateLimiter;

use crate::{
    config::models::{FlowAlgorithm, FlowFilterConfig},
    core::errors::GatewayResult,
};

/// Admission decision point. `Ok(())` admits the request and the chain
/// advances; `Err` carries the coded rejection. Implementations may suspend
/// (the leaky bucket parks callers until the leak task grants a permit).
#[async_trait]
pub trait RateLimiter: Send + Sync + 'static {
    async fn try_consume(&self) -> GatewayResult<()>;
}

/// Build the limiter selected by a flow filter config.
pub fn build_rate_limiter(config: &FlowFilterConfig) -> Arc<dyn RateLimiter> {
    match config.algorithm {
        FlowAlgorithm::TokenBucket => {
            Arc::new(TokenBucketRateLimiter::new(config.capacity, config.rate))
        }
        FlowAlgorithm::SlidingWindow => {
            Arc::new(SlidingWindowRateLimiter::new(config.capacity, config.rate))
        }
        FlowAlgorithm::LeakyBucket => {
            Arc::new(LeakyBucketRateLimiter::new(config.capacity, config.rate))
        }
    }
}
