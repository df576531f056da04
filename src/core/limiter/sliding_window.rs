//! Sliding window: bounds admissions within any window of the configured
//! width.
use std::{
    collections::VecDeque,
    sync::Mutex,
    time::Instant,
};

use async_trait::async_trait;

use crate::core::{
    errors::{GatewayError, GatewayResult},
    limiter::RateLimiter,
};

/// Timestamp-deque sliding window. Admission evicts expired entries from the
/// head, then admits while fewer than `capacity` remain. Operations
/// serialize on the limiter's mutex.
pub struct SlidingWindowRateLimiter {
    capacity: usize,
    window_millis: u64,
    epoch: Instant,
    timestamps: Mutex<VecDeque<u64>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(capacity: u32, window_millis: u64) -> Self {
        Self {
            capacity: capacity as usize,
            window_millis,
            epoch: Instant::now(),
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowRateLimiter {
    async fn try_consume(&self) -> GatewayResult<()> {
        let now = self.now_millis();
        let mut timestamps = self
            .timestamps
            .lock()
            .map_err(|_| GatewayError::Internal("sliding window lock poisoned".to_string()))?;

        while timestamps
            .front()
            .is_some_and(|admitted| now - admitted > self.window_millis)
        {
            timestamps.pop_front();
        }

        if timestamps.len() < self.capacity {
            timestamps.push_back(now);
            Ok(())
        } else {
            Err(GatewayError::Limited)
        }
    }
}
