//! Leaky bucket: admissions drain at a fixed interval, smoothing bursts.
use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::core::{
    errors::{GatewayError, GatewayResult},
    limiter::RateLimiter,
};

/// FIFO leaky bucket. A caller that fits under `capacity` raises the level,
/// parks a wakeup permit in the queue and suspends; the leak task grants one
/// permit every `leak_interval_millis`, lowering the level and resuming that
/// caller's chain. A full bucket rejects outright. Dropped callers simply
/// discard their permit when it arrives.
pub struct LeakyBucketRateLimiter {
    capacity: i64,
    level: Arc<AtomicI64>,
    queue: mpsc::UnboundedSender<oneshot::Sender<()>>,
    leak_task: tokio::task::JoinHandle<()>,
}

impl LeakyBucketRateLimiter {
    pub fn new(capacity: u32, leak_interval_millis: u64) -> Self {
        let level = Arc::new(AtomicI64::new(0));
        let (queue, mut waiting) = mpsc::unbounded_channel::<oneshot::Sender<()>>();

        let water = level.clone();
        let leak_task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(leak_interval_millis.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // the first tick completes immediately
            loop {
                ticker.tick().await;
                if water.load(Ordering::Acquire) > 0 {
                    if let Ok(permit) = waiting.try_recv() {
                        water.fetch_sub(1, Ordering::AcqRel);
                        let _ = permit.send(());
                    }
                }
            }
        });

        Self {
            capacity: i64::from(capacity),
            level,
            queue,
            leak_task,
        }
    }
}

#[async_trait]
impl RateLimiter for LeakyBucketRateLimiter {
    async fn try_consume(&self) -> GatewayResult<()> {
        if self.level.load(Ordering::Acquire) >= self.capacity {
            return Err(GatewayError::Limited);
        }
        self.level.fetch_add(1, Ordering::AcqRel);

        let (grant, admitted) = oneshot::channel();
        self.queue
            .send(grant)
            .map_err(|_| GatewayError::Internal("leaky bucket leak task stopped".to_string()))?;
        admitted
            .await
            .map_err(|_| GatewayError::Internal("leaky bucket permit dropped".to_string()))?;
        Ok(())
    }
}

impl Drop for LeakyBucketRateLimiter {
    fn drop(&mut self) {
        self.leak_task.abort();
    }
}
