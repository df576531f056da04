//! Concurrency isolation: semaphore bulkhead and thread-pool bulkhead.
use std::{sync::Arc, time::Duration};

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};

use crate::{
    config::models::ResilienceConfig,
    core::{
        errors::{GatewayError, GatewayResult},
        resilience::UpstreamCall,
        response::GatewayResponse,
    },
};

/// Semaphore-gated concurrency limit per service. A zero wait duration
/// rejects immediately when no permit is free; otherwise acquisition is
/// bounded by `max_wait_duration`.
pub struct Bulkhead {
    permits: Arc<Semaphore>,
    max_wait: Duration,
}

impl Bulkhead {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent_calls.max(1) as usize)),
            max_wait: Duration::from_millis(config.max_wait_duration_ms),
        }
    }

    pub async fn execute(&self, call: UpstreamCall) -> GatewayResult<GatewayResponse> {
        let _permit = if self.max_wait.is_zero() {
            self.permits
                .clone()
                .try_acquire_owned()
                .map_err(|_| GatewayError::Rejected("bulkhead is full".to_string()))?
        } else {
            tokio::time::timeout(self.max_wait, self.permits.clone().acquire_owned())
                .await
                .map_err(|_| GatewayError::Rejected("bulkhead wait timed out".to_string()))?
                .map_err(|_| GatewayError::Internal("bulkhead semaphore closed".to_string()))?
        };
        call().await
    }
}

type PoolJob = (
    BoxFuture<'static, GatewayResult<GatewayResponse>>,
    oneshot::Sender<GatewayResult<GatewayResponse>>,
);

/// Executes the upstream supplier on a bounded set of worker tasks fed by a
/// `queue_capacity`-bounded channel; a full queue rejects the call. The
/// completed result is surfaced back into the caller's chain via oneshot.
pub struct ThreadPoolBulkhead {
    jobs: mpsc::Sender<PoolJob>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl ThreadPoolBulkhead {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        let worker_count = config
            .max_thread_pool_size
            .max(config.core_thread_pool_size)
            .max(1);
        let (jobs, receiver) = mpsc::channel::<PoolJob>(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..worker_count)
            .map(|_| {
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        let job = { receiver.lock().await.recv().await };
                        match job {
                            Some((work, done)) => {
                                let result = work.await;
                                let _ = done.send(result);
                            }
                            None => break,
                        }
                    }
                })
            })
            .collect();

        Self { jobs, workers }
    }

    pub async fn execute(&self, call: UpstreamCall) -> GatewayResult<GatewayResponse> {
        let (done, completed) = oneshot::channel();
        self.jobs
            .try_send((call(), done))
            .map_err(|_| GatewayError::Rejected("thread-pool bulkhead queue is full".to_string()))?;
        completed
            .await
            .map_err(|_| GatewayError::Internal("thread-pool bulkhead worker dropped".to_string()))?
    }
}

impl Drop for ThreadPoolBulkhead {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}
