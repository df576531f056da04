//! Bounded retry over the async upstream call.
use std::time::Duration;

use crate::{
    config::models::ResilienceConfig,
    core::{
        errors::{GatewayError, GatewayResult},
        resilience::UpstreamCall,
        response::GatewayResponse,
    },
};

/// Fixed-wait retry: up to `max_attempts` total attempts with
/// `wait_duration` between them. Waits run on the tokio timer.
pub struct Retry {
    max_attempts: u32,
    wait_duration: Duration,
}

impl Retry {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            wait_duration: Duration::from_millis(config.wait_duration_ms),
        }
    }

    pub async fn execute(&self, call: UpstreamCall) -> GatewayResult<GatewayResponse> {
        let mut last_error: Option<GatewayError> = None;
        for attempt in 1..=self.max_attempts {
            match call().await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    tracing::debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %error,
                        "upstream attempt failed"
                    );
                    last_error = Some(error);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.wait_duration).await;
                    }
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| GatewayError::Internal("retry ran zero attempts".to_string())))
    }
}
