//! Circuit breaker keyed by service.
//!
//! Closed counts outcomes in a sliding window (count- or time-based) and
//! opens once the failure or slow-call rate crosses its threshold with at
//! least `minimum_number_of_calls` observed. Open rejects until the
//! open-state wait elapses, then half-open admits a bounded probe set whose
//! outcome decides between closing and re-opening.
use std::{
    collections::VecDeque,
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::{
    config::models::{ResilienceConfig, SlidingWindowType},
    core::{
        errors::{GatewayError, GatewayResult},
        resilience::UpstreamCall,
        response::GatewayResponse,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    at: Instant,
    success: bool,
    slow: bool,
}

struct BreakerState {
    mode: Mode,
    outcomes: VecDeque<Outcome>,
    opened_at: Option<Instant>,
    half_open_calls: u32,
}

pub struct CircuitBreaker {
    failure_rate_threshold: f64,
    slow_call_rate_threshold: f64,
    slow_call_duration: Duration,
    open_state_wait: Duration,
    permitted_half_open_calls: u32,
    minimum_calls: u32,
    window_type: SlidingWindowType,
    window_size: u32,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            failure_rate_threshold: config.failure_rate_threshold,
            slow_call_rate_threshold: config.slow_call_rate_threshold,
            slow_call_duration: Duration::from_millis(config.slow_call_duration_threshold_ms),
            open_state_wait: Duration::from_millis(config.wait_duration_in_open_state_ms),
            permitted_half_open_calls: config.permitted_calls_in_half_open_state.max(1),
            minimum_calls: config.minimum_number_of_calls.max(1),
            window_type: config.sliding_window_type,
            window_size: config.sliding_window_size.max(1),
            state: Mutex::new(BreakerState {
                mode: Mode::Closed,
                outcomes: VecDeque::new(),
                opened_at: None,
                half_open_calls: 0,
            }),
        }
    }

    pub async fn execute(&self, call: UpstreamCall) -> GatewayResult<GatewayResponse> {
        self.try_acquire()?;
        let started = Instant::now();
        let result = call().await;
        self.record(result.is_ok(), started.elapsed());
        result
    }

    pub fn is_open(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.mode == Mode::Open)
            .unwrap_or(false)
    }

    fn try_acquire(&self) -> GatewayResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| GatewayError::Internal("circuit breaker lock poisoned".to_string()))?;
        match state.mode {
            Mode::Closed => Ok(()),
            Mode::Open => {
                let waited_out = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.open_state_wait)
                    .unwrap_or(true);
                if waited_out {
                    state.mode = Mode::HalfOpen;
                    state.outcomes.clear();
                    state.half_open_calls = 1;
                    Ok(())
                } else {
                    Err(GatewayError::Rejected("circuit breaker open".to_string()))
                }
            }
            Mode::HalfOpen => {
                if state.half_open_calls < self.permitted_half_open_calls {
                    state.half_open_calls += 1;
                    Ok(())
                } else {
                    Err(GatewayError::Rejected(
                        "circuit breaker half-open probe budget exhausted".to_string(),
                    ))
                }
            }
        }
    }

    fn record(&self, success: bool, elapsed: Duration) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let outcome = Outcome {
            at: Instant::now(),
            success,
            slow: elapsed >= self.slow_call_duration,
        };
        state.outcomes.push_back(outcome);

        match state.mode {
            Mode::Closed => {
                self.evict(&mut state.outcomes);
                if state.outcomes.len() as u32 >= self.minimum_calls
                    && self.rates_exceeded(&state.outcomes)
                {
                    tracing::warn!("circuit breaker opened");
                    state.mode = Mode::Open;
                    state.opened_at = Some(Instant::now());
                    state.outcomes.clear();
                }
            }
            Mode::HalfOpen => {
                if state.outcomes.len() as u32 >= self.permitted_half_open_calls {
                    if self.rates_exceeded(&state.outcomes) {
                        tracing::warn!("circuit breaker re-opened after half-open probes");
                        state.mode = Mode::Open;
                        state.opened_at = Some(Instant::now());
                    } else {
                        tracing::info!("circuit breaker closed after half-open probes");
                        state.mode = Mode::Closed;
                    }
                    state.outcomes.clear();
                    state.half_open_calls = 0;
                }
            }
            Mode::Open => {}
        }
    }

    fn evict(&self, outcomes: &mut VecDeque<Outcome>) {
        match self.window_type {
            SlidingWindowType::CountBased => {
                while outcomes.len() as u32 > self.window_size {
                    outcomes.pop_front();
                }
            }
            SlidingWindowType::TimeBased => {
                let horizon = Duration::from_secs(u64::from(self.window_size));
                while outcomes
                    .front()
                    .is_some_and(|outcome| outcome.at.elapsed() > horizon)
                {
                    outcomes.pop_front();
                }
            }
        }
    }

    fn rates_exceeded(&self, outcomes: &VecDeque<Outcome>) -> bool {
        let total = outcomes.len() as f64;
        if total == 0.0 {
            return false;
        }
        let failures = outcomes.iter().filter(|o| !o.success).count() as f64;
        let slow = outcomes.iter().filter(|o| o.slow).count() as f64;
        failures / total * 100.0 >= self.failure_rate_threshold
            || slow / total * 100.0 >= self.slow_call_rate_threshold
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::FutureExt;
    use http::StatusCode;

    use super::*;

    fn failing_call() -> UpstreamCall {
        Arc::new(|| async { Err(GatewayError::Upstream("down".to_string())) }.boxed())
    }

    fn ok_call() -> UpstreamCall {
        Arc::new(|| {
            async {
                Ok(GatewayResponse::from_upstream(
                    StatusCode::OK,
                    Default::default(),
                    Default::default(),
                ))
            }
            .boxed()
        })
    }

    fn breaker(minimum_calls: u32, open_wait_ms: u64) -> CircuitBreaker {
        CircuitBreaker::from_config(&ResilienceConfig {
            circuit_breaker_enabled: true,
            failure_rate_threshold: 50.0,
            minimum_number_of_calls: minimum_calls,
            wait_duration_in_open_state_ms: open_wait_ms,
            permitted_calls_in_half_open_state: 2,
            sliding_window_size: 10,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn opens_after_failure_rate_crosses_threshold() {
        let breaker = breaker(3, 60_000);
        for _ in 0..3 {
            let _ = breaker.execute(failing_call()).await;
        }
        assert!(breaker.is_open());
        assert!(matches!(
            breaker.execute(ok_call()).await,
            Err(GatewayError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn stays_closed_under_minimum_calls() {
        let breaker = breaker(10, 60_000);
        for _ in 0..5 {
            let _ = breaker.execute(failing_call()).await;
        }
        assert!(!breaker.is_open());
        assert!(breaker.execute(ok_call()).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn half_open_probes_close_the_breaker_on_success() {
        let breaker = breaker(2, 50);
        for _ in 0..2 {
            let _ = breaker.execute(failing_call()).await;
        }
        assert!(breaker.is_open());

        tokio::time::sleep(Duration::from_millis(80)).await;
        // Two permitted probes succeed; the breaker closes again.
        assert!(breaker.execute(ok_call()).await.is_ok());
        assert!(breaker.execute(ok_call()).await.is_ok());
        assert!(!breaker.is_open());
        assert!(breaker.execute(ok_call()).await.is_ok());
    }
}
