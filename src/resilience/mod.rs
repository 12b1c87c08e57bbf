//! Resilience Pipeline (C3): timeout, circuit breaker, and retry composed
//! around a single adapter call (§4.3).
//!
//! The breaker gates admission before every attempt (no network call is ever
//! made while `Open`); each admitted attempt is wall-clock capped at the
//! adapter's configured timeout; failed, retry-eligible attempts back off
//! with jitter before the next attempt. Cancellation is checked at every
//! suspension point and never counts against the breaker (§5).

pub mod circuit_breaker;
pub mod retry;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AdapterError;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct ResiliencePipelineConfig {
    pub timeout: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
}

impl Default for ResiliencePipelineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

fn is_retryable(err: &AdapterError) -> bool {
    match err {
        AdapterError::Timeout | AdapterError::Transport(_) => true,
        AdapterError::Http { status, .. } => *status >= 500 || *status == 429,
        _ => false,
    }
}

pub struct ResiliencePipeline {
    name: String,
    config: ResiliencePipelineConfig,
    breaker: CircuitBreaker,
}

impl ResiliencePipeline {
    pub fn new(name: impl Into<String>, config: ResiliencePipelineConfig) -> Self {
        let name = name.into();
        let breaker = CircuitBreaker::new(name.clone(), config.circuit_breaker.clone());
        Self { name, config, breaker }
    }

    pub async fn breaker_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    /// Runs `attempt` up to `max_retries + 1` times. `attempt` is invoked
    /// fresh for each try since a failed future cannot be re-polled.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, mut attempt: F) -> Result<T, AdapterError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AdapterError>>,
    {
        let mut last_err = AdapterError::Unknown("resilience pipeline produced no attempts".into());

        for attempt_num in 0..=self.config.retry.max_retries {
            if cancel.is_cancelled() {
                return Err(AdapterError::Cancelled);
            }
            if !self.breaker.try_admit().await {
                tracing::warn!(adapter = %self.name, "circuit breaker rejected call");
                return Err(AdapterError::CircuitOpen);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(AdapterError::Cancelled);
                }
                res = tokio::time::timeout(self.config.timeout, attempt()) => res,
            };

            let err = match outcome {
                Ok(Ok(value)) => {
                    self.breaker.on_success().await;
                    return Ok(value);
                }
                Ok(Err(err)) => {
                    self.breaker.on_failure().await;
                    err
                }
                Err(_elapsed) => {
                    self.breaker.on_failure().await;
                    AdapterError::Timeout
                }
            };

            let retryable = is_retryable(&err);
            last_err = err;
            if !retryable || attempt_num == self.config.retry.max_retries {
                break;
            }

            let delay = self.config.retry.delay_for_attempt(attempt_num);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        Err(last_err)
    }
}
