//! Retry logic.
//!
//! # Responsibilities
//! - Classify each attempt as success, retryable or non-retryable
//! - Drive a bounded number of attempts with exponential backoff + jitter
//! - Consult the circuit breaker before every attempt, record after it
//!
//! # Design Decisions
//! - Timeouts, connection errors and 5xx are always retryable; 4xx only
//!   when listed in `retryable_statuses`
//! - A body that fails to decode is not retried: the upstream answered
//! - A breaker trip mid-sequence ends the call as BREAKER_OPEN
//! - Attempts and sleeps race the shutdown signal; losing the race drops
//!   the permit, which records a retryable failure

use std::time::Duration;

use tokio::time::Instant;

use crate::api::types::{RequestPayload, UpstreamEnvelope};
use crate::config::schema::ClientConfig;
use crate::error::RawError;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics::{MetricsEvent, MetricsHook};
use crate::pool::transport::{RawResponse, Transport, TransportError};
use crate::resilience::backoff::backoff_delay;
use crate::resilience::circuit_breaker::{AttemptOutcome, CircuitBreaker, CircuitState};
use crate::resilience::timeouts::with_timeout;

/// Retry tuning.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub attempt_timeout: Duration,
    /// Sub-500 statuses that are still retried.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.retries.max_attempts.max(1),
            initial_backoff: config.retries.initial_backoff(),
            max_backoff: config.retries.max_backoff(),
            attempt_timeout: config.timeouts.attempt(),
            retryable_statuses: config.retries.retryable_statuses.clone(),
        }
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        status >= 500 || self.retryable_statuses.contains(&status)
    }
}

/// A decoded 2xx response.
#[derive(Debug, Clone)]
pub struct AttemptSuccess {
    pub envelope: UpstreamEnvelope,
    pub status: u16,
    pub attempts: u32,
}

/// Why [`RetryExecutor::execute`] gave up, and after how many attempts.
#[derive(Debug, Clone)]
pub struct ExecutionFailure {
    pub error: RawError,
    pub attempts: u32,
}

/// Drives attempts against one transport under one breaker.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    hook: MetricsHook,
    shutdown: Shutdown,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, hook: MetricsHook, shutdown: Shutdown) -> Self {
        Self {
            policy,
            hook,
            shutdown,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `payload` until it succeeds, fails definitively or runs out of attempts.
    pub async fn execute(
        &self,
        transport: &dyn Transport,
        breaker: &CircuitBreaker,
        payload: &RequestPayload,
    ) -> Result<AttemptSuccess, ExecutionFailure> {
        let result = self.run(transport, breaker, payload).await;

        let (attempts, outcome) = match &result {
            Ok(success) => (success.attempts, "success"),
            Err(failure) => (failure.attempts, outcome_label(&failure.error)),
        };
        self.hook.emit(MetricsEvent::RetryAttempts { attempts, outcome });

        result
    }

    async fn run(
        &self,
        transport: &dyn Transport,
        breaker: &CircuitBreaker,
        payload: &RequestPayload,
    ) -> Result<AttemptSuccess, ExecutionFailure> {
        let mut shutdown = self.shutdown.subscribe();
        let mut attempts = 0u32;

        loop {
            if shutdown.is_triggered() {
                return Err(cancelled(attempts));
            }

            let permit = match breaker.allow() {
                Ok(permit) => permit,
                Err(rejection) => return Err(breaker_open(rejection.state, rejection.retry_after, attempts)),
            };

            attempts += 1;
            let started = Instant::now();
            let response = tokio::select! {
                biased;
                _ = shutdown.wait() => return Err(cancelled(attempts)),
                response = with_timeout(self.policy.attempt_timeout, transport.send(payload)) => response,
            };

            let (outcome, result) = self.classify(response);
            permit.record(outcome);

            let error = match result {
                Ok((status, envelope)) => {
                    tracing::debug!(
                        attempt = attempts,
                        status,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Upstream attempt succeeded"
                    );
                    return Ok(AttemptSuccess {
                        envelope,
                        status,
                        attempts,
                    });
                }
                Err(error) => error,
            };

            if outcome == AttemptOutcome::NonRetryableFailure {
                tracing::debug!(attempt = attempts, kind = %error.kind(), "Upstream attempt failed, not retryable");
                return Err(ExecutionFailure { error, attempts });
            }

            if attempts >= self.policy.max_attempts {
                tracing::warn!(attempts, kind = %error.kind(), "Upstream retries exhausted");
                return Err(ExecutionFailure {
                    error: RawError::RetriesExhausted {
                        attempts,
                        last: Box::new(error),
                    },
                    attempts,
                });
            }

            if let Some(failure) = tripped(breaker, attempts) {
                tracing::warn!(attempts, kind = %error.kind(), "Circuit breaker opened, abandoning retries");
                return Err(failure);
            }

            let delay = backoff_delay(attempts, self.policy.initial_backoff, self.policy.max_backoff);
            tracing::warn!(
                attempt = attempts,
                max_attempts = self.policy.max_attempts,
                kind = %error.kind(),
                delay_ms = delay.as_millis() as u64,
                "Upstream attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = shutdown.wait() => return Err(cancelled(attempts)),
                _ = breaker.opened() => {
                    if let Some(failure) = tripped(breaker, attempts) {
                        tracing::debug!(attempts, "Circuit breaker opened during backoff");
                        return Err(failure);
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Map one exchange onto a breaker outcome and a decoded result.
    pub fn classify(
        &self,
        response: Result<RawResponse, TransportError>,
    ) -> (AttemptOutcome, Result<(u16, UpstreamEnvelope), RawError>) {
        let response = match response {
            Ok(response) => response,
            Err(err @ TransportError::Build(_)) => {
                return (AttemptOutcome::NonRetryableFailure, Err(RawError::Transport(err)))
            }
            Err(err) => return (AttemptOutcome::RetryableFailure, Err(RawError::Transport(err))),
        };

        if response.is_success() {
            return match serde_json::from_slice::<UpstreamEnvelope>(&response.body) {
                Ok(envelope) => (AttemptOutcome::Success, Ok((response.status, envelope))),
                Err(e) => (
                    AttemptOutcome::NonRetryableFailure,
                    Err(RawError::Serialization(e.to_string())),
                ),
            };
        }

        let error = upstream_error(&response);
        if self.policy.is_retryable_status(response.status) {
            (AttemptOutcome::RetryableFailure, Err(error))
        } else {
            (AttemptOutcome::NonRetryableFailure, Err(error))
        }
    }
}

fn upstream_error(response: &RawResponse) -> RawError {
    let (code, message) = match serde_json::from_slice::<UpstreamEnvelope>(&response.body) {
        Ok(UpstreamEnvelope { error: Some(body), .. }) => (
            body.code().map(str::to_string),
            body.message().map(str::to_string),
        ),
        _ => {
            let text = String::from_utf8_lossy(&response.body).trim().to_string();
            (None, (!text.is_empty()).then_some(text))
        }
    };

    RawError::Upstream {
        status: response.status,
        code,
        message,
    }
}

fn breaker_open(state: CircuitState, retry_after: Duration, attempts: u32) -> ExecutionFailure {
    ExecutionFailure {
        error: RawError::BreakerOpen { state, retry_after },
        attempts,
    }
}

/// Failure to return when the breaker is Open after an attempt.
fn tripped(breaker: &CircuitBreaker, attempts: u32) -> Option<ExecutionFailure> {
    let snapshot = breaker.snapshot();
    (snapshot.state == CircuitState::Open)
        .then(|| breaker_open(snapshot.state, snapshot.retry_after.unwrap_or_default(), attempts))
}

fn cancelled(attempts: u32) -> ExecutionFailure {
    ExecutionFailure {
        error: RawError::Transport(TransportError::Cancelled),
        attempts,
    }
}

fn outcome_label(error: &RawError) -> &'static str {
    match error {
        RawError::BreakerOpen { .. } => "breaker_open",
        RawError::RetriesExhausted { .. } => "exhausted",
        RawError::Transport(TransportError::Cancelled) => "cancelled",
        _ => "non_retryable",
    }
}
