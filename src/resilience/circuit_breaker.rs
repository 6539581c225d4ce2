//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: upstream assumed down, calls fail fast
//! - Half-Open: one trial call decides recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first allow() after the cooldown
//! Half-Open → Closed: trial succeeds (or gets a definitive non-retryable answer)
//! Half-Open → Open: trial fails, cooldown restarts
//! ```
//!
//! # Design Decisions
//! - Scoped per upstream by default, per credential when configured
//! - `allow()` hands out a [`Permit`]; the outcome is recorded by consuming it
//! - A permit dropped unrecorded counts as a retryable failure, so a
//!   cancelled trial cannot wedge the breaker in Half-Open
//! - Non-retryable answers prove the upstream is reachable: neutral in
//!   Closed, closing in Half-Open
//! - Transition events are emitted after the state lock is released

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::observability::metrics::{unix_millis, MetricsEvent, MetricsHook};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }

    pub(crate) fn gauge_value(&self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::HalfOpen => 1.0,
            Self::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one attempt, as far as the breaker cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetryableFailure,
    /// Neutral in Closed; on a Half-Open trial it counts as recovery.
    NonRetryableFailure,
}

/// Returned by [`CircuitBreaker::allow`] when no attempt may be made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circuit breaker is {state}")]
pub struct BreakerRejection {
    pub state: CircuitState,
    /// Time until the next trial may be granted.
    pub retry_after: Duration,
}

/// Breaker tuning.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    pub trial_in_flight: bool,
    /// Remaining cooldown when Open.
    pub retry_after: Option<Duration>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    changed_at: Instant,
    trial_in_flight: bool,
}

type Transition = (CircuitState, CircuitState);

/// Three-state circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    scope: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
    opened: Notify,
    hook: MetricsHook,
}

impl CircuitBreaker {
    pub fn new(scope: impl Into<String>, settings: BreakerSettings, hook: MetricsHook) -> Self {
        Self {
            scope: scope.into(),
            settings,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                changed_at: Instant::now(),
                trial_in_flight: false,
            }),
            opened: Notify::new(),
            hook,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Ask permission for one attempt.
    ///
    /// After the cooldown the first caller gets the single Half-Open trial;
    /// everyone else is rejected until the trial's outcome is recorded.
    pub fn allow(&self) -> Result<Permit<'_>, BreakerRejection> {
        if !self.settings.enabled {
            return Ok(Permit::new(self, false));
        }

        let mut transition = None;
        let decision = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => Ok(false),
                CircuitState::Open => {
                    let elapsed = inner.changed_at.elapsed();
                    if elapsed >= self.settings.cooldown {
                        transition = Some(set_state(&mut inner, CircuitState::HalfOpen));
                        inner.trial_in_flight = true;
                        Ok(true)
                    } else {
                        Err(BreakerRejection {
                            state: CircuitState::Open,
                            retry_after: self.settings.cooldown - elapsed,
                        })
                    }
                }
                CircuitState::HalfOpen if inner.trial_in_flight => Err(BreakerRejection {
                    state: CircuitState::HalfOpen,
                    retry_after: Duration::ZERO,
                }),
                CircuitState::HalfOpen => {
                    inner.trial_in_flight = true;
                    Ok(true)
                }
            }
        };

        self.publish(transition);
        match decision {
            Ok(trial) => Ok(Permit::new(self, trial)),
            Err(rejection) => {
                tracing::debug!(scope = %self.scope, state = %rejection.state, "Circuit breaker rejected call");
                Err(rejection)
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Resolves once the breaker is Open, immediately if it already is.
    pub async fn opened(&self) {
        let notified = self.opened.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.state() == CircuitState::Open {
            return;
        }
        notified.await;
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let retry_after = (inner.state == CircuitState::Open)
            .then(|| self.settings.cooldown.saturating_sub(inner.changed_at.elapsed()));
        BreakerSnapshot {
            state: inner.state,
            failures: inner.failures,
            trial_in_flight: inner.trial_in_flight,
            retry_after,
        }
    }

    fn record(&self, trial: bool, outcome: AttemptOutcome) {
        if !self.settings.enabled {
            return;
        }

        let transition = {
            let mut inner = self.lock();
            match (inner.state, trial, outcome) {
                (CircuitState::Closed, false, AttemptOutcome::Success) => {
                    inner.failures = 0;
                    None
                }
                (CircuitState::Closed, false, AttemptOutcome::RetryableFailure) => {
                    inner.failures = inner.failures.saturating_add(1);
                    if inner.failures >= self.settings.failure_threshold {
                        Some(set_state(&mut inner, CircuitState::Open))
                    } else {
                        None
                    }
                }
                (CircuitState::HalfOpen, true, AttemptOutcome::RetryableFailure) => {
                    inner.trial_in_flight = false;
                    Some(set_state(&mut inner, CircuitState::Open))
                }
                (CircuitState::HalfOpen, true, _) => {
                    inner.trial_in_flight = false;
                    Some(set_state(&mut inner, CircuitState::Closed))
                }
                // non-retryable in Closed, or a straggler from before a transition
                _ => None,
            }
        };

        self.publish(transition);
    }

    fn publish(&self, transition: Option<Transition>) {
        let Some((from, to)) = transition else {
            return;
        };

        match to {
            CircuitState::Open => {
                tracing::warn!(
                    scope = %self.scope,
                    from = %from,
                    cooldown_secs = self.settings.cooldown.as_secs_f64(),
                    "Circuit breaker opened"
                );
                self.opened.notify_waiters();
            }
            _ => tracing::info!(scope = %self.scope, from = %from, to = %to, "Circuit breaker transition"),
        }

        self.hook.emit(MetricsEvent::BreakerTransition {
            scope: self.scope.clone(),
            from,
            to,
            timestamp_ms: unix_millis(),
        });
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn set_state(inner: &mut BreakerInner, to: CircuitState) -> Transition {
    let from = inner.state;
    inner.state = to;
    inner.changed_at = Instant::now();
    if to == CircuitState::Closed {
        inner.failures = 0;
    }
    (from, to)
}

/// Permission for exactly one attempt.
///
/// Consume it with [`Permit::record`]. Dropping it unrecorded records a
/// retryable failure.
#[must_use = "a permit must be recorded; dropping it counts as a failure"]
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    recorded: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            recorded: false,
        }
    }

    /// True for the single Half-Open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record(mut self, outcome: AttemptOutcome) {
        self.recorded = true;
        self.breaker.record(self.trial, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.record(self.trial, AttemptOutcome::RetryableFailure);
        }
    }
}

/// Breakers keyed by scope, created on first use.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    settings: BreakerSettings,
    hook: MetricsHook,
}

impl BreakerRegistry {
    pub fn new(settings: BreakerSettings, hook: MetricsHook) -> Self {
        Self {
            breakers: DashMap::new(),
            settings,
            hook,
        }
    }

    pub fn get(&self, scope: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(scope) {
            return Arc::clone(existing.value());
        }
        let breaker = self
            .breakers
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(scope, self.settings, self.hook.clone())));
        Arc::clone(breaker.value())
    }

    /// Existing breaker for `scope`, without creating one.
    pub fn peek(&self, scope: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(scope).map(|b| Arc::clone(b.value()))
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
