//! Metrics collection and callback hooks.
//!
//! # Responsibilities
//! - Record client metrics through the `metrics` facade
//! - Fan events out to callbacks registered on a [`MetricsHook`]
//!
//! # Metrics
//! - `chatads_call_latency_ms` (histogram): end-to-end latency by status
//! - `chatads_calls_total` (counter): calls by status
//! - `chatads_retry_attempts` (histogram): attempts per call
//! - `chatads_breaker_transitions_total` (counter): by from/to state
//! - `chatads_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `chatads_quota_warnings_total` (counter): by window
//! - `chatads_cache_size` (gauge) and `chatads_cache_evictions_total` (counter)
//!
//! # Design Decisions
//! - The library never installs a recorder; the embedding process chooses
//! - Callback list lives in an `ArcSwap`, so emitting is lock-free
//! - A panicking callback is logged and skipped, never propagated

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use metrics::{counter, gauge, histogram};
use serde_json::{json, Map, Value};

use crate::resilience::circuit_breaker::CircuitState;

/// Structured fields passed to hook callbacks.
pub type EventFields = Map<String, Value>;

/// Callback invoked with `(event_name, fields)`.
pub type MetricsCallback = Arc<dyn Fn(&str, &EventFields) + Send + Sync>;

/// Events observable through a [`MetricsHook`].
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsEvent {
    CallLatency {
        latency_ms: f64,
        status: &'static str,
        attempts: u32,
    },
    BreakerTransition {
        scope: String,
        from: CircuitState,
        to: CircuitState,
        timestamp_ms: u64,
    },
    RetryAttempts {
        attempts: u32,
        outcome: &'static str,
    },
    QuotaWarning {
        window: &'static str,
        message: String,
    },
}

impl MetricsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CallLatency { .. } => "call_latency",
            Self::BreakerTransition { .. } => "breaker_transition",
            Self::RetryAttempts { .. } => "retry_attempts",
            Self::QuotaWarning { .. } => "quota_warning",
        }
    }

    pub fn fields(&self) -> EventFields {
        let value = match self {
            Self::CallLatency { latency_ms, status, attempts } => json!({
                "latency_ms": latency_ms,
                "status": status,
                "attempts": attempts,
            }),
            Self::BreakerTransition { scope, from, to, timestamp_ms } => json!({
                "scope": scope,
                "from": from.as_str(),
                "to": to.as_str(),
                "timestamp_ms": timestamp_ms,
            }),
            Self::RetryAttempts { attempts, outcome } => json!({
                "attempts": attempts,
                "outcome": outcome,
            }),
            Self::QuotaWarning { window, message } => json!({
                "window": window,
                "message": message,
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn record(&self) {
        match self {
            Self::CallLatency { latency_ms, status, .. } => {
                histogram!("chatads_call_latency_ms", "status" => *status).record(*latency_ms);
                counter!("chatads_calls_total", "status" => *status).increment(1);
            }
            Self::BreakerTransition { from, to, .. } => {
                counter!(
                    "chatads_breaker_transitions_total",
                    "from" => from.as_str(),
                    "to" => to.as_str()
                )
                .increment(1);
                gauge!("chatads_breaker_state").set(to.gauge_value());
            }
            Self::RetryAttempts { attempts, outcome } => {
                histogram!("chatads_retry_attempts", "outcome" => *outcome).record(f64::from(*attempts));
            }
            Self::QuotaWarning { window, .. } => {
                counter!("chatads_quota_warnings_total", "window" => *window).increment(1);
            }
        }
    }
}

/// Registry of metrics callbacks, shared by every subsystem of one client.
#[derive(Clone, Default)]
pub struct MetricsHook {
    callbacks: Arc<ArcSwap<Vec<MetricsCallback>>>,
}

impl std::fmt::Debug for MetricsHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsHook")
            .field("callbacks", &self.callbacks.load().len())
            .finish()
    }
}

impl MetricsHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every subsequent event.
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(&str, &EventFields) + Send + Sync + 'static,
    {
        let callback: MetricsCallback = Arc::new(callback);
        self.callbacks.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&callback));
            next
        });
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.load().len()
    }

    /// Record `event` and invoke every registered callback.
    pub fn emit(&self, event: MetricsEvent) {
        event.record();

        let callbacks = self.callbacks.load();
        if callbacks.is_empty() {
            return;
        }

        let name = event.name();
        let fields = event.fields();
        for callback in callbacks.iter() {
            if catch_unwind(AssertUnwindSafe(|| callback(name, &fields))).is_err() {
                tracing::warn!(event = name, "Metrics callback panicked");
            }
        }
    }
}

/// Milliseconds since the Unix epoch, for event timestamps.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Record the number of cached transports.
pub fn record_cache_size(size: usize) {
    gauge!("chatads_cache_size").set(size as f64);
}

/// Record an LRU eviction from the transport cache.
pub fn record_cache_eviction() {
    counter!("chatads_cache_evictions_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_callbacks_receive_name_and_fields() {
        let hook = MetricsHook::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        hook.register(move |name, fields| {
            sink.lock().unwrap().push((name.to_string(), fields.clone()));
        });

        hook.emit(MetricsEvent::RetryAttempts { attempts: 3, outcome: "exhausted" });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "retry_attempts");
        assert_eq!(seen[0].1["attempts"], json!(3));
        assert_eq!(seen[0].1["outcome"], json!("exhausted"));
    }

    #[test]
    fn test_breaker_transition_fields() {
        let event = MetricsEvent::BreakerTransition {
            scope: "upstream".into(),
            from: CircuitState::Closed,
            to: CircuitState::Open,
            timestamp_ms: 1_700_000_000_000,
        };
        let fields = event.fields();
        assert_eq!(event.name(), "breaker_transition");
        assert_eq!(fields["from"], json!("CLOSED"));
        assert_eq!(fields["to"], json!("OPEN"));
    }

    #[test]
    fn test_panicking_callback_does_not_stop_others() {
        let hook = MetricsHook::new();
        let calls = Arc::new(Mutex::new(0));
        hook.register(|_, _| panic!("boom"));
        let counter = Arc::clone(&calls);
        hook.register(move |_, _| *counter.lock().unwrap() += 1);

        hook.emit(MetricsEvent::QuotaWarning { window: "daily", message: "x".into() });
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(hook.callback_count(), 2);
    }

    #[test]
    fn test_emit_without_callbacks_is_noop() {
        MetricsHook::new().emit(MetricsEvent::CallLatency {
            latency_ms: 12.5,
            status: "success",
            attempts: 1,
        });
    }
}
