//! The client context.
//!
//! # Responsibilities
//! - Own every stateful component: transport cache, breaker registry,
//!   retry executor, metrics hook and shutdown signal
//! - Orchestrate one call: validate → acquire → execute → normalize
//! - Turn every failure into a sanitized error result
//!
//! # Data Flow
//! ```text
//! send_message(request)
//!     → validate_request            (fail: VALIDATION_ERROR, no network)
//!     → ClientCache::acquire        (transport for the resolved credential)
//!     → RetryExecutor::execute      (breaker consulted before each attempt)
//!     → normalize_envelope          (quota warnings, metadata)
//!     → ToolResult
//! ```
//!
//! # Design Decisions
//! - No globals: two clients never share breakers or pools
//! - `send_message` never returns `Err`; failures are results with status `error`

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::api::envelope::{bare_metadata, error_result, normalize_envelope, round_latency, CallContext};
use crate::api::types::{Metadata, MessageRequest, RequestPayload, ResultStatus, ToolResult};
use crate::config::loader::{self, ConfigError};
use crate::config::schema::{BreakerScope, ClientConfig};
use crate::config::validation::{validate_config, ConfigValidationError};
use crate::error::{ClassifiedError, RawError};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics::{MetricsEvent, MetricsHook};
use crate::pool::cache::ClientCache;
use crate::pool::transport::{HttpTransportFactory, TransportError, TransportFactory};
use crate::quota::monitor::QuotaMonitor;
use crate::resilience::circuit_breaker::{BreakerRegistry, BreakerSettings, CircuitBreaker, CircuitState};
use crate::resilience::retries::{RetryExecutor, RetryPolicy};
use crate::resilience::timeouts::with_timeout;
use crate::security::credential::Credential;
use crate::security::sanitizer::ErrorSanitizer;
use crate::security::validator::{validate_request, ValidationError};

const UPSTREAM_SCOPE: &str = "upstream";
const HEALTH_PROBE_MESSAGE: &str = "health check probe";

/// Failure to construct a client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    InvalidConfig(Vec<ConfigValidationError>),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Overall verdict of [`ChatAdsClient::health_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of a single upstream probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub api_reachable: bool,
    /// Lowercase breaker state name, or `disabled`.
    pub circuit_breaker_state: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Resilient client for the recommendation API.
pub struct ChatAdsClient {
    config: ClientConfig,
    endpoint: String,
    cache: ClientCache,
    breakers: BreakerRegistry,
    executor: RetryExecutor,
    monitor: QuotaMonitor,
    hook: MetricsHook,
    shutdown: Shutdown,
}

impl std::fmt::Debug for ChatAdsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatAdsClient")
            .field("endpoint", &self.endpoint)
            .field("cached_transports", &self.cache.len())
            .field("breakers", &self.breakers.len())
            .finish()
    }
}

impl ChatAdsClient {
    /// Build a client that talks HTTP to the configured endpoint.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        validate_config(&config).map_err(ClientError::InvalidConfig)?;
        let factory = HttpTransportFactory::from_config(&config)?;
        Self::with_factory(config, Arc::new(factory))
    }

    /// Build a client from `CHATADS_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(loader::from_env()?)
    }

    /// Build a client with a custom transport factory.
    pub fn with_factory(config: ClientConfig, factory: Arc<dyn TransportFactory>) -> Result<Self, ClientError> {
        validate_config(&config).map_err(ClientError::InvalidConfig)?;

        let capacity = NonZeroUsize::new(config.cache.max_entries).ok_or_else(|| {
            ClientError::InvalidConfig(vec![ConfigValidationError {
                field: "cache.max_entries",
                reason: "must be at least 1".to_string(),
            }])
        })?;
        let endpoint = config
            .api
            .endpoint_url()
            .map(|url| url.to_string())
            .map_err(|e| TransportError::Build(e.to_string()))?;

        let hook = MetricsHook::new();
        let shutdown = Shutdown::new();
        let breaker_settings = BreakerSettings {
            enabled: config.circuit_breaker.enabled,
            failure_threshold: config.circuit_breaker.failure_threshold,
            cooldown: config.circuit_breaker.cooldown(),
        };

        tracing::info!(
            endpoint = %endpoint,
            max_attempts = config.retries.max_attempts,
            breaker_threshold = config.circuit_breaker.failure_threshold,
            breaker_scope = ?config.circuit_breaker.scope,
            cache_entries = config.cache.max_entries,
            "ChatAds client initialized"
        );

        Ok(Self {
            cache: ClientCache::new(capacity, config.cache.max_lifetime(), factory),
            breakers: BreakerRegistry::new(breaker_settings, hook.clone()),
            executor: RetryExecutor::new(RetryPolicy::from_config(&config), hook.clone(), shutdown.clone()),
            monitor: QuotaMonitor::default(),
            hook,
            shutdown,
            endpoint,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Hook for registering metrics callbacks.
    pub fn metrics_hook(&self) -> &MetricsHook {
        &self.hook
    }

    /// Send one recommendation query.
    pub async fn send_message(&self, request: MessageRequest) -> ToolResult {
        let started = Instant::now();
        let credential = self.resolve_credential(&request);
        let sanitizer = ErrorSanitizer::new(credential.as_ref());

        let payload = match validate_request(&request, credential.as_ref()) {
            Ok(payload) => payload,
            Err(err) => return self.fail(&sanitizer, RawError::from(err), started, 0),
        };
        let Some(credential) = credential.as_ref() else {
            return self.fail(&sanitizer, RawError::from(ValidationError::MissingCredential), started, 0);
        };

        if self.shutdown.is_triggered() {
            return self.fail(&sanitizer, RawError::from(TransportError::Cancelled), started, 0);
        }
        let transport = match self.cache.acquire(credential) {
            Ok(transport) => transport,
            Err(err) => return self.fail(&sanitizer, RawError::from(err), started, 0),
        };
        let breaker = self.breaker_for(credential);

        let success = match self.executor.execute(transport.as_ref(), &breaker, &payload).await {
            Ok(success) => success,
            Err(failure) => return self.fail(&sanitizer, failure.error, started, failure.attempts),
        };

        let ctx = CallContext {
            status_code: Some(success.status),
            latency: started.elapsed(),
            attempts: success.attempts,
        };
        match normalize_envelope(success.envelope, &ctx, &self.monitor) {
            Ok(result) => {
                self.observe(&result);
                result
            }
            Err(rejected) => {
                let classified = sanitizer.sanitize(&rejected.error, success.attempts);
                self.finish_error(&classified, rejected.metadata)
            }
        }
    }

    /// Probe the upstream once, outside the retry and breaker accounting.
    pub async fn health_check(&self) -> HealthReport {
        let credential = self.config.api.api_key.clone().filter(|c| !c.is_blank());
        let sanitizer = ErrorSanitizer::new(credential.as_ref());

        let mut report = HealthReport {
            status: HealthStatus::Unhealthy,
            api_reachable: false,
            circuit_breaker_state: "disabled".to_string(),
            endpoint: self.endpoint.clone(),
            latency_ms: None,
            status_code: None,
            error_code: None,
            error_message: None,
        };

        let Some(credential) = credential.as_ref() else {
            let err = sanitizer.sanitize(&RawError::from(ValidationError::MissingCredential), 0);
            report.error_code = Some(err.kind.as_str().to_string());
            report.error_message = Some(err.message);
            return report;
        };

        if self.config.circuit_breaker.enabled {
            let snapshot = self.breaker_for(credential).snapshot();
            report.circuit_breaker_state = snapshot.state.as_str().to_ascii_lowercase();
            let blocked = match snapshot.state {
                CircuitState::Open => snapshot.retry_after.is_some_and(|left| !left.is_zero()),
                CircuitState::HalfOpen => snapshot.trial_in_flight,
                CircuitState::Closed => false,
            };
            if blocked {
                let err = sanitizer.sanitize(
                    &RawError::BreakerOpen {
                        state: snapshot.state,
                        retry_after: snapshot.retry_after.unwrap_or_default(),
                    },
                    0,
                );
                report.error_code = Some(err.kind.as_str().to_string());
                report.error_message = Some(err.message);
                return report;
            }
        }

        let acquired = if self.shutdown.is_triggered() {
            Err(TransportError::Cancelled)
        } else {
            self.cache.acquire(credential)
        };
        let transport = match acquired {
            Ok(transport) => transport,
            Err(err) => {
                let err = sanitizer.sanitize(&RawError::from(err), 0);
                report.error_code = Some(err.kind.as_str().to_string());
                report.error_message = Some(err.message);
                return report;
            }
        };

        let payload = RequestPayload::from_request(&MessageRequest::new(HEALTH_PROBE_MESSAGE));
        let started = Instant::now();
        let response = with_timeout(self.executor.policy().attempt_timeout, transport.send(&payload)).await;
        report.latency_ms = Some(round_latency(started.elapsed()));

        match self.executor.classify(response) {
            (_, Ok((status, _))) => {
                report.status = HealthStatus::Healthy;
                report.api_reachable = true;
                report.status_code = Some(status);
            }
            (_, Err(raw)) => {
                let err = sanitizer.sanitize(&raw, 1);
                report.status_code = err.status_code;
                report.api_reachable = err.status_code.is_some();
                report.status = match err.status_code {
                    Some(status) if status < 500 => HealthStatus::Degraded,
                    _ => HealthStatus::Unhealthy,
                };
                report.error_code = Some(err.detail_code.clone().unwrap_or_else(|| err.kind.as_str().to_string()));
                report.error_message = Some(err.message);
            }
        }

        tracing::info!(
            status = ?report.status,
            api_reachable = report.api_reachable,
            breaker = %report.circuit_breaker_state,
            "ChatAds health check"
        );
        report
    }

    /// State of the breaker guarding calls made with the configured credential.
    pub fn breaker_state(&self) -> Option<CircuitState> {
        if !self.config.circuit_breaker.enabled {
            return None;
        }
        let key = match (self.config.circuit_breaker.scope, self.config.api.api_key.as_ref()) {
            (BreakerScope::Upstream, _) => UPSTREAM_SCOPE.to_string(),
            (BreakerScope::Credential, Some(credential)) => credential_scope(credential),
            (BreakerScope::Credential, None) => return None,
        };
        Some(
            self.breakers
                .peek(&key)
                .map_or(CircuitState::Closed, |breaker| breaker.state()),
        )
    }

    /// Number of credentials with a live connection pool.
    pub fn cached_transports(&self) -> usize {
        self.cache.len()
    }

    /// Abort in-flight attempts and backoff sleeps, then close every pool.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
        self.cache.clear();
        tracing::info!("ChatAds client shut down");
    }

    fn resolve_credential(&self, request: &MessageRequest) -> Option<Credential> {
        request
            .credential
            .clone()
            .filter(|c| !c.is_blank())
            .or_else(|| self.config.api.api_key.clone())
    }

    fn breaker_for(&self, credential: &Credential) -> Arc<CircuitBreaker> {
        match self.config.circuit_breaker.scope {
            BreakerScope::Upstream => self.breakers.get(UPSTREAM_SCOPE),
            BreakerScope::Credential => self.breakers.get(&credential_scope(credential)),
        }
    }

    fn fail(&self, sanitizer: &ErrorSanitizer<'_>, raw: RawError, started: Instant, attempts: u32) -> ToolResult {
        let classified = sanitizer.sanitize(&raw, attempts);
        let metadata = bare_metadata(&CallContext {
            status_code: classified.status_code,
            latency: started.elapsed(),
            attempts,
        });
        self.finish_error(&classified, metadata)
    }

    fn finish_error(&self, classified: &ClassifiedError, metadata: Metadata) -> ToolResult {
        tracing::warn!(
            request_id = %metadata.request_id,
            error_code = %classified.kind,
            detail_code = classified.detail_code.as_deref().unwrap_or(""),
            attempts = classified.attempts,
            message = %classified.message,
            "ChatAds call failed"
        );
        let result = error_result(classified, metadata);
        self.observe(&result);
        result
    }

    fn observe(&self, result: &ToolResult) {
        let status = match result.status {
            ResultStatus::Success => "success",
            ResultStatus::NoMatch => "no_match",
            ResultStatus::Error => "error",
        };
        let metadata = &result.metadata;

        if result.status != ResultStatus::Error {
            tracing::info!(
                request_id = %metadata.request_id,
                status,
                matched = result.matched,
                latency_ms = metadata.latency_ms,
                attempts = metadata.attempts,
                "ChatAds call completed"
            );
        }
        if let Some(notes) = &metadata.notes {
            tracing::warn!(request_id = %metadata.request_id, notes = %notes, "ChatAds quota warning");
        }

        for warning in &metadata.quota_warnings {
            self.hook.emit(MetricsEvent::QuotaWarning {
                window: warning.window(),
                message: warning.message(),
            });
        }
        self.hook.emit(MetricsEvent::CallLatency {
            latency_ms: metadata.latency_ms,
            status,
            attempts: metadata.attempts,
        });
    }
}

fn credential_scope(credential: &Credential) -> String {
    let mut hasher = DefaultHasher::new();
    credential.expose().hash(&mut hasher);
    format!("credential:{:016x}", hasher.finish())
}
