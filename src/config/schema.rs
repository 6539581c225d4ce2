//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.
//! Durations are fractional seconds so sub-second backoffs stay expressible.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::security::credential::Credential;

/// Root configuration for a [`ChatAdsClient`](crate::ChatAdsClient).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Upstream endpoint and credential.
    pub api: ApiConfig,

    /// Per-attempt and connect timeouts.
    pub timeouts: TimeoutConfig,

    /// Retry policy.
    pub retries: RetryConfig,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Transport cache and connection pool sizing.
    pub cache: CacheConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Upstream API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Default credential; a request may override it.
    pub api_key: Option<Credential>,

    /// Scheme and host, e.g. `https://api.getchatads.com`.
    pub base_url: String,

    /// Path appended to `base_url`.
    pub endpoint: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.getchatads.com".to_string(),
            endpoint: "/v1/chatads/messages".to_string(),
        }
    }
}

impl ApiConfig {
    /// `base_url` joined with `endpoint`.
    pub fn endpoint_url(&self) -> Result<Url, url::ParseError> {
        let base = self.base_url.trim_end_matches('/');
        let path = self.endpoint.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for one upstream attempt, in seconds.
    pub attempt_secs: f64,

    /// Connection establishment timeout, in seconds.
    pub connect_secs: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt_secs: 10.0,
            connect_secs: 5.0,
        }
    }
}

impl TimeoutConfig {
    pub fn attempt(&self) -> Duration {
        secs(self.attempt_secs)
    }

    pub fn connect(&self) -> Duration {
        secs(self.connect_secs)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt, in seconds. Doubles afterwards.
    pub initial_backoff_secs: f64,

    /// Upper bound for any single backoff, in seconds.
    pub max_backoff_secs: f64,

    /// HTTP statuses below 500 that are still retried.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_secs: 0.6,
            max_backoff_secs: 10.0,
            retryable_statuses: vec![429],
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        secs(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        secs(self.max_backoff_secs)
    }
}

/// How breakers are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BreakerScope {
    /// One breaker for the upstream endpoint.
    #[default]
    Upstream,
    /// One breaker per credential.
    Credential,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When false every call is permitted and nothing is tracked.
    pub enabled: bool,

    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,

    /// Time spent OPEN before a trial call, in seconds.
    pub cooldown_secs: f64,

    pub scope: BreakerScope,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            cooldown_secs: 60.0,
            scope: BreakerScope::Upstream,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        secs(self.cooldown_secs)
    }
}

/// Transport cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Credentials kept with a live connection pool.
    pub max_entries: usize,

    /// Age after which a cached pool is rebuilt. `None` keeps it forever.
    pub max_lifetime_secs: Option<u64>,

    /// Concurrent connections per pool.
    pub max_connections: usize,

    /// Idle connections kept per pool.
    pub max_idle_connections: usize,

    /// Idle connections are closed after this many seconds.
    pub idle_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10,
            max_lifetime_secs: Some(3600),
            max_connections: 100,
            max_idle_connections: 20,
            idle_timeout_secs: 90,
        }
    }
}

impl CacheConfig {
    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_secs.map(Duration::from_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
}

/// Seconds to `Duration`. Range is enforced by `validate_config`; an
/// unvalidated value saturates instead of panicking.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.retries.max_attempts, 3);
        assert_eq!(config.retries.retryable_statuses, vec![429]);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.cooldown(), Duration::from_secs(60));
        assert_eq!(config.timeouts.attempt(), Duration::from_secs(10));
        assert_eq!(config.cache.max_entries, 10);
        assert_eq!(config.cache.max_connections, 100);
        assert_eq!(config.cache.max_idle_connections, 20);
    }

    #[test]
    fn test_endpoint_url_joins_slashes() {
        let mut api = ApiConfig::default();
        assert_eq!(
            api.endpoint_url().unwrap().as_str(),
            "https://api.getchatads.com/v1/chatads/messages"
        );
        api.base_url = "http://127.0.0.1:8080/".into();
        api.endpoint = "v1/test".into();
        assert_eq!(api.endpoint_url().unwrap().as_str(), "http://127.0.0.1:8080/v1/test");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [retries]
            max_attempts = 5

            [circuit_breaker]
            scope = "credential"
            "#,
        )
        .unwrap();
        assert_eq!(config.retries.max_attempts, 5);
        assert_eq!(config.retries.initial_backoff(), Duration::from_millis(600));
        assert_eq!(config.circuit_breaker.scope, BreakerScope::Credential);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_debug_and_serialize_hide_api_key() {
        let mut config = ClientConfig::default();
        config.api.api_key = Some(Credential::new("sk_live_1234567890abcdef"));
        assert!(!format!("{config:?}").contains("1234567890"));
        assert!(!toml::to_string(&config).unwrap().contains("1234567890"));
    }
}
