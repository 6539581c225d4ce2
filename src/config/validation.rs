//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds ≥ 1)
//! - Check the endpoint URL parses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ConfigValidationError>>
//! - Out-of-range values are rejected, never clamped

use std::time::Duration;

use thiserror::Error;

use crate::config::schema::ClientConfig;

/// One rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ConfigValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Check every semantic constraint on `config`.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ConfigValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.api.endpoint_url() {
        errors.push(ConfigValidationError::new("api.base_url", format!("invalid URL: {e}")));
    } else if !(config.api.base_url.starts_with("http://") || config.api.base_url.starts_with("https://")) {
        errors.push(ConfigValidationError::new("api.base_url", "must use http or https"));
    }

    positive_secs(&mut errors, "timeouts.attempt_secs", config.timeouts.attempt_secs);
    positive_secs(&mut errors, "timeouts.connect_secs", config.timeouts.connect_secs);

    if config.retries.max_attempts == 0 {
        errors.push(ConfigValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    non_negative_secs(&mut errors, "retries.initial_backoff_secs", config.retries.initial_backoff_secs);
    non_negative_secs(&mut errors, "retries.max_backoff_secs", config.retries.max_backoff_secs);
    if config.retries.max_backoff_secs < config.retries.initial_backoff_secs {
        errors.push(ConfigValidationError::new(
            "retries.max_backoff_secs",
            "must not be smaller than initial_backoff_secs",
        ));
    }
    for status in &config.retries.retryable_statuses {
        if !(100..=599).contains(status) {
            errors.push(ConfigValidationError::new(
                "retries.retryable_statuses",
                format!("{status} is not an HTTP status"),
            ));
        }
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ConfigValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be at least 1",
        ));
    }
    positive_secs(&mut errors, "circuit_breaker.cooldown_secs", config.circuit_breaker.cooldown_secs);

    if config.cache.max_entries == 0 {
        errors.push(ConfigValidationError::new("cache.max_entries", "must be at least 1"));
    }
    if config.cache.max_connections == 0 {
        errors.push(ConfigValidationError::new("cache.max_connections", "must be at least 1"));
    }
    if config.cache.max_idle_connections > config.cache.max_connections {
        errors.push(ConfigValidationError::new(
            "cache.max_idle_connections",
            "must not exceed max_connections",
        ));
    }
    if config.cache.max_lifetime_secs == Some(0) {
        errors.push(ConfigValidationError::new("cache.max_lifetime_secs", "must be positive"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn positive_secs(errors: &mut Vec<ConfigValidationError>, field: &'static str, value: f64) {
    if Duration::try_from_secs_f64(value).is_err() || value <= 0.0 {
        errors.push(ConfigValidationError::new(field, format!("must be a positive number of seconds, got {value}")));
    }
}

fn non_negative_secs(errors: &mut Vec<ConfigValidationError>, field: &'static str, value: f64) {
    if Duration::try_from_secs_f64(value).is_err() {
        errors.push(ConfigValidationError::new(field, format!("must be zero or more seconds, got {value}")));
    }
}
