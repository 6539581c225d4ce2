//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{ClientConfig, LogFormat};
use crate::config::validation::{validate_config, ConfigValidationError};
use crate::security::credential::Credential;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{var}: {reason}")]
    Env { var: &'static str, reason: String },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ConfigValidationError>),
}

fn join(errors: &[ConfigValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let config = read_file(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Defaults overridden by `CHATADS_*` environment variables.
pub fn from_env() -> Result<ClientConfig, ConfigError> {
    from_lookup(|name| std::env::var(name).ok())
}

/// Optional TOML file, then environment overrides, then validation.
pub fn load(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => ClientConfig::default(),
    };
    apply_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Like [`from_env`] with an explicit variable source.
pub fn from_lookup<F>(lookup: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::default();
    apply_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

fn apply_overrides<F>(config: &mut ClientConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(key) = get("CHATADS_API_KEY") {
        config.api.api_key = Some(Credential::new(key));
    }
    if let Some(base_url) = get("CHATADS_BASE_URL") {
        config.api.base_url = base_url;
    }
    if let Some(endpoint) = get("CHATADS_ENDPOINT") {
        config.api.endpoint = endpoint;
    }
    if let Some(v) = get("CHATADS_TIMEOUT_SECS") {
        config.timeouts.attempt_secs = parse("CHATADS_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = get("CHATADS_MAX_RETRIES") {
        config.retries.max_attempts = parse("CHATADS_MAX_RETRIES", &v)?;
    }
    if let Some(v) = get("CHATADS_BACKOFF_SECS") {
        config.retries.initial_backoff_secs = parse("CHATADS_BACKOFF_SECS", &v)?;
    }
    if let Some(v) = get("CHATADS_BREAKER_THRESHOLD") {
        config.circuit_breaker.failure_threshold = parse("CHATADS_BREAKER_THRESHOLD", &v)?;
    }
    if let Some(v) = get("CHATADS_BREAKER_COOLDOWN_SECS") {
        config.circuit_breaker.cooldown_secs = parse("CHATADS_BREAKER_COOLDOWN_SECS", &v)?;
    }
    if let Some(v) = get("CHATADS_MAX_CACHED_CLIENTS") {
        config.cache.max_entries = parse("CHATADS_MAX_CACHED_CLIENTS", &v)?;
    }
    if let Some(v) = get("CHATADS_LOG_FORMAT") {
        config.observability.log_format = match v.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(ConfigError::Env {
                    var: "CHATADS_LOG_FORMAT",
                    reason: format!("expected \"pretty\" or \"json\", got {other:?}"),
                })
            }
        };
    }

    Ok(())
}

fn parse<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Env {
        var,
        reason: format!("cannot parse {value:?}"),
    })
}
