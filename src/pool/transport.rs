//! Pooled HTTP transport to the recommendation API.
//!
//! # Responsibilities
//! - POST the JSON payload with the credential header
//! - Bound total in-flight connections per transport
//! - Map reqwest failures onto [`TransportError`]
//!
//! # Design Decisions
//! - The transport never retries and never classifies status codes;
//!   that belongs to the retry executor
//! - One transport per credential, so the credential is baked into the
//!   default headers and never handled per call

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use thiserror::Error;
use tokio::sync::Semaphore;
use url::Url;

use crate::api::types::RequestPayload;
use crate::config::schema::ClientConfig;
use crate::error::ErrorKind;
use crate::security::credential::Credential;

/// Header carrying the credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Failure below the HTTP status layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("transport has been closed")]
    Closed,

    #[error("request was cancelled")]
    Cancelled,

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Connect(_) | Self::Request(_) | Self::Closed => ErrorKind::ConnectionError,
            Self::Cancelled | Self::Build(_) => ErrorKind::Unknown,
        }
    }
}

/// Status and body of one upstream exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One reusable connection resource bound to a credential.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Perform a single POST of `payload`.
    async fn send(&self, payload: &RequestPayload) -> Result<RawResponse, TransportError>;

    /// Stop accepting new requests. In-flight requests finish normally.
    fn close(&self) {}
}

/// Builds transports for the client cache.
pub trait TransportFactory: Send + Sync {
    fn build(&self, credential: &Credential) -> Result<Arc<dyn Transport>, TransportError>;
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    connections: Arc<Semaphore>,
    closed: AtomicBool,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url.as_str())
            .field("available_connections", &self.connections.available_permits())
            .finish()
    }
}

impl HttpTransport {
    /// Build a transport for one credential.
    ///
    /// # Arguments
    /// * `url` - Full endpoint URL
    /// * `credential` - Sent as the `x-api-key` header on every request
    /// * `settings` - Pool sizing and timeouts
    pub fn new(url: Url, credential: &Credential, settings: &HttpSettings) -> Result<Self, TransportError> {
        let mut api_key = HeaderValue::from_str(credential.expose())
            .map_err(|_| TransportError::Build("credential is not a valid header value".to_string()))?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(settings.max_idle_connections)
            .pool_idle_timeout(settings.idle_timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Self {
            client,
            url,
            connections: Arc::new(Semaphore::new(settings.max_connections)),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &RequestPayload) -> Result<RawResponse, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let _slot = self
            .connections
            .acquire()
            .await
            .map_err(|_| TransportError::Closed)?;

        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(RawResponse::new(status, body.to_vec()))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    // reqwest embeds the URL in its Display; strip it, query strings may carry secrets
    let err = err.without_url();
    if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

/// Connection-pool settings shared by every [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub max_connections: usize,
    pub max_idle_connections: usize,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
}

impl HttpSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_connections: config.cache.max_connections,
            max_idle_connections: config.cache.max_idle_connections,
            idle_timeout: Duration::from_secs(config.cache.idle_timeout_secs),
            connect_timeout: config.timeouts.connect(),
        }
    }
}

/// Factory producing [`HttpTransport`]s for one endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    url: Url,
    settings: HttpSettings,
}

impl HttpTransportFactory {
    pub fn new(url: Url, settings: HttpSettings) -> Self {
        Self { url, settings }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let url = config
            .api
            .endpoint_url()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self::new(url, HttpSettings::from_config(config)))
    }
}

impl TransportFactory for HttpTransportFactory {
    fn build(&self, credential: &Credential) -> Result<Arc<dyn Transport>, TransportError> {
        let transport = HttpTransport::new(self.url.clone(), credential, &self.settings)?;
        tracing::debug!(credential = %credential, url = %self.url, "Built pooled transport");
        Ok(Arc::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> HttpSettings {
        HttpSettings {
            max_connections: 100,
            max_idle_connections: 20,
            idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_kinds() {
        assert_eq!(TransportError::Timeout(Duration::from_secs(1)).kind(), ErrorKind::Timeout);
        assert_eq!(TransportError::Connect("refused".into()).kind(), ErrorKind::ConnectionError);
        assert_eq!(TransportError::Cancelled.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_rejects_credential_with_control_characters() {
        let url = Url::parse("http://127.0.0.1:1/v1").unwrap();
        let err = HttpTransport::new(url, &Credential::new("bad\nkey"), &settings()).unwrap_err();
        assert!(matches!(err, TransportError::Build(_)));
        assert!(!err.to_string().contains("bad\nkey"));
    }

    #[tokio::test]
    async fn test_closed_transport_refuses_requests() {
        let url = Url::parse("http://127.0.0.1:1/v1").unwrap();
        let transport = HttpTransport::new(url, &Credential::new("key_123456"), &settings()).unwrap();
        transport.close();
        let payload = RequestPayload::from_request(&crate::api::types::MessageRequest::new("a b"));
        assert_eq!(transport.send(&payload).await.unwrap_err(), TransportError::Closed);
    }

    #[test]
    fn test_debug_omits_credential() {
        let url = Url::parse("http://127.0.0.1:1/v1").unwrap();
        let transport = HttpTransport::new(url, &Credential::new("sk_live_secret"), &settings()).unwrap();
        assert!(!format!("{transport:?}").contains("sk_live_secret"));
    }
}
