//! Resilient client for the ChatAds recommendation API.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod pool;
pub mod quota;
pub mod resilience;
pub mod security;

pub use api::types::{MessageRequest, Metadata, ResultStatus, ToolResult};
pub use client::{ChatAdsClient, ClientError, HealthReport, HealthStatus};
pub use config::schema::ClientConfig;
pub use error::{ClassifiedError, ErrorKind, RawError};
pub use lifecycle::Shutdown;
pub use observability::metrics::{MetricsCallback, MetricsEvent, MetricsHook};
pub use resilience::CircuitState;
pub use security::Credential;
