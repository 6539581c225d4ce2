//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (credentials only redacted)
//!     → metrics.rs (MetricsHook events, mirrored to the `metrics` facade)
//!
//! Consumers:
//!     → logging.rs subscriber (stderr, pretty or JSON)
//!     → registered MetricsHook callbacks
//!     → whatever `metrics` recorder the host process installs
//! ```
//!
//! # Design Decisions
//! - Emission is fire-and-forget; observers cannot fail a call
//! - No exporter is bundled

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{EventFields, MetricsEvent, MetricsHook};
