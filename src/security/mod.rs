//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing request:
//!     → validator.rs (format and size checks against limits.rs)
//!     → credential.rs (opaque secret, redacted everywhere but the wire)
//!
//! Outgoing error:
//!     → sanitizer.rs (redact credential, strip traces, classify)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any validation failure before touching the network
//! - No raw credential in logs, errors or serialized config

pub mod credential;
pub mod limits;
pub mod sanitizer;
pub mod validator;

pub use credential::Credential;
pub use sanitizer::ErrorSanitizer;
pub use validator::{validate_request, ValidationError};
