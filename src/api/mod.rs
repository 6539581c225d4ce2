//! Request and result surface.
//!
//! # Data Flow
//! ```text
//! MessageRequest (types.rs)
//!     → validator → RequestPayload (camelCase wire body)
//!     → upstream → UpstreamEnvelope
//!     → envelope.rs (normalize, attach metadata + quota signals)
//!     → ToolResult (JSON for the tool-invocation surface)
//! ```

pub mod envelope;
pub mod types;

pub use envelope::{normalize_envelope, normalize_reason, CallContext};
pub use types::{MessageRequest, Metadata, RequestPayload, ResultStatus, ToolResult, UpstreamEnvelope};
