//! Quota subsystem.
//!
//! # Data Flow
//! ```text
//! Successful upstream response
//!     → meta.usage (types.rs: RawUsage)
//!     → monitor.rs (summarize + derive warnings)
//!     → UsageSummary + Vec<QuotaWarning> attached to the result metadata
//! ```

pub mod monitor;
pub mod types;

pub use monitor::QuotaMonitor;
pub use types::{QuotaWarning, RawUsage, UsageSummary};
