//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream call:
//!     → circuit_breaker.rs (allow? else BREAKER_OPEN, no attempt)
//!     → timeouts.rs (per-attempt deadline)
//!     → retries.rs (classify, record on the permit, retry with backoff.rs)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream attempt has a deadline
//! - The breaker is consulted before every attempt, not once per call
//! - Retry counts are bounded; exhaustion surfaces the last failure kind

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{
    AttemptOutcome, BreakerRegistry, BreakerRejection, BreakerSettings, CircuitBreaker, CircuitState, Permit,
};
pub use retries::{AttemptSuccess, ExecutionFailure, RetryExecutor, RetryPolicy};
