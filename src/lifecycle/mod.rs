//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! ChatAdsClient::shutdown()
//!     → shutdown.rs trigger
//!     → in-flight attempts and backoff sleeps abort (permits record failures)
//!     → transport cache cleared and closed
//! ```

pub mod shutdown;

pub use shutdown::{Shutdown, ShutdownListener};
