//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! credential
//!     → cache.rs (LRU lookup, lifetime check)
//!     → miss: TransportFactory::build (transport.rs)
//!     → TransportHandle lease handed to the retry executor
//! ```
//!
//! # Design Decisions
//! - One reqwest pool per credential, at most `cache.max_entries` pools
//! - Transports are trait objects so tests can script upstream behavior

pub mod cache;
pub mod lru;
pub mod transport;

pub use cache::{ClientCache, TransportHandle};
pub use transport::{
    HttpTransport, HttpTransportFactory, RawResponse, Transport, TransportError, TransportFactory,
};
