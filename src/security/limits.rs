//! Request limits.
//!
//! # Responsibilities
//! - Bound message word count and character length
//! - Bound the serialized request size before it reaches the transport
//!
//! # Design Decisions
//! - Limits are checked before any allocation for the network call
//! - Limits are fixed; the remote service enforces its own on top

/// Minimum number of whitespace-separated words in a message.
pub const MIN_MESSAGE_WORDS: usize = 2;

/// Maximum number of whitespace-separated words in a message.
pub const MAX_MESSAGE_WORDS: usize = 100;

/// Maximum message length in characters (not bytes).
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Maximum size of the serialized JSON request body.
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024;

/// Maximum length of any message that leaves the crate as an error.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;
