//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → CHATADS_* environment overrides
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → consumed once by ChatAdsClient::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a new client
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, load_config, ConfigError};
pub use schema::{BreakerScope, ClientConfig, LogFormat};
pub use validation::{validate_config, ConfigValidationError};
