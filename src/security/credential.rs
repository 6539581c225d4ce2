//! API credential handling.
//!
//! A [`Credential`] is opaque to this crate. The raw value is only ever read
//! when the transport attaches it to an outbound request; every other
//! rendering (`Debug`, `Display`, logs, errors) goes through [`redact`].

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// Marker appended after the visible prefix of a redacted secret.
pub const REDACTION_MASK: &str = "****";

/// Upper bound on how many leading characters survive redaction.
const MAX_VISIBLE_PREFIX: usize = 4;

/// An API key identifying the caller to the remote service.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// True when the credential is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// The raw secret. Only the transport should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Prefix + mask form, safe for logs and error text.
    pub fn redacted(&self) -> String {
        redact(&self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.redacted()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Serializes the redacted form only.
impl Serialize for Credential {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.redacted())
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Redact a secret down to a short prefix followed by [`REDACTION_MASK`].
///
/// At most a quarter of the secret (and never more than four characters) is
/// kept, so short secrets are masked entirely. The mask has a fixed width and
/// does not reveal the secret's length.
pub fn redact(secret: &str) -> String {
    let len = secret.chars().count();
    let visible = (len / 4).min(MAX_VISIBLE_PREFIX);
    let prefix: String = secret.chars().take(visible).collect();
    format!("{prefix}{REDACTION_MASK}")
}
