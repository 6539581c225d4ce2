//! Error sanitization.
//!
//! # Responsibilities
//! - Redact the credential from any text that leaves the crate
//! - Drop stack-trace-like content
//! - Map every [`RawError`] onto the public taxonomy
//!
//! # Design Decisions
//! - Every outward error goes through here, including breaker-open and
//!   retry-exhaustion, so callers see one shape
//! - Text mentioning auth headers is replaced wholesale
//! - The final message is re-checked for the raw credential before return

use crate::api::envelope::friendly_error_message;
use crate::error::{ClassifiedError, ErrorKind, RawError};
use crate::security::credential::Credential;
use crate::security::limits::MAX_ERROR_MESSAGE_CHARS;

/// Replacement for messages that reference authentication material.
pub const GENERIC_REDACTED_MESSAGE: &str = "Request error (details redacted for security)";

const SENSITIVE_MARKERS: &[&str] = &["x-api-key", "authorization", "bearer "];

/// Turns raw failures into [`ClassifiedError`]s for one credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorSanitizer<'a> {
    credential: Option<&'a Credential>,
}

impl<'a> ErrorSanitizer<'a> {
    pub fn new(credential: Option<&'a Credential>) -> Self {
        Self { credential }
    }

    /// Classify and redact a failure observed after `attempts` network attempts.
    pub fn sanitize(&self, raw: &RawError, attempts: u32) -> ClassifiedError {
        let (message, detail_code) = self.describe(raw);
        let last_kind = match raw {
            RawError::RetriesExhausted { last, .. } => Some(last.kind()),
            _ => None,
        };

        ClassifiedError {
            kind: raw.kind(),
            message,
            status_code: raw.status_code(),
            detail_code,
            last_kind,
            attempts,
        }
    }

    fn describe(&self, raw: &RawError) -> (String, Option<String>) {
        match raw {
            RawError::Validation(err) => (self.scrub(&err.to_string()), Some(err.code().to_string())),
            RawError::Upstream { status, code, message } => {
                let upstream_message = message.as_deref().map(|m| self.scrub(m));
                let text = match (code.as_deref(), upstream_message) {
                    (None, None) => format!("Upstream returned HTTP {status}"),
                    (code, fallback) => friendly_error_message(code, fallback.as_deref()),
                };
                (text, code.as_deref().map(|c| self.scrub(c)))
            }
            RawError::Rejected { code, message } => {
                let upstream_message = message.as_deref().map(|m| self.scrub(m));
                (
                    friendly_error_message(code.as_deref(), upstream_message.as_deref()),
                    code.as_deref().map(|c| self.scrub(c)),
                )
            }
            RawError::Serialization(detail) => (
                format!("Upstream response could not be decoded: {}", self.scrub(detail)),
                None,
            ),
            RawError::BreakerOpen { state, retry_after } => (
                format!(
                    "Upstream temporarily unavailable: circuit breaker is {state}; retry in {}s",
                    retry_after.as_secs().max(1)
                ),
                None,
            ),
            RawError::RetriesExhausted { attempts, last } => {
                let (inner, detail) = self.describe(last);
                (format!("Request failed after {attempts} attempts: {inner}"), detail)
            }
            RawError::Transport(err) => (self.scrub(&err.to_string()), None),
            RawError::Other(text) => (self.scrub(text), None),
        }
    }

    /// Redact arbitrary text destined for a caller or a log line.
    pub fn scrub(&self, text: &str) -> String {
        let kept: Vec<&str> = text
            .lines()
            .take_while(|line| !looks_like_trace(line))
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let mut cleaned = kept.join(" ");

        let secret = self.credential.filter(|c| !c.is_blank());
        if let Some(credential) = secret {
            cleaned = cleaned.replace(credential.expose(), &credential.redacted());
        }

        let lower = cleaned.to_ascii_lowercase();
        if SENSITIVE_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return GENERIC_REDACTED_MESSAGE.to_string();
        }

        if cleaned.chars().count() > MAX_ERROR_MESSAGE_CHARS {
            cleaned = cleaned.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
            cleaned.push_str("...");
        }

        if let Some(credential) = secret {
            if cleaned.contains(credential.expose()) {
                return GENERIC_REDACTED_MESSAGE.to_string();
            }
        }

        if cleaned.is_empty() {
            return ErrorKind::Unknown.as_str().to_string();
        }
        cleaned
    }
}

fn looks_like_trace(line: &str) -> bool {
    let trimmed = line.trim_start();
    let indented = trimmed.len() != line.len();
    let lower = trimmed.to_ascii_lowercase();

    if lower.starts_with("traceback (most recent call last)")
        || lower.starts_with("stack backtrace")
        || lower.starts_with("stack trace")
        || lower.starts_with("backtrace:")
    {
        return true;
    }
    if trimmed.starts_with("File \"") && trimmed.contains(", line ") {
        return true;
    }
    if !indented {
        return false;
    }
    if trimmed.starts_with("at ") {
        return true;
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && trimmed[digits..].starts_with(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::transport::TransportError;
    use crate::resilience::circuit_breaker::CircuitState;
    use crate::security::validator::ValidationError;
    use std::time::Duration;

    const KEY: &str = "my-secret-api-key";

    fn sanitizer(credential: &Credential) -> ErrorSanitizer<'_> {
        ErrorSanitizer::new(Some(credential))
    }

    #[test]
    fn test_scrub_masks_credential() {
        let credential = Credential::new(KEY);
        let out = sanitizer(&credential).scrub(&format!("Failed with key {KEY}"));
        assert!(!out.contains(KEY));
        assert!(out.contains(&credential.redacted()));
    }

    #[test]
    fn test_scrub_never_leaks_credential_anywhere_in_text() {
        let credential = Credential::new("sk_test_ABCDEFGHIJKLMNOP");
        let s = sanitizer(&credential);
        let templates = [
            "{}",
            "prefix {} suffix",
            "{}{}{}",
            "line one\n{}\nline two",
            "https://api.example.com/v1?key={}&x=1",
        ];
        for template in templates {
            let text = template.replace("{}", credential.expose());
            assert!(!s.scrub(&text).contains(credential.expose()), "leaked in {template:?}");
        }
        let long = format!("{}{}", "x".repeat(480), credential.expose());
        assert!(!s.scrub(&long).contains(credential.expose()));
    }

    #[test]
    fn test_scrub_replaces_auth_header_mentions() {
        let credential = Credential::new(KEY);
        let s = sanitizer(&credential);
        assert_eq!(s.scrub("Request failed with x-api-key: some_key"), GENERIC_REDACTED_MESSAGE);
        assert_eq!(s.scrub("Authorization header invalid"), GENERIC_REDACTED_MESSAGE);
    }

    #[test]
    fn test_scrub_leaves_safe_text_alone() {
        assert_eq!(ErrorSanitizer::default().scrub("Connection timeout"), "Connection timeout");
    }

    #[test]
    fn test_scrub_strips_stack_traces() {
        let s = ErrorSanitizer::default();
        let python = "upstream exploded\nTraceback (most recent call last):\n  File \"app.py\", line 3, in main\nValueError";
        assert_eq!(s.scrub(python), "upstream exploded");

        let js = "TypeError: x is undefined\n    at handler (/srv/app.js:10:5)\n    at next (/srv/app.js:1:1)";
        assert_eq!(s.scrub(js), "TypeError: x is undefined");

        let rust = "called panic\nstack backtrace:\n   0: std::panicking::begin_panic\n   1: app::main";
        assert_eq!(s.scrub(rust), "called panic");
    }

    #[test]
    fn test_scrub_bounds_length() {
        let out = ErrorSanitizer::default().scrub(&"a".repeat(2000));
        assert_eq!(out.chars().count(), MAX_ERROR_MESSAGE_CHARS + 3);
    }

    #[test]
    fn test_validation_error_classification() {
        let raw = RawError::from(ValidationError::MessageTooShort { min: 2, actual: 1 });
        let err = ErrorSanitizer::default().sanitize(&raw, 0);
        assert_eq!(err.kind, ErrorKind::ValidationError);
        assert_eq!(err.detail_code.as_deref(), Some("MESSAGE_TOO_SHORT"));
        assert!(err.message.contains("2 words"));
        assert_eq!(err.attempts, 0);
    }

    #[test]
    fn test_upstream_error_uses_friendly_message_and_code() {
        let credential = Credential::new(KEY);
        let raw = RawError::Upstream {
            status: 403,
            code: Some("FORBIDDEN".to_string()),
            message: Some(format!("key {KEY} revoked")),
        };
        let err = sanitizer(&credential).sanitize(&raw, 1);
        assert_eq!(err.kind, ErrorKind::Upstream4xx);
        assert_eq!(err.status_code, Some(403));
        assert_eq!(err.detail_code.as_deref(), Some("FORBIDDEN"));
        assert!(!err.message.contains(KEY));
    }

    #[test]
    fn test_exhausted_carries_last_kind() {
        let credential = Credential::new(KEY);
        let raw = RawError::RetriesExhausted {
            attempts: 3,
            last: Box::new(RawError::Transport(TransportError::Connect(format!(
                "dns error for https://api.test/?k={KEY}"
            )))),
        };
        let err = sanitizer(&credential).sanitize(&raw, 3);
        assert_eq!(err.kind, ErrorKind::RetriesExhausted);
        assert_eq!(err.last_kind, Some(ErrorKind::ConnectionError));
        assert_eq!(err.attempts, 3);
        assert!(!err.message.contains(KEY));
        assert!(err.message.starts_with("Request failed after 3 attempts"));
    }

    #[test]
    fn test_breaker_open_message() {
        let raw = RawError::BreakerOpen {
            state: CircuitState::Open,
            retry_after: Duration::from_secs(42),
        };
        let err = ErrorSanitizer::default().sanitize(&raw, 0);
        assert_eq!(err.kind, ErrorKind::BreakerOpen);
        assert!(err.message.contains("OPEN"));
        assert!(err.message.contains("42s"));
    }
}
