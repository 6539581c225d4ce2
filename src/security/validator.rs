//! Request validation.
//!
//! # Responsibilities
//! - Reject malformed requests before any network call
//! - Produce a distinct code per failed check
//!
//! # Design Decisions
//! - Pure function of the request and credential: no I/O, deterministic
//! - Checks run in a fixed order and stop at the first failure
//! - Format checks only; the remote service owns membership checks
//!   (e.g. whether a two-letter country code is actually assigned)

use std::net::IpAddr;
use thiserror::Error;

use crate::api::types::{MessageRequest, RequestPayload};
use crate::security::credential::Credential;
use crate::security::limits::{
    MAX_MESSAGE_CHARS, MAX_MESSAGE_WORDS, MAX_PAYLOAD_BYTES, MIN_MESSAGE_WORDS,
};

/// A request that failed local validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Message must contain at least {min} words (got {actual})")]
    MessageTooShort { min: usize, actual: usize },

    #[error("Message must be {max} words or fewer (got {actual})")]
    MessageTooManyWords { max: usize, actual: usize },

    #[error("Message must be {max} characters or fewer (got {actual})")]
    MessageTooLong { max: usize, actual: usize },

    #[error("Invalid IP address format")]
    InvalidIp,

    #[error("Country must be an ISO 3166-1 alpha-2 code such as \"US\"")]
    InvalidCountry,

    #[error("Language must be an ISO 639-1 code such as \"en\"")]
    InvalidLanguage,

    #[error("API key is missing; set CHATADS_API_KEY or pass a credential")]
    MissingCredential,

    #[error("Request payload is {actual} bytes; the limit is {max} bytes")]
    PayloadTooLarge { max: usize, actual: usize },
}

impl ValidationError {
    /// Stable per-check code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::MessageTooShort { .. } => "MESSAGE_TOO_SHORT",
            Self::MessageTooManyWords { .. } => "MESSAGE_TOO_MANY_WORDS",
            Self::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
            Self::InvalidIp => "INVALID_IP",
            Self::InvalidCountry => "INVALID_COUNTRY",
            Self::InvalidLanguage => "INVALID_LANGUAGE",
            Self::MissingCredential => "MISSING_CREDENTIAL",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
        }
    }
}

/// Validate a request and build the payload that will be sent upstream.
pub fn validate_request(
    request: &MessageRequest,
    credential: Option<&Credential>,
) -> Result<RequestPayload, ValidationError> {
    validate_message(&request.message)?;

    if let Some(ip) = request.ip.as_deref() {
        if ip.parse::<IpAddr>().is_err() {
            return Err(ValidationError::InvalidIp);
        }
    }

    if let Some(country) = request.country.as_deref() {
        if !is_two_letter(country, |c| c.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidCountry);
        }
    }

    if let Some(language) = request.language.as_deref() {
        if !is_two_letter(language, |c| c.is_ascii_lowercase()) {
            return Err(ValidationError::InvalidLanguage);
        }
    }

    match credential {
        Some(credential) if !credential.is_blank() => {}
        _ => return Err(ValidationError::MissingCredential),
    }

    let payload = RequestPayload::from_request(request);
    let size = serde_json::to_vec(&payload).map(|bytes| bytes.len()).unwrap_or(usize::MAX);
    if size > MAX_PAYLOAD_BYTES {
        return Err(ValidationError::PayloadTooLarge {
            max: MAX_PAYLOAD_BYTES,
            actual: size,
        });
    }

    Ok(payload)
}

fn validate_message(message: &str) -> Result<(), ValidationError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }

    let words = trimmed.split_whitespace().count();
    if words < MIN_MESSAGE_WORDS {
        return Err(ValidationError::MessageTooShort {
            min: MIN_MESSAGE_WORDS,
            actual: words,
        });
    }
    if words > MAX_MESSAGE_WORDS {
        return Err(ValidationError::MessageTooManyWords {
            max: MAX_MESSAGE_WORDS,
            actual: words,
        });
    }

    let chars = message.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(ValidationError::MessageTooLong {
            max: MAX_MESSAGE_CHARS,
            actual: chars,
        });
    }

    Ok(())
}

fn is_two_letter(value: &str, class: impl Fn(char) -> bool) -> bool {
    value.chars().count() == 2 && value.chars().all(class)
}
