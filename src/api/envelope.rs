//! Upstream envelope normalization.
//!
//! # Responsibilities
//! - Turn a decoded envelope into a [`ToolResult`]
//! - Build per-call [`Metadata`] (request id, latency, quota signals)
//! - Render classified errors as error results
//!
//! # Design Decisions
//! - A `success: false` envelope is handed back as a [`Rejected`] so the
//!   caller sanitizes its text like any other failure
//! - The upstream request id wins; otherwise one is generated locally

use std::time::Duration;

use uuid::Uuid;

use crate::api::types::{Metadata, MatchData, ResponseMeta, ResultStatus, ToolResult, UpstreamEnvelope};
use crate::error::{ClassifiedError, ErrorKind, RawError};
use crate::quota::monitor::{format_notes, QuotaMonitor};

/// Fallback when the upstream gives neither a known code nor a message.
pub const GENERIC_UPSTREAM_MESSAGE: &str = "ChatAds could not process this request";

/// Facts about the exchange that produced a result.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallContext {
    pub status_code: Option<u16>,
    pub latency: Duration,
    pub attempts: u32,
}

/// An envelope that reported `success: false`.
#[derive(Debug, Clone)]
pub struct Rejected {
    pub error: RawError,
    pub metadata: Metadata,
}

/// Convert a decoded 2xx envelope into a result.
pub fn normalize_envelope(
    envelope: UpstreamEnvelope,
    ctx: &CallContext,
    monitor: &QuotaMonitor,
) -> Result<ToolResult, Rejected> {
    let metadata = build_metadata(envelope.meta.as_ref(), ctx, monitor);

    if !envelope.success {
        let (code, message) = envelope
            .error
            .as_ref()
            .map(|e| (e.code().map(str::to_string), e.message().map(str::to_string)))
            .unwrap_or_default();
        return Err(Rejected {
            error: RawError::Rejected { code, message },
            metadata,
        });
    }

    Ok(match_result(envelope.data, metadata))
}

fn match_result(data: Option<MatchData>, metadata: Metadata) -> ToolResult {
    let data = data.unwrap_or_default();
    let ad = data.ad.unwrap_or_default();
    let matched = data.matched;

    ToolResult {
        status: if matched { ResultStatus::Success } else { ResultStatus::NoMatch },
        matched,
        product: ad.product.filter(|_| matched),
        category: ad.category.filter(|_| matched),
        affiliate_link: ad.link.filter(|_| matched),
        affiliate_message: ad.message.filter(|_| matched),
        reason: normalize_reason(data.reason.as_deref()),
        error_code: None,
        error_message: None,
        validation_code: None,
        upstream_error_code: None,
        metadata,
    }
}

/// Render a sanitized error as a result.
pub fn error_result(error: &ClassifiedError, metadata: Metadata) -> ToolResult {
    let (validation_code, upstream_error_code) = match error.kind {
        ErrorKind::ValidationError => (error.detail_code.clone(), None),
        _ => (None, error.detail_code.clone()),
    };

    ToolResult {
        status: ResultStatus::Error,
        matched: false,
        product: None,
        category: None,
        affiliate_link: None,
        affiliate_message: None,
        reason: None,
        error_code: Some(error.kind.as_str().to_string()),
        error_message: Some(error.message.clone()),
        validation_code,
        upstream_error_code,
        metadata,
    }
}

/// Metadata from the response `meta` block plus call facts.
pub fn build_metadata(meta: Option<&ResponseMeta>, ctx: &CallContext, monitor: &QuotaMonitor) -> Metadata {
    let (usage_summary, quota_warnings) = match meta.and_then(|m| m.usage.as_ref()) {
        Some(usage) => {
            let (summary, warnings) = monitor.inspect(usage);
            (Some(summary), warnings)
        }
        None => (None, Vec::new()),
    };

    Metadata {
        request_id: meta
            .and_then(|m| m.request_id.clone())
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_request_id),
        latency_ms: round_latency(ctx.latency),
        status_code: ctx.status_code,
        attempts: ctx.attempts,
        country: meta.and_then(|m| m.country.clone()),
        language: meta.and_then(|m| m.language.clone()),
        notes: format_notes(&quota_warnings),
        usage_summary,
        quota_warnings,
    }
}

/// Metadata for a call that produced no usable response.
pub fn bare_metadata(ctx: &CallContext) -> Metadata {
    build_metadata(None, ctx, &QuotaMonitor::default())
}

/// `"no_match: insufficient data"` → `"No match: insufficient data"`.
///
/// Text without a colon passes through; blank text becomes `None`.
pub fn normalize_reason(reason: Option<&str>) -> Option<String> {
    let reason = reason?.trim();
    if reason.is_empty() {
        return None;
    }

    let Some((head, tail)) = reason.split_once(':') else {
        return Some(reason.to_string());
    };

    let words = head.trim().replace('_', " ");
    let mut chars = words.chars();
    let head = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    Some(format!("{head}:{tail}"))
}

/// Fixed hint for a known upstream code, else the upstream text, else a generic message.
pub fn friendly_error_message(code: Option<&str>, fallback: Option<&str>) -> String {
    let hint = match code.map(str::to_ascii_uppercase).as_deref() {
        Some("UNAUTHORIZED") => Some("API key is missing or invalid; set CHATADS_API_KEY to a valid key"),
        Some("FORBIDDEN") => Some("API key is not allowed to use this endpoint"),
        Some("QUOTA_EXCEEDED") => Some("Monthly quota exceeded; upgrade the plan or wait for the quota to reset"),
        Some("RATE_LIMITED") => Some("Rate limit reached; slow down and retry shortly"),
        Some("INVALID_INPUT") => Some("ChatAds rejected the request as invalid"),
        Some("SERVICE_UNAVAILABLE") => Some("ChatAds is temporarily unavailable; try again later"),
        _ => None,
    };

    match (hint, fallback.map(str::trim).filter(|f| !f.is_empty())) {
        (Some(hint), _) => hint.to_string(),
        (None, Some(fallback)) => fallback.to_string(),
        (None, None) => GENERIC_UPSTREAM_MESSAGE.to_string(),
    }
}

/// Milliseconds rounded to two decimals.
pub fn round_latency(latency: Duration) -> f64 {
    (latency.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

pub fn generate_request_id() -> String {
    format!("mcp-{}", Uuid::new_v4())
}
