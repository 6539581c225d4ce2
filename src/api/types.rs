//! Inbound request, outbound wire format and tool result types.

use serde::{Deserialize, Serialize};

use crate::quota::types::{QuotaWarning, RawUsage, UsageSummary};
use crate::security::credential::Credential;

/// A recommendation query as received from the tool-invocation surface.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageRequest {
    /// Conversation text to match against.
    pub message: String,

    /// End-user IP (IPv4 or IPv6 literal).
    #[serde(default)]
    pub ip: Option<String>,

    /// ISO 3166-1 alpha-2 country code, e.g. `US`.
    #[serde(default)]
    pub country: Option<String>,

    /// ISO 639-1 language code, e.g. `en`.
    #[serde(default)]
    pub language: Option<String>,

    /// End-user agent string.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Overrides the client's configured credential for this call.
    #[serde(skip)]
    pub credential: Option<Credential>,
}

impl MessageRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_credential(mut self, credential: impl Into<Credential>) -> Self {
        self.credential = Some(credential.into());
        self
    }
}

/// JSON body POSTed to the upstream endpoint. Absent fields are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl RequestPayload {
    pub fn from_request(request: &MessageRequest) -> Self {
        Self {
            message: request.message.trim().to_string(),
            ip: request.ip.clone(),
            user_agent: request.user_agent.clone(),
            country: request.country.clone(),
            language: request.language.clone(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Response envelope returned by the upstream API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamEnvelope {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub data: Option<MatchData>,
    #[serde(default)]
    pub meta: Option<ResponseMeta>,
    #[serde(default)]
    pub error: Option<UpstreamErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchData {
    #[serde(default)]
    pub matched: bool,
    #[serde(default)]
    pub ad: Option<Ad>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Affiliate payload attached to a match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ad {
    pub product: Option<String>,
    pub link: Option<String>,
    pub category: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMeta {
    pub request_id: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    #[serde(default, deserialize_with = "crate::quota::types::deserialize_lenient")]
    pub usage: Option<RawUsage>,
}

/// The upstream reports errors either as `{code, message}` or a bare string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UpstreamErrorBody {
    Detailed {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    Text(String),
}

impl UpstreamErrorBody {
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Detailed { code, .. } => code.as_deref(),
            Self::Text(_) => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Detailed { message, .. } => message.as_deref(),
            Self::Text(text) => Some(text.as_str()),
        }
    }
}

/// Discriminant of a [`ToolResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    NoMatch,
    Error,
}

/// Structured result handed back to the tool-invocation surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub status: ResultStatus,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliate_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliate_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Which local check rejected the request, for `VALIDATION_ERROR`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_code: Option<String>,
    /// Error code reported by the remote service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_error_code: Option<String>,
    pub metadata: Metadata,
}

/// Per-call diagnostics attached to every [`ToolResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub request_id: String,
    pub latency_ms: f64,
    pub status_code: Option<u16>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub usage_summary: Option<UsageSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub quota_warnings: Vec<QuotaWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_omits_absent_fields() {
        let payload = RequestPayload::from_request(&MessageRequest::new("test message"));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "test message" }));
    }

    #[test]
    fn test_payload_uses_camel_case_user_agent() {
        let request = MessageRequest::new("best laptop for coding")
            .with_ip("8.8.8.8")
            .with_user_agent("Mozilla/5.0")
            .with_country("US")
            .with_language("en");
        let json = serde_json::to_value(RequestPayload::from_request(&request)).unwrap();
        assert_eq!(json["userAgent"], "Mozilla/5.0");
        assert_eq!(json["ip"], "8.8.8.8");
        assert!(json.get("user_agent").is_none());
    }

    #[test]
    fn test_error_body_accepts_object_or_string() {
        let detailed: UpstreamEnvelope = serde_json::from_str(
            r#"{"success": false, "error": {"code": "QUOTA_EXCEEDED", "message": "Monthly quota reached"}}"#,
        )
        .unwrap();
        let error = detailed.error.unwrap();
        assert_eq!(error.code(), Some("QUOTA_EXCEEDED"));
        assert_eq!(error.message(), Some("Monthly quota reached"));

        let text: UpstreamEnvelope =
            serde_json::from_str(r#"{"error": "Internal server error"}"#).unwrap();
        let error = text.error.unwrap();
        assert_eq!(error.code(), None);
        assert_eq!(error.message(), Some("Internal server error"));
    }

    #[test]
    fn test_success_defaults_to_true() {
        let envelope: UpstreamEnvelope = serde_json::from_str("{}").unwrap();
        assert!(envelope.success);
    }

    #[test]
    fn test_malformed_usage_does_not_fail_envelope() {
        let body = r#"{
            "success": true,
            "data": {"matched": true, "ad": {"product": "Desk Lamp"}},
            "meta": {"request_id": "req_1", "usage": {"monthly_requests": -1, "daily_limit": "lots"}}
        }"#;
        let envelope: UpstreamEnvelope = serde_json::from_str(body).unwrap();
        let meta = envelope.meta.unwrap();
        assert_eq!(meta.request_id.as_deref(), Some("req_1"));
        assert!(meta.usage.is_none());
        assert!(envelope.data.unwrap().matched);
    }

    #[test]
    fn test_usage_block_decodes_when_well_formed() {
        let body = r#"{"usage": {"monthly_requests": 12, "free_tier_limit": 100}}"#;
        let meta: ResponseMeta = serde_json::from_str(body).unwrap();
        let usage = meta.usage.unwrap();
        assert_eq!(usage.monthly_requests, Some(12));
        assert_eq!(usage.free_tier_limit, Some(100));

        let meta: ResponseMeta = serde_json::from_str(r#"{"usage": null}"#).unwrap();
        assert!(meta.usage.is_none());
    }
}
