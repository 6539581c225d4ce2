//! Usage and quota types.

use serde::{Deserialize, Deserializer, Serialize};

/// Usage block exactly as the upstream reports it in `meta.usage`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUsage {
    pub monthly_requests: Option<u64>,
    #[serde(alias = "monthly_limit")]
    pub free_tier_limit: Option<u64>,
    #[serde(alias = "monthly_remaining")]
    pub free_tier_remaining: Option<u64>,
    pub daily_requests: Option<u64>,
    pub daily_limit: Option<u64>,
    pub minute_requests: Option<u64>,
    pub minute_limit: Option<u64>,
    pub is_free_tier: Option<bool>,
    pub has_credit_card: Option<bool>,
}

/// Decode `meta.usage`, treating a malformed block as absent.
///
/// Usage only feeds advisory warnings, so a bad counter must not fail the
/// envelope it arrived in.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<RawUsage>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match serde_json::from_value(value) {
        Ok(usage) => Some(usage),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed usage block");
            None
        }
    }))
}

/// Used/limit pair for one accounting window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageWindow {
    pub used: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonthlyUsage {
    pub used: Option<u64>,
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
}

/// Normalized usage relayed to the caller. Never computed locally beyond
/// deriving `remaining` from `limit - used` when the upstream omits it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    pub monthly: MonthlyUsage,
    pub daily: UsageWindow,
    pub minute: UsageWindow,
    pub is_free_tier: Option<bool>,
    pub has_credit_card: Option<bool>,
}

/// Advisory signal derived from upstream usage counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "window", rename_all = "snake_case")]
pub enum QuotaWarning {
    Monthly { remaining: u64, limit: Option<u64> },
    Daily { used: u64, limit: u64, percent: u64 },
    Minute { used: u64, limit: u64 },
}

impl QuotaWarning {
    /// Stable window name, used as a metrics label.
    pub fn window(&self) -> &'static str {
        match self {
            Self::Monthly { .. } => "monthly",
            Self::Daily { .. } => "daily",
            Self::Minute { .. } => "minute",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Monthly { remaining, .. } => {
                format!("Monthly quota low: {remaining} requests remaining")
            }
            Self::Daily { used, limit, percent } => {
                format!("Daily quota {percent}% used ({used}/{limit})")
            }
            Self::Minute { used, limit } => {
                format!("Approaching per-minute rate limit ({used}/{limit})")
            }
        }
    }
}
