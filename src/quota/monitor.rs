//! Quota inspection.
//!
//! # Responsibilities
//! - Normalize the upstream usage block into a [`UsageSummary`]
//! - Derive advisory [`QuotaWarning`]s from the reported counters
//!
//! # Design Decisions
//! - Pure: no local counters, the upstream is the source of truth
//! - Warnings annotate a result and never change its outcome
//! - Missing counters produce no warning for that window

use crate::quota::types::{MonthlyUsage, QuotaWarning, RawUsage, UsageSummary, UsageWindow};

/// Thresholds for deriving quota warnings.
#[derive(Debug, Clone, Copy)]
pub struct QuotaMonitor {
    /// Warn when fewer than this many monthly requests remain.
    pub monthly_remaining_floor: u64,
    /// Warn when daily used/limit reaches this ratio.
    pub daily_ratio: f64,
    /// Warn when minute usage is within this many requests of its limit.
    pub minute_headroom: u64,
}

impl Default for QuotaMonitor {
    fn default() -> Self {
        Self {
            monthly_remaining_floor: 10,
            daily_ratio: 0.9,
            minute_headroom: 1,
        }
    }
}

impl QuotaMonitor {
    /// Summarize a usage block and collect its warnings.
    pub fn inspect(&self, usage: &RawUsage) -> (UsageSummary, Vec<QuotaWarning>) {
        let summary = summarize(usage);
        let warnings = self.warnings(&summary);
        (summary, warnings)
    }

    pub fn warnings(&self, summary: &UsageSummary) -> Vec<QuotaWarning> {
        let mut warnings = Vec::new();

        if let Some(remaining) = summary.monthly.remaining {
            if remaining < self.monthly_remaining_floor {
                warnings.push(QuotaWarning::Monthly {
                    remaining,
                    limit: summary.monthly.limit,
                });
            }
        }

        if let (Some(used), Some(limit)) = (summary.daily.used, summary.daily.limit) {
            if limit > 0 {
                let ratio = used as f64 / limit as f64;
                if ratio >= self.daily_ratio {
                    warnings.push(QuotaWarning::Daily {
                        used,
                        limit,
                        percent: (ratio * 100.0).round() as u64,
                    });
                }
            }
        }

        if let (Some(used), Some(limit)) = (summary.minute.used, summary.minute.limit) {
            if limit > 0 && used.saturating_add(self.minute_headroom) >= limit {
                warnings.push(QuotaWarning::Minute { used, limit });
            }
        }

        warnings
    }
}

/// Normalize the upstream usage block.
pub fn summarize(usage: &RawUsage) -> UsageSummary {
    let remaining = usage.free_tier_remaining.or_else(|| {
        usage
            .free_tier_limit
            .zip(usage.monthly_requests)
            .map(|(limit, used)| limit.saturating_sub(used))
    });

    UsageSummary {
        monthly: MonthlyUsage {
            used: usage.monthly_requests,
            limit: usage.free_tier_limit,
            remaining,
        },
        daily: UsageWindow {
            used: usage.daily_requests,
            limit: usage.daily_limit,
        },
        minute: UsageWindow {
            used: usage.minute_requests,
            limit: usage.minute_limit,
        },
        is_free_tier: usage.is_free_tier,
        has_credit_card: usage.has_credit_card,
    }
}

/// Join warning messages the way they are surfaced in result notes.
pub fn format_notes(warnings: &[QuotaWarning]) -> Option<String> {
    if warnings.is_empty() {
        return None;
    }
    Some(
        warnings
            .iter()
            .map(QuotaWarning::message)
            .collect::<Vec<_>>()
            .join(" | "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(monthly: (u64, u64), daily: (u64, u64), minute: (u64, u64)) -> RawUsage {
        RawUsage {
            monthly_requests: Some(monthly.0),
            free_tier_limit: Some(monthly.1),
            free_tier_remaining: None,
            daily_requests: Some(daily.0),
            daily_limit: Some(daily.1),
            minute_requests: Some(minute.0),
            minute_limit: Some(minute.1),
            is_free_tier: Some(true),
            has_credit_card: Some(false),
        }
    }

    #[test]
    fn test_no_warning_when_usage_healthy() {
        let (summary, warnings) = QuotaMonitor::default().inspect(&usage((100, 1000), (10, 100), (1, 5)));
        assert!(warnings.is_empty());
        assert_eq!(summary.monthly.remaining, Some(900));
        assert_eq!(summary.is_free_tier, Some(true));
    }

    #[test]
    fn test_monthly_warning_below_floor() {
        let (_, warnings) = QuotaMonitor::default().inspect(&usage((995, 1000), (10, 100), (1, 5)));
        assert_eq!(
            warnings,
            vec![QuotaWarning::Monthly { remaining: 5, limit: Some(1000) }]
        );
        assert!(warnings[0].message().contains("5 requests remaining"));
    }

    #[test]
    fn test_monthly_floor_is_exclusive() {
        let (_, warnings) = QuotaMonitor::default().inspect(&usage((990, 1000), (10, 100), (1, 5)));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_reported_remaining_wins_over_derived() {
        let mut raw = usage((100, 1000), (10, 100), (1, 5));
        raw.free_tier_remaining = Some(3);
        let (summary, warnings) = QuotaMonitor::default().inspect(&raw);
        assert_eq!(summary.monthly.remaining, Some(3));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_daily_warning_at_ninety_percent() {
        let (_, warnings) = QuotaMonitor::default().inspect(&usage((100, 1000), (90, 100), (1, 5)));
        assert_eq!(
            warnings,
            vec![QuotaWarning::Daily { used: 90, limit: 100, percent: 90 }]
        );

        let (_, warnings) = QuotaMonitor::default().inspect(&usage((100, 1000), (89, 100), (1, 5)));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_minute_warning_within_one_request() {
        let (_, warnings) = QuotaMonitor::default().inspect(&usage((100, 1000), (10, 100), (4, 5)));
        assert_eq!(warnings, vec![QuotaWarning::Minute { used: 4, limit: 5 }]);
        assert!(warnings[0].message().to_lowercase().contains("minute"));

        let (_, warnings) = QuotaMonitor::default().inspect(&usage((100, 1000), (10, 100), (3, 5)));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_multiple_warnings_joined() {
        let (_, warnings) = QuotaMonitor::default().inspect(&usage((995, 1000), (95, 100), (4, 5)));
        assert_eq!(warnings.len(), 3);
        let notes = format_notes(&warnings).unwrap();
        assert_eq!(notes.matches(" | ").count(), 2);
        assert!(notes.contains("95%"));
    }

    #[test]
    fn test_incomplete_usage_produces_no_warning() {
        let (summary, warnings) = QuotaMonitor::default().inspect(&RawUsage::default());
        assert!(warnings.is_empty());
        assert_eq!(summary.monthly.remaining, None);
        assert_eq!(format_notes(&warnings), None);
    }

    #[test]
    fn test_zero_limits_never_warn() {
        let mut raw = RawUsage::default();
        raw.daily_requests = Some(0);
        raw.daily_limit = Some(0);
        raw.minute_requests = Some(0);
        raw.minute_limit = Some(0);
        assert!(QuotaMonitor::default().inspect(&raw).1.is_empty());
    }
}
