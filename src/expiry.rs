// ⏳ Expiry & Progress
// Days remaining until a billing end date, the fill ratio of the current
// cycle, and its urgency band

use crate::cycle::{days_between, parse_date};
use chrono::{Local, NaiveDate};
use serde::{Serialize, Serializer};
use std::fmt;

// ============================================================================
// CLOCK
// ============================================================================

/// Source of "today". Engines take the date as a value; only the edges hold a clock.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local wall-clock date
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Pinned date, for tests and replays
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

// ============================================================================
// DAYS REMAINING
// ============================================================================

/// Signed days until the end date, or one of the two feed sentinels.
/// Serializes the way the dashboard feed carries it: a number, `"Expired"` or `"N/A"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaysRemaining {
    Days(i64),
    Expired,
    NotAvailable,
}

impl DaysRemaining {
    /// Read a value the upstream feed already classified
    pub fn from_feed(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("expired") {
            return DaysRemaining::Expired;
        }
        match trimmed.parse::<i64>() {
            Ok(days) => DaysRemaining::Days(days),
            Err(_) => DaysRemaining::NotAvailable,
        }
    }

    pub fn as_days(&self) -> Option<i64> {
        match self {
            DaysRemaining::Days(days) => Some(*days),
            _ => None,
        }
    }

    /// Due for renewal once at most `lead_days` remain, or when closed
    pub fn is_due(&self, lead_days: i64) -> bool {
        match self {
            DaysRemaining::Days(days) => *days <= lead_days,
            DaysRemaining::Expired => true,
            DaysRemaining::NotAvailable => false,
        }
    }

    /// Short table label: `Expired`, `Today`, `12d`, `N/A`
    pub fn label(&self) -> String {
        match self {
            DaysRemaining::Days(days) if *days < 0 => "Expired".to_string(),
            DaysRemaining::Days(0) => "Today".to_string(),
            DaysRemaining::Days(days) => format!("{}d", days),
            DaysRemaining::Expired => "Expired".to_string(),
            DaysRemaining::NotAvailable => "N/A".to_string(),
        }
    }
}

impl fmt::Display for DaysRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaysRemaining::Days(days) => write!(f, "{}", days),
            DaysRemaining::Expired => write!(f, "Expired"),
            DaysRemaining::NotAvailable => write!(f, "N/A"),
        }
    }
}

impl Serialize for DaysRemaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DaysRemaining::Days(days) => serializer.serialize_i64(*days),
            DaysRemaining::Expired => serializer.serialize_str("Expired"),
            DaysRemaining::NotAvailable => serializer.serialize_str("N/A"),
        }
    }
}

/// Days from `today` to `end_date`. Absent or unparseable dates are `NotAvailable`.
pub fn compute_expiry(end_date: Option<&str>, today: NaiveDate) -> DaysRemaining {
    match end_date.and_then(parse_date) {
        Some(end) => DaysRemaining::Days(days_between(today, end)),
        None => DaysRemaining::NotAvailable,
    }
}

/// Like `compute_expiry`, but a feed value of `Expired` wins over the date
pub fn resolve_expiry(
    feed: Option<DaysRemaining>,
    end_date: Option<&str>,
    today: NaiveDate,
) -> DaysRemaining {
    match feed {
        Some(DaysRemaining::Expired) => DaysRemaining::Expired,
        _ => compute_expiry(end_date, today),
    }
}

// ============================================================================
// PROGRESS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Expired,
    Critical,
    Warning,
    Safe,
}

impl Severity {
    pub const CRITICAL_MAX_DAYS: i64 = 7;
    pub const WARNING_MAX_DAYS: i64 = 15;

    pub fn for_days(days: i64) -> Self {
        if days < 0 {
            Severity::Expired
        } else if days <= Self::CRITICAL_MAX_DAYS {
            Severity::Critical
        } else if days <= Self::WARNING_MAX_DAYS {
            Severity::Warning
        } else {
            Severity::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Expired => "expired",
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Safe => "safe",
        }
    }
}

/// Remaining share of the current cycle. `severity` is `None` when no billing is configured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub percentage: f64,
    pub severity: Option<Severity>,
}

pub fn compute_progress(days_remaining: DaysRemaining, total_days_in_cycle: u32) -> Progress {
    match days_remaining {
        DaysRemaining::NotAvailable => Progress {
            percentage: 0.0,
            severity: None,
        },
        DaysRemaining::Expired => Progress {
            percentage: 0.0,
            severity: Some(Severity::Expired),
        },
        DaysRemaining::Days(days) => {
            let percentage = if total_days_in_cycle == 0 {
                0.0
            } else {
                (100.0 * days.max(0) as f64 / f64::from(total_days_in_cycle)).clamp(0.0, 100.0)
            };
            Progress {
                percentage,
                severity: Some(Severity::for_days(days)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_expiry_absent_date_is_not_available() {
        let today = date("2024-06-01");
        assert_eq!(compute_expiry(None, today), DaysRemaining::NotAvailable);
        assert_eq!(compute_expiry(Some(""), today), DaysRemaining::NotAvailable);
        assert_eq!(compute_expiry(Some("soon"), today), DaysRemaining::NotAvailable);
    }

    #[test]
    fn test_expiry_today_is_zero() {
        let today = date("2024-06-01");
        assert_eq!(compute_expiry(Some("2024-06-01"), today), DaysRemaining::Days(0));
        assert_eq!(compute_expiry(Some("2024-06-11"), today), DaysRemaining::Days(10));
        assert_eq!(compute_expiry(Some("2024-05-30"), today), DaysRemaining::Days(-2));
    }

    #[test]
    fn test_expiry_is_non_increasing_over_time() {
        let end = Some("2024-03-10");
        let mut today = date("2024-02-01");
        let mut previous = i64::MAX;
        for _ in 0..60 {
            let days = compute_expiry(end, today).as_days().unwrap();
            assert!(days <= previous);
            previous = days;
            today = today + Duration::days(1);
        }
    }

    #[test]
    fn test_feed_sentinel_takes_precedence() {
        let today = date("2024-06-01");
        let feed = Some(DaysRemaining::from_feed("Expired"));
        assert_eq!(
            resolve_expiry(feed, Some("2024-07-01"), today),
            DaysRemaining::Expired
        );
        assert_eq!(
            resolve_expiry(Some(DaysRemaining::from_feed("N/A")), Some("2024-07-01"), today),
            DaysRemaining::Days(30)
        );
        assert_eq!(resolve_expiry(None, None, today), DaysRemaining::NotAvailable);
    }

    #[test]
    fn test_severity_boundaries() {
        assert_eq!(Severity::for_days(-1), Severity::Expired);
        assert_eq!(Severity::for_days(0), Severity::Critical);
        assert_eq!(Severity::for_days(7), Severity::Critical);
        assert_eq!(Severity::for_days(8), Severity::Warning);
        assert_eq!(Severity::for_days(15), Severity::Warning);
        assert_eq!(Severity::for_days(16), Severity::Safe);
    }

    #[test]
    fn test_progress_percentage_is_clamped() {
        for days in [-40, -1, 0, 1, 15, 30, 31, 400] {
            let progress = compute_progress(DaysRemaining::Days(days), 30);
            assert!((0.0..=100.0).contains(&progress.percentage), "days={}", days);
        }
        assert_eq!(compute_progress(DaysRemaining::Days(15), 30).percentage, 50.0);
        assert_eq!(compute_progress(DaysRemaining::Days(90), 30).percentage, 100.0);
        assert_eq!(compute_progress(DaysRemaining::Days(-3), 30).percentage, 0.0);
    }

    #[test]
    fn test_progress_without_cycle_length_is_empty() {
        let progress = compute_progress(DaysRemaining::Days(12), 0);
        assert_eq!(progress.percentage, 0.0);
        assert_eq!(progress.severity, Some(Severity::Warning));
    }

    #[test]
    fn test_progress_sentinels() {
        let expired = compute_progress(DaysRemaining::Expired, 30);
        assert_eq!(expired.percentage, 0.0);
        assert_eq!(expired.severity, Some(Severity::Expired));

        let missing = compute_progress(DaysRemaining::NotAvailable, 30);
        assert_eq!(missing.percentage, 0.0);
        assert_eq!(missing.severity, None);
    }

    #[test]
    fn test_due_check_respects_lead_days() {
        assert!(DaysRemaining::Days(0).is_due(0));
        assert!(DaysRemaining::Days(-4).is_due(0));
        assert!(!DaysRemaining::Days(1).is_due(0));
        assert!(DaysRemaining::Days(5).is_due(7));
        assert!(DaysRemaining::Expired.is_due(0));
        assert!(!DaysRemaining::NotAvailable.is_due(30));
    }

    #[test]
    fn test_labels_and_serialization() {
        assert_eq!(DaysRemaining::Days(-1).label(), "Expired");
        assert_eq!(DaysRemaining::Days(0).label(), "Today");
        assert_eq!(DaysRemaining::Days(12).label(), "12d");
        assert_eq!(DaysRemaining::NotAvailable.label(), "N/A");

        assert_eq!(serde_json::to_string(&DaysRemaining::Days(-3)).unwrap(), "-3");
        assert_eq!(serde_json::to_string(&DaysRemaining::Expired).unwrap(), "\"Expired\"");
        assert_eq!(serde_json::to_string(&DaysRemaining::NotAvailable).unwrap(), "\"N/A\"");
    }
}
