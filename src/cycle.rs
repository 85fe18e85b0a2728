// 🔁 Billing Cycles - Descriptor Parsing
// Turns free-text cycle descriptors ("Monthly", "2 years", "30 days") into
// concrete cycle lengths and billing windows

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;

/// Calendar-date format used at every storage and API boundary
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Days assumed when a descriptor matches no rule
pub const FALLBACK_CYCLE_DAYS: u32 = 30;

// ============================================================================
// DATE EDGES
// ============================================================================

/// Parse a `YYYY-MM-DD` string. Blank or malformed input is an absent date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Whole calendar days from `from` to `to` (negative when `to` is earlier)
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Number of days in the calendar month containing `date`
pub fn days_in_month(date: NaiveDate) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    u32::try_from(days_between(first, next)).ok()
}

// ============================================================================
// CYCLE LENGTH
// ============================================================================

/// Length of one billing cycle, as resolved from a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "unit", content = "count", rename_all = "lowercase")]
pub enum CycleLength {
    Months(u32),
    Years(u32),
    Days(u32),
}

impl CycleLength {
    /// `date` moved forward by one cycle, with calendar month-end clamping
    pub fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        match *self {
            CycleLength::Months(n) => date.checked_add_months(Months::new(n)),
            CycleLength::Years(n) => date.checked_add_months(Months::new(n.checked_mul(12)?)),
            CycleLength::Days(n) => date.checked_add_days(Days::new(u64::from(n))),
        }
    }

    /// `date` moved back by one cycle
    pub fn rewind(&self, date: NaiveDate) -> Option<NaiveDate> {
        match *self {
            CycleLength::Months(n) => date.checked_sub_months(Months::new(n)),
            CycleLength::Years(n) => date.checked_sub_months(Months::new(n.checked_mul(12)?)),
            CycleLength::Days(n) => date.checked_sub_days(Days::new(u64::from(n))),
        }
    }

    pub fn label(&self) -> String {
        match *self {
            CycleLength::Months(1) => "Monthly".to_string(),
            CycleLength::Months(3) => "Quarterly".to_string(),
            CycleLength::Years(1) => "Annually".to_string(),
            CycleLength::Months(n) => format!("Every {} months", n),
            CycleLength::Years(n) => format!("Every {} years", n),
            CycleLength::Days(1) => "Daily".to_string(),
            CycleLength::Days(n) => format!("Every {} days", n),
        }
    }
}

// ============================================================================
// RULES
// ============================================================================

/// Descriptor rules, tried in `CycleRule::ORDER`. Rules overlap on purpose
/// ("2 months" also has a leading digit), so the order is part of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleRule {
    Month,
    Year,
    Quarter,
    Day,
}

impl CycleRule {
    pub const ORDER: [CycleRule; 4] = [
        CycleRule::Month,
        CycleRule::Year,
        CycleRule::Quarter,
        CycleRule::Day,
    ];

    /// Match an already lower-cased, trimmed descriptor
    pub fn apply(&self, descriptor: &str) -> Option<CycleLength> {
        match self {
            CycleRule::Month => descriptor
                .contains("month")
                .then(|| CycleLength::Months(leading_integer(descriptor).unwrap_or(1))),
            CycleRule::Year => {
                if !(descriptor.contains("year") || descriptor.contains("annu")) {
                    return None;
                }
                let years = if descriptor.contains("bi-annu") || descriptor.contains("biannu") {
                    2
                } else {
                    leading_integer(descriptor).unwrap_or(1)
                };
                Some(CycleLength::Years(years))
            }
            CycleRule::Quarter => descriptor
                .contains("quarter")
                .then_some(CycleLength::Months(3)),
            CycleRule::Day => day_count(descriptor).map(CycleLength::Days),
        }
    }
}

/// Normalise a raw descriptor for matching. `None` when blank.
pub fn normalize_descriptor(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_lowercase();
    (!normalized.is_empty()).then_some(normalized)
}

/// First rule that matches, in rule order
pub fn match_rules(descriptor: &str) -> Option<(CycleRule, CycleLength)> {
    let normalized = normalize_descriptor(descriptor)?;
    CycleRule::ORDER
        .iter()
        .find_map(|rule| rule.apply(&normalized).map(|length| (*rule, length)))
}

/// Cycle length used for renewals: the display rules, then any leading
/// integer read as a day count ("45d", "10 business days")
pub fn renewal_length(descriptor: &str) -> Option<CycleLength> {
    if let Some((_, length)) = match_rules(descriptor) {
        return Some(length);
    }
    let normalized = normalize_descriptor(descriptor)?;
    leading_integer(&normalized).map(CycleLength::Days)
}

fn leading_integer(text: &str) -> Option<u32> {
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// `"<n>"`, `"<n> day"`, `"<n>days"`, `"<n>   days"`
fn day_count(text: &str) -> Option<u32> {
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, rest) = text.split_at(split);
    if digits.is_empty() {
        return None;
    }
    match rest.trim_start() {
        "" | "day" | "days" => digits.parse().ok(),
        _ => None,
    }
}

// ============================================================================
// CYCLE WINDOW
// ============================================================================

/// Current billing period derived from an end date and a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleWindow {
    pub start_date: Option<NaiveDate>,
    pub total_days_in_cycle: u32,
}

impl CycleWindow {
    pub const EMPTY: CycleWindow = CycleWindow {
        start_date: None,
        total_days_in_cycle: 0,
    };

    fn spanning(start: NaiveDate, end: NaiveDate) -> Self {
        let days = days_between(start, end).max(0);
        CycleWindow {
            start_date: Some(start),
            total_days_in_cycle: u32::try_from(days).unwrap_or(u32::MAX),
        }
    }
}

/// Resolve the billing window ending at `end_date`.
///
/// Never fails: absent inputs give `CycleWindow::EMPTY`, unmatched
/// descriptors and date overflow give the 30-day fallback window.
pub fn parse_cycle(end_date: Option<&str>, descriptor: Option<&str>) -> CycleWindow {
    let Some(end) = end_date.and_then(parse_date) else {
        return CycleWindow::EMPTY;
    };
    let Some(descriptor) = descriptor.filter(|d| !d.trim().is_empty()) else {
        return CycleWindow::EMPTY;
    };

    match match_rules(descriptor).and_then(|(rule, length)| window_for(rule, length, end)) {
        Some(window) => window,
        None => {
            tracing::debug!(descriptor, "cycle descriptor unmatched, assuming 30 days");
            fallback_window(end)
        }
    }
}

fn window_for(rule: CycleRule, length: CycleLength, end: NaiveDate) -> Option<CycleWindow> {
    let start = length.rewind(end)?;
    let window = match (rule, length) {
        (CycleRule::Month, CycleLength::Months(1)) => CycleWindow {
            start_date: Some(start),
            total_days_in_cycle: days_in_month(start)?,
        },
        (CycleRule::Day, CycleLength::Days(n)) => CycleWindow {
            start_date: Some(start),
            total_days_in_cycle: n,
        },
        _ => CycleWindow::spanning(start, end),
    };
    Some(window)
}

fn fallback_window(end: NaiveDate) -> CycleWindow {
    match CycleLength::Days(FALLBACK_CYCLE_DAYS).rewind(end) {
        Some(start) => CycleWindow {
            start_date: Some(start),
            total_days_in_cycle: FALLBACK_CYCLE_DAYS,
        },
        None => CycleWindow::EMPTY,
    }
}
