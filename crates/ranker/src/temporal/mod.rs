//! Month-granularity dates
//!
//! Provides:
//! - `YearMonth` with month arithmetic and "%B %Y" formatting
//! - `DateLabel`, either the sentinel `today` or a concrete month
//! - `months_between` with the 999 "distance unknown" sentinel
//! - `window_size`, the search window width in months
//! - A `Clock` so "today" can be pinned in tests

mod resolver;

pub use resolver::TemporalResolver;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned by [`months_between`] when either label cannot be parsed
pub const UNKNOWN_DISTANCE: i64 = 999;

/// Lower bound of the search window in months
pub const MIN_WINDOW_MONTHS: i64 = 24;

/// Base width added to the query duration
pub const WINDOW_BASE_MONTHS: i64 = 6;

/// Cap on the query-duration contribution
pub const MAX_DURATION_EXTENSION: i64 = 18;

/// Sentinel label meaning "the current month"
pub const TODAY_LABEL: &str = "today";

/// Failure to interpret a date label
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DateParseError {
    #[error("empty date label")]
    Empty,

    #[error("unrecognised date label '{0}'")]
    Unrecognised(String),
}

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// `month` is 1-based
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    fn index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_index(index: i64) -> Self {
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// Shift by a signed number of months
    pub fn add_months(self, months: i64) -> Self {
        Self::from_index(self.index() + months)
    }

    /// Signed months from `self` to `other` (`other - self`)
    pub fn months_until(self, other: YearMonth) -> i64 {
        other.index() - self.index()
    }

    /// Parse a "Month Year" label such as "March 2024"
    pub fn parse(label: &str) -> Result<Self, DateParseError> {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return Err(DateParseError::Empty);
        }

        NaiveDate::parse_from_str(&format!("1 {}", trimmed), "%d %B %Y")
            .map(Self::from_date)
            .map_err(|_| DateParseError::Unrecognised(trimmed.to_string()))
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 12] = [
            "January", "February", "March", "April", "May", "June", "July", "August",
            "September", "October", "November", "December",
        ];
        write!(f, "{} {}", NAMES[(self.month - 1) as usize], self.year)
    }
}

impl FromStr for YearMonth {
    type Err = DateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved query date: the `today` sentinel or a concrete month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateLabel {
    Today,
    Month(YearMonth),
}

impl DateLabel {
    pub fn parse(label: &str) -> Result<Self, DateParseError> {
        if label.trim().eq_ignore_ascii_case(TODAY_LABEL) {
            return Ok(DateLabel::Today);
        }
        YearMonth::parse(label).map(DateLabel::Month)
    }

    /// Concrete month, with `today` pinned to `today`
    pub fn resolve(self, today: YearMonth) -> YearMonth {
        match self {
            DateLabel::Today => today,
            DateLabel::Month(month) => month,
        }
    }

    /// Never later than `today`
    pub fn clamp_to(self, today: YearMonth) -> Self {
        match self {
            DateLabel::Month(month) if month > today => DateLabel::Month(today),
            other => other,
        }
    }
}

impl fmt::Display for DateLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateLabel::Today => f.write_str(TODAY_LABEL),
            DateLabel::Month(month) => write!(f, "{}", month),
        }
    }
}

impl FromStr for DateLabel {
    type Err = DateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DateLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Source of the current month
pub trait Clock: Send + Sync {
    fn today(&self) -> YearMonth;
}

/// Wall clock (UTC)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> YearMonth {
        YearMonth::from_date(Utc::now().date_naive())
    }
}

/// Clock pinned to one month
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub YearMonth);

impl Clock for FixedClock {
    fn today(&self) -> YearMonth {
        self.0
    }
}

/// Signed months `b - a` between two labels, `today` resolving to `today`.
///
/// Returns [`UNKNOWN_DISTANCE`] when either side cannot be parsed.
pub fn months_between(a: &str, b: &str, today: YearMonth) -> i64 {
    match (DateLabel::parse(a), DateLabel::parse(b)) {
        (Ok(a), Ok(b)) => a.resolve(today).months_until(b.resolve(today)),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(a, b, error = %e, "Unparseable date label, distance unknown");
            UNKNOWN_DISTANCE
        }
    }
}

/// Search window width for a query spanning `duration` months.
///
/// The duration term is capped at `6 + 18 = 24`, which equals the floor, so
/// the result is 24 for every input.
pub fn window_size(duration: i64) -> i64 {
    MIN_WINDOW_MONTHS.max(WINDOW_BASE_MONTHS + MAX_DURATION_EXTENSION.min(duration.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let march = YearMonth::parse("March 2024").unwrap();
        assert_eq!(march, ym(2024, 3));
        assert_eq!(march.to_string(), "March 2024");
        assert_eq!(YearMonth::parse("  december 2024 ").unwrap(), ym(2024, 12));
        assert_eq!(YearMonth::parse(""), Err(DateParseError::Empty));
        assert!(YearMonth::parse("Q3 2022").is_err());
        assert!(YearMonth::parse("2024-03").is_err());
    }

    #[test]
    fn test_month_arithmetic_crosses_years() {
        assert_eq!(ym(2024, 1).add_months(-1), ym(2023, 12));
        assert_eq!(ym(2024, 11).add_months(3), ym(2025, 2));
        assert_eq!(ym(2024, 3).add_months(-24), ym(2022, 3));
        assert_eq!(ym(2023, 12).months_until(ym(2024, 2)), 2);
    }

    #[test]
    fn test_date_label_today_sentinel() {
        assert_eq!(DateLabel::parse("today").unwrap(), DateLabel::Today);
        assert_eq!(DateLabel::parse("Today").unwrap(), DateLabel::Today);
        assert_eq!(DateLabel::Today.to_string(), "today");
        assert_eq!(DateLabel::Today.resolve(ym(2025, 6)), ym(2025, 6));
    }

    #[test]
    fn test_clamp_to_current_month() {
        let today = ym(2025, 6);
        assert_eq!(
            DateLabel::Month(ym(2026, 1)).clamp_to(today),
            DateLabel::Month(today)
        );
        assert_eq!(
            DateLabel::Month(ym(2024, 12)).clamp_to(today),
            DateLabel::Month(ym(2024, 12))
        );
        assert_eq!(DateLabel::Today.clamp_to(today), DateLabel::Today);
    }

    #[test]
    fn test_months_between_sign() {
        let today = ym(2025, 6);
        // Positive when the first argument is older
        assert_eq!(months_between("June 2024", "December 2024", today), 6);
        assert_eq!(months_between("December 2024", "June 2024", today), -6);
        assert_eq!(months_between("June 2024", "today", today), 12);
        assert_eq!(months_between("today", "today", today), 0);
    }

    #[test]
    fn test_months_between_is_antisymmetric() {
        let today = ym(2025, 3);
        let labels = [
            "January 2020",
            "February 2024",
            "December 2024",
            "today",
            "March 2025",
        ];
        for a in labels {
            for b in labels {
                assert_eq!(
                    months_between(a, b, today),
                    -months_between(b, a, today),
                    "{a} / {b}"
                );
            }
        }
    }

    #[test]
    fn test_months_between_unknown_on_parse_failure() {
        let today = ym(2025, 3);
        assert_eq!(months_between("N/A", "March 2024", today), UNKNOWN_DISTANCE);
        assert_eq!(months_between("March 2024", "FY25", today), UNKNOWN_DISTANCE);
    }

    #[test]
    fn test_window_size_saturates() {
        assert_eq!(window_size(0), 24);
        assert_eq!(window_size(10), 24);
        assert_eq!(window_size(30), 24);
        assert_eq!(window_size(-30), 24);
        assert_eq!(window_size(UNKNOWN_DISTANCE), 24);
        for duration in -100..100 {
            assert_eq!(window_size(duration), MIN_WINDOW_MONTHS);
        }
    }

    #[test]
    fn test_labels_serialize_as_text() {
        assert_eq!(
            serde_json::to_value(DateLabel::Month(ym(2024, 12))).unwrap(),
            serde_json::json!("December 2024")
        );
        assert_eq!(
            serde_json::to_value(DateLabel::Today).unwrap(),
            serde_json::json!("today")
        );
    }
}
