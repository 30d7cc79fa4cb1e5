//! Date-scoped retrieval filter
//!
//! The store indexes dates as categorical "Month Year" labels, so the window
//! is an explicit list of month buckets joined into an exact-match
//! disjunction rather than a range predicate.

use crate::temporal::{DateLabel, YearMonth};
use serde::Serialize;

/// Split a window size into `(months_before, months_after)`.
///
/// At most two forward months; the rest of the window looks backward.
pub fn split_window(window_size: i64) -> (u32, u32) {
    let after = window_size.min(2).clamp(1, 2);
    let before = (window_size - after).max(1);
    (before as u32, after as u32)
}

/// `months_before + months_after + 1` consecutive months around `center`.
///
/// An unparseable center falls back to `today`.
pub fn build_window(center: &str, months_before: u32, months_after: u32, today: YearMonth) -> Vec<YearMonth> {
    let center = match DateLabel::parse(center) {
        Ok(label) => label.resolve(today),
        Err(e) => {
            tracing::warn!(center, error = %e, "Unparseable window center, using the current month");
            today
        }
    };

    SearchWindow::new(center, months_before, months_after).buckets
}

/// Center month plus its ordered month buckets
#[derive(Debug, Clone, Serialize)]
pub struct SearchWindow {
    pub center: YearMonth,
    pub months_before: u32,
    pub months_after: u32,
    pub buckets: Vec<YearMonth>,
}

impl SearchWindow {
    pub fn new(center: YearMonth, months_before: u32, months_after: u32) -> Self {
        let start = center.add_months(-(months_before as i64));
        let buckets = (0..=(months_before + months_after) as i64)
            .map(|offset| start.add_months(offset))
            .collect();

        Self {
            center,
            months_before,
            months_after,
            buckets,
        }
    }

    /// Window of `window_size` months around a resolved center
    pub fn around(center: DateLabel, window_size: i64, today: YearMonth) -> Self {
        let (before, after) = split_window(window_size);
        Self::new(center.resolve(today), before, after)
    }

    /// Width used for the tolerance band
    pub fn size(&self) -> i64 {
        (self.months_before + self.months_after) as i64
    }

    pub fn labels(&self) -> Vec<String> {
        self.buckets.iter().map(ToString::to_string).collect()
    }

    /// `field == "January 2024" or field == "February 2024" ...`
    pub fn filter_expression(&self, field: &str) -> String {
        self.buckets
            .iter()
            .map(|month| format!("{} == \"{}\"", field, month))
            .collect::<Vec<_>>()
            .join(" or ")
    }
}
