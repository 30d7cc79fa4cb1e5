//! System instructions for the text-generation calls

use crate::temporal::YearMonth;

fn current_month(today: YearMonth) -> String {
    format!("{:04}-{:02}", today.year(), today.month())
}

/// Rewrite a question for retrieval, attaching a month range when absent
pub fn clarify_instruction(today: YearMonth) -> String {
    let current = current_month(today);
    let start = today.add_months(-3);
    format!(
        "Rephrase the user's question so a retrieval system can find the right documents.\n\
         Rules:\n\
         1. Keep the question as it is wherever possible. Only add a date range when it has none.\n\
         \x20  The current month is {current}. If neither the question nor a web search yields a range, \
         use {start} to {today}.\n\
         2. Expand every acronym in parentheses, e.g. \"RBI\" becomes \"RBI (Reserve Bank of India)\".\n\
         3. Write dates with full month names and four-digit years (e.g. \"February 2025 to April 2025\").\n\
         4. Add nothing else: no commentary, no reasoning.\n\
         5. Answer with at most 25 words.\n\
         The question follows."
    )
}

fn extraction_instruction(today: YearMonth, which: &str) -> String {
    let current = current_month(today);
    format!(
        "You extract a single reference month from a question.\n\
         Examples:\n\
         - \"CPI report for December 2024\" -> \"December 2024\"\n\
         - \"What was the inflation rate in June 2023?\" -> \"June 2023\"\n\
         - \"Give me the latest IIP data\" -> \"today\"\n\
         - \"GDP growth over the last five years\" -> \"today\"\n\
         - \"What happened in Q3 2022?\" -> \"December 2022\"\n\
         - \"Inflation in H1 FY25\" -> \"September 2024\"\n\
         Answer with the month only, formatted as \"%B %Y\", or \"today\" when the question names no date.\n\
         When several dates appear, answer with the {which} one.\n\
         Never answer with a month after {current}."
    )
}

/// Extract the latest month mentioned
pub fn latest_date_instruction(today: YearMonth) -> String {
    extraction_instruction(today, "LATEST")
}

/// Extract the earliest month mentioned
pub fn earliest_date_instruction(today: YearMonth) -> String {
    extraction_instruction(today, "EARLIEST")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instructions_carry_current_month() {
        let today = YearMonth::new(2025, 5).unwrap();
        assert!(clarify_instruction(today).contains("2025-05"));
        assert!(clarify_instruction(today).contains("February 2025 to May 2025"));
        assert!(latest_date_instruction(today).contains("LATEST"));
        assert!(earliest_date_instruction(today).contains("EARLIEST"));
        assert!(earliest_date_instruction(today).contains("after 2025-05"));
    }
}
