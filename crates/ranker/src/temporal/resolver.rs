//! Temporal resolver
//!
//! Uses the text-generation collaborator to clarify a question and to pull
//! its latest and earliest month references. Every call degrades to a
//! documented default instead of failing the request.

use super::{DateLabel, DateParseError, YearMonth};
use crate::prompts;
use macrolens_common::TextGenerator;
use std::sync::Arc;
use tracing::{debug, warn};

/// Extracts query dates through a [`TextGenerator`]
pub struct TemporalResolver {
    generator: Arc<dyn TextGenerator>,
}

impl TemporalResolver {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Rewrite the question for retrieval; the question itself on failure
    pub async fn clarify_query(&self, question: &str, today: YearMonth) -> String {
        let instruction = prompts::clarify_instruction(today);
        match self.generator.generate_grounded(&instruction, question).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("Clarification returned empty text, using the question as is");
                question.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Query clarification failed, using the question as is");
                question.to_string()
            }
        }
    }

    /// Latest month the query refers to, `today` by default
    pub async fn resolve_center_date(&self, query: &str, today: YearMonth) -> DateLabel {
        self.extract(&prompts::latest_date_instruction(today), query, today, "center")
            .await
    }

    /// Earliest month the query refers to, `today` by default
    pub async fn resolve_earliest_date(&self, query: &str, today: YearMonth) -> DateLabel {
        self.extract(&prompts::earliest_date_instruction(today), query, today, "earliest")
            .await
    }

    async fn extract(&self, instruction: &str, query: &str, today: YearMonth, kind: &str) -> DateLabel {
        let raw = match self.generator.generate(instruction, query).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(kind, error = %e, "Date extraction failed, defaulting to today");
                return DateLabel::Today;
            }
        };

        match interpret(&raw, today) {
            Ok(label) => {
                debug!(kind, raw = %raw.trim(), date = %label, "Extracted query date");
                label
            }
            Err(e) => {
                warn!(kind, raw = %raw.trim(), error = %e, "Unparseable extracted date, defaulting to today");
                DateLabel::Today
            }
        }
    }
}

/// Parse a model answer into a label no later than `today`.
///
/// Tolerates surrounding quotes and a trailing period.
pub fn interpret(raw: &str, today: YearMonth) -> Result<DateLabel, DateParseError> {
    let cleaned = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim_end_matches('.')
        .trim();

    DateLabel::parse(cleaned).map(|label| label.clamp_to(today))
}
