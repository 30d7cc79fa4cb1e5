//! Result assembly
//!
//! Attaches canonical URLs to accepted candidates and packages the
//! response. An exhausted relaxation loop is a successful response carrying
//! a single "no relevant content" entry.

use crate::references::ReferenceTable;
use crate::relaxation::RankOutcome;
use crate::rerank::{ScoredCandidate, ToleranceBand};
use crate::temporal::DateLabel;
use crate::window::SearchWindow;
use serde::Serialize;

/// Content of the sentinel entry
pub const NO_RESULT_MESSAGE: &str = "We could not find any relevant content related to your query.";

/// Value of every other sentinel field
pub const NOT_AVAILABLE: &str = "N/A";

/// An accepted candidate as returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub content: String,
    pub distance: f64,
    pub source: String,
    pub page: String,
    pub reference: String,
    pub date: String,
    /// Final score after the temporal penalty
    pub cross_score: f64,
    /// Raw cross-encoder score
    pub relevance_score: f64,
    pub date_delta: i64,
    pub boost: f64,
    pub url: String,
}

/// Marker entry used when nothing qualified
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NoResult {
    pub content: &'static str,
    pub distance: &'static str,
    pub source: &'static str,
    pub page: &'static str,
    pub reference: &'static str,
    pub date: &'static str,
    pub url: &'static str,
}

impl Default for NoResult {
    fn default() -> Self {
        Self {
            content: NO_RESULT_MESSAGE,
            distance: NOT_AVAILABLE,
            source: NOT_AVAILABLE,
            page: NOT_AVAILABLE,
            reference: NOT_AVAILABLE,
            date: NOT_AVAILABLE,
            url: NOT_AVAILABLE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RetrievedResult {
    Ranked(RankedResult),
    NotFound(NoResult),
}

/// Window as reported to callers
#[derive(Debug, Clone, Serialize)]
pub struct WindowSummary {
    pub size: i64,
    pub months_before: u32,
    pub months_after: u32,
    pub start: String,
    pub end: String,
}

impl WindowSummary {
    fn new(window: &SearchWindow, size: i64) -> Self {
        let label = |month: Option<&crate::temporal::YearMonth>| {
            month.map(ToString::to_string).unwrap_or_default()
        };
        Self {
            size,
            months_before: window.months_before,
            months_after: window.months_after,
            start: label(window.buckets.first()),
            end: label(window.buckets.last()),
        }
    }
}

/// Everything resolved about the query before ranking
#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    pub question: String,
    pub llm_query: String,
    pub center: DateLabel,
    pub earliest: DateLabel,
    pub window_size: i64,
    pub window: SearchWindow,
}

/// Response of one rank request
#[derive(Debug, Clone, Serialize)]
pub struct RankedResultSet {
    pub question: String,
    pub llm_query: String,
    pub query_date: DateLabel,
    pub earliest_date: DateLabel,
    pub window: WindowSummary,
    pub retrieved_results: Vec<RetrievedResult>,
    pub attempts: u32,
    pub tolerance: ToleranceBand,
    /// Elapsed seconds
    pub time: f64,
}

impl RankedResultSet {
    /// True when the response carries the sentinel
    pub fn is_exhausted(&self) -> bool {
        matches!(self.retrieved_results.as_slice(), [RetrievedResult::NotFound(_)])
    }
}

/// Packages ranked candidates with their reference URLs
pub struct ResultAssembler {
    references: ReferenceTable,
}

impl ResultAssembler {
    pub fn new(references: ReferenceTable) -> Self {
        Self { references }
    }

    fn to_result(&self, scored: ScoredCandidate) -> RankedResult {
        let url = self.references.resolve(&scored.candidate.reference).to_string();
        let candidate = scored.candidate;
        RankedResult {
            content: candidate.content,
            distance: candidate.distance,
            source: candidate.source,
            page: candidate.page,
            reference: candidate.reference,
            date: candidate.date,
            cross_score: scored.final_score,
            relevance_score: scored.relevance,
            date_delta: scored.delta,
            boost: scored.boost,
            url,
        }
    }

    pub fn assemble(&self, query: ResolvedQuery, outcome: RankOutcome, elapsed_secs: f64) -> RankedResultSet {
        let attempts = outcome.attempts();
        let tolerance = outcome.band();

        let retrieved_results = match outcome {
            RankOutcome::Ranked { results, .. } => results
                .into_iter()
                .map(|scored| RetrievedResult::Ranked(self.to_result(scored)))
                .collect(),
            RankOutcome::Exhausted { .. } => vec![RetrievedResult::NotFound(NoResult::default())],
        };

        RankedResultSet {
            window: WindowSummary::new(&query.window, query.window_size),
            question: query.question,
            llm_query: query.llm_query,
            query_date: query.center,
            earliest_date: query.earliest,
            retrieved_results,
            attempts,
            tolerance,
            time: elapsed_secs,
        }
    }
}
