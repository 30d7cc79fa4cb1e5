//! Adaptive relaxation loop
//!
//! Each attempt reranks the same pool under the current tolerance band and
//! examines the top slice. An attempt that accepts nothing widens the band
//! and tries again, up to [`MAX_ATTEMPTS`].

use crate::rerank::{rerank, PoolEntry, ScoredCandidate, ToleranceBand};
use serde::Serialize;

/// Scores at or below this are never accepted
pub const ACCEPT_THRESHOLD: f64 = 3.0;

/// Acceptance also requires `score >= FLOOR_RATIO * floor`
pub const FLOOR_RATIO: f64 = 0.9;

/// Only the best few after reranking are considered
pub const EXAMINE_TOP: usize = 6;

pub const MAX_ATTEMPTS: u32 = 2;

/// Months added to each band bound between attempts
pub const WIDEN_STEP: f64 = 6.0;

/// Input to one attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttemptState {
    /// 1-based
    pub attempt: u32,
    pub band: ToleranceBand,
}

impl AttemptState {
    pub fn first(band: ToleranceBand) -> Self {
        Self { attempt: 1, band }
    }
}

/// Accepted candidates from a ranked list, best first.
///
/// The floor stays at the threshold for the whole pass; it is not raised
/// to the best score seen.
pub fn accept(ranked: &[ScoredCandidate]) -> Vec<ScoredCandidate> {
    let floor = ACCEPT_THRESHOLD;
    ranked
        .iter()
        .take(EXAMINE_TOP)
        .filter(|c| c.final_score > ACCEPT_THRESHOLD && c.final_score >= FLOOR_RATIO * floor)
        .cloned()
        .collect()
}

/// One attempt: the accepted candidates, and the state for the next attempt
/// (unchanged when something was accepted, widened otherwise)
pub fn step(pool: &[PoolEntry], state: AttemptState) -> (AttemptState, Vec<ScoredCandidate>) {
    let accepted = accept(&rerank(pool, &state.band));

    let next = if accepted.is_empty() {
        AttemptState {
            attempt: state.attempt + 1,
            band: state.band.widened(WIDEN_STEP),
        }
    } else {
        state
    };

    (next, accepted)
}

/// How the loop ended
#[derive(Debug, Clone)]
pub enum RankOutcome {
    Ranked {
        results: Vec<ScoredCandidate>,
        attempts: u32,
        band: ToleranceBand,
        bands: Vec<ToleranceBand>,
    },
    Exhausted {
        attempts: u32,
        band: ToleranceBand,
        bands: Vec<ToleranceBand>,
    },
}

impl RankOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            RankOutcome::Ranked { attempts, .. } | RankOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Band used by the last attempt
    pub fn band(&self) -> ToleranceBand {
        match self {
            RankOutcome::Ranked { band, .. } | RankOutcome::Exhausted { band, .. } => *band,
        }
    }

    /// Bands in attempt order
    pub fn bands(&self) -> &[ToleranceBand] {
        match self {
            RankOutcome::Ranked { bands, .. } | RankOutcome::Exhausted { bands, .. } => bands,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RankOutcome::Ranked { .. } => "ranked",
            RankOutcome::Exhausted { .. } => "exhausted",
        }
    }
}

/// Drive [`step`] until something is accepted or attempts run out
pub fn run(pool: &[PoolEntry], initial: ToleranceBand) -> RankOutcome {
    let mut state = AttemptState::first(initial);
    let mut bands = Vec::with_capacity(MAX_ATTEMPTS as usize);

    loop {
        bands.push(state.band);
        tracing::info!(
            attempt = state.attempt,
            min_delta = state.band.min_delta,
            max_delta = state.band.max_delta,
            "Scoring attempt"
        );

        let (next, accepted) = step(pool, state);

        if !accepted.is_empty() {
            return RankOutcome::Ranked {
                results: accepted,
                attempts: state.attempt,
                band: state.band,
                bands,
            };
        }

        if state.attempt >= MAX_ATTEMPTS {
            tracing::warn!(attempts = state.attempt, "No candidate qualified, relaxation exhausted");
            return RankOutcome::Exhausted {
                attempts: state.attempt,
                band: state.band,
                bands,
            };
        }

        tracing::warn!(attempt = state.attempt, "No candidate qualified, widening tolerance");
        state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::test_support::candidate;

    fn entry(name: &str, delta: i64, relevance: f64) -> PoolEntry {
        PoolEntry {
            candidate: candidate(name, "March 2024", name),
            delta,
            relevance,
        }
    }

    fn band() -> ToleranceBand {
        ToleranceBand { min_delta: -12.0, max_delta: 12.0 }
    }

    #[test]
    fn test_accept_threshold_is_strict() {
        let pool = vec![
            entry("strong", 0, 7.5),
            entry("exactly threshold", 0, 3.0),
            entry("just above", 0, 3.01),
        ];
        let accepted = accept(&rerank(&pool, &band()));

        let names: Vec<&str> = accepted.iter().map(|c| c.candidate.content.as_str()).collect();
        assert_eq!(names, vec!["strong", "just above"]);
        assert!(accepted.iter().all(|c| c.final_score > ACCEPT_THRESHOLD));
    }

    #[test]
    fn test_accept_examines_top_six_only() {
        let pool: Vec<PoolEntry> = (0..10)
            .map(|i| entry(&format!("c{}", i), 0, 20.0 - i as f64))
            .collect();
        let accepted = accept(&rerank(&pool, &band()));
        assert_eq!(accepted.len(), EXAMINE_TOP);
        assert_eq!(accepted[0].candidate.content, "c0");
    }

    #[test]
    fn test_floor_is_static() {
        // A running maximum floor would reject 3.5 after 10.0
        let pool = vec![entry("best", 0, 10.0), entry("weaker", 0, 3.5)];
        assert_eq!(accept(&rerank(&pool, &band())).len(), 2);
    }

    #[test]
    fn test_first_attempt_success() {
        let pool = vec![entry("in band", 2, 6.0), entry("out of band", 30, 8.0)];
        match run(&pool, band()) {
            RankOutcome::Ranked { results, attempts, bands, .. } => {
                assert_eq!(attempts, 1);
                assert_eq!(bands.len(), 1);
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].candidate.content, "in band");
            }
            other => panic!("expected ranked, got {:?}", other),
        }
    }

    #[test]
    fn test_widening_rescues_second_attempt() {
        // Delta 15 sits outside [-12, 12] but inside [-18, 18]
        let pool = vec![entry("slightly old", 15, 6.0)];
        let outcome = run(&pool, band());

        assert_eq!(outcome.label(), "ranked");
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(outcome.band(), ToleranceBand { min_delta: -18.0, max_delta: 18.0 });
    }

    #[test]
    fn test_exhausts_after_two_attempts() {
        let pool = vec![entry("weak", 0, 2.0), entry("far", 100, 9.0)];
        let outcome = run(&pool, band());

        match &outcome {
            RankOutcome::Exhausted { attempts, .. } => assert_eq!(*attempts, MAX_ATTEMPTS),
            other => panic!("expected exhausted, got {:?}", other),
        }

        let bands = outcome.bands();
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[1].min_delta, bands[0].min_delta - WIDEN_STEP);
        assert_eq!(bands[1].max_delta, bands[0].max_delta + WIDEN_STEP);
    }

    #[test]
    fn test_step_is_pure() {
        let pool = vec![entry("weak", 0, 1.0)];
        let state = AttemptState::first(band());

        let (a, accepted_a) = step(&pool, state);
        let (b, accepted_b) = step(&pool, state);

        assert_eq!(a, b);
        assert!(accepted_a.is_empty() && accepted_b.is_empty());
        assert_eq!(a.attempt, 2);
    }
}
