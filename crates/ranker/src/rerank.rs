//! Relevance reranking with a temporal tolerance band
//!
//! Each candidate carries its cross-encoder score and its signed month
//! delta from the center date (positive = older). Candidates inside the
//! band keep their score; everything outside loses a fixed penalty.

use crate::retrieval::Candidate;
use serde::Serialize;

/// Subtracted from candidates outside the tolerance band
pub const OUT_OF_BAND_PENALTY: f64 = 25.0;

/// Inclusive `[min_delta, max_delta]` range of in-scope deltas
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToleranceBand {
    pub min_delta: f64,
    pub max_delta: f64,
}

impl ToleranceBand {
    /// Derive the band from the spread of retrieved deltas.
    ///
    /// All older than center: anchor at the smallest delta. All newer:
    /// anchor at the largest. Mixed: anchor at zero. The band then spans
    /// `window_size` months with the anchor half a window from its top.
    pub fn from_deltas(deltas: &[i64], window_size: i64) -> Self {
        let anchor = match (deltas.iter().min(), deltas.iter().max()) {
            (Some(&min), Some(_)) if min > 0 => min,
            (Some(_), Some(&max)) if max < 0 => max,
            _ => 0,
        };

        let window = window_size as f64;
        let max_delta = anchor as f64 + 0.5 * window;
        Self {
            min_delta: max_delta - window,
            max_delta,
        }
    }

    /// Both bounds pushed outward by `step`
    pub fn widened(self, step: f64) -> Self {
        Self {
            min_delta: self.min_delta - step,
            max_delta: self.max_delta + step,
        }
    }

    pub fn contains(&self, delta: i64) -> bool {
        let delta = delta as f64;
        self.min_delta <= delta && delta <= self.max_delta
    }

    /// 0 inside the band, [`OUT_OF_BAND_PENALTY`] outside
    pub fn boost(&self, delta: i64) -> f64 {
        if self.contains(delta) {
            0.0
        } else {
            OUT_OF_BAND_PENALTY
        }
    }
}

/// A pool entry with the attempt-independent signals
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub candidate: Candidate,
    pub delta: i64,
    pub relevance: f64,
}

/// A candidate scored under one tolerance band
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub delta: i64,
    pub relevance: f64,
    pub boost: f64,
    pub final_score: f64,
}

/// Score every entry under `band`, best first.
///
/// The sort is stable, so equal scores keep retrieval order.
pub fn rerank(pool: &[PoolEntry], band: &ToleranceBand) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = pool
        .iter()
        .map(|entry| {
            let boost = band.boost(entry.delta);
            ScoredCandidate {
                candidate: entry.candidate.clone(),
                delta: entry.delta,
                relevance: entry.relevance,
                boost,
                final_score: entry.relevance - boost,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
    scored
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

    #[test]
    fn test_band_mixed_deltas_centers_on_zero() {
        let band = ToleranceBand::from_deltas(&[-2, 0, 5, 30], 24);
        assert_eq!(band, ToleranceBand { min_delta: -12.0, max_delta: 12.0 });
    }

    #[test]
    fn test_band_all_older_anchors_on_min() {
        let band = ToleranceBand::from_deltas(&[9, 4, 15], 24);
        assert_eq!(band, ToleranceBand { min_delta: -8.0, max_delta: 16.0 });
    }

    #[test]
    fn test_band_all_newer_anchors_on_max() {
        let band = ToleranceBand::from_deltas(&[-9, -4, -15], 24);
        assert_eq!(band, ToleranceBand { min_delta: -16.0, max_delta: 8.0 });
    }

    #[test]
    fn test_band_with_zero_delta_is_mixed() {
        let band = ToleranceBand::from_deltas(&[0, 3], 24);
        assert_eq!(band.max_delta, 12.0);
        assert_eq!(ToleranceBand::from_deltas(&[], 24).max_delta, 12.0);
    }

    #[test]
    fn test_widened_moves_each_bound_by_step() {
        let band = ToleranceBand { min_delta: -12.0, max_delta: 12.0 }.widened(6.0);
        assert_eq!(band, ToleranceBand { min_delta: -18.0, max_delta: 18.0 });
    }

    #[test]
    fn test_boost_is_a_hard_cut() {
        let band = ToleranceBand { min_delta: -12.0, max_delta: 12.0 };
        assert_eq!(band.boost(0), 0.0);
        assert_eq!(band.boost(12), 0.0);
        assert_eq!(band.boost(-12), 0.0);
        assert_eq!(band.boost(13), OUT_OF_BAND_PENALTY);
        assert_eq!(band.boost(999), OUT_OF_BAND_PENALTY);
    }

    #[test]
    fn test_rerank_orders_by_final_score() {
        let band = ToleranceBand { min_delta: -12.0, max_delta: 12.0 };
        let pool = vec![
            entry("stale but relevant", 40, 9.0),
            entry("current", 0, 5.0),
            entry("recent", 3, 6.0),
        ];

        let ranked = rerank(&pool, &band);
        let order: Vec<&str> = ranked.iter().map(|r| r.candidate.content.as_str()).collect();

        assert_eq!(order, vec!["recent", "current", "stale but relevant"]);
        assert_eq!(ranked[2].boost, OUT_OF_BAND_PENALTY);
        assert_eq!(ranked[2].final_score, -16.0);
    }

    #[test]
    fn test_rerank_ties_keep_retrieval_order() {
        let band = ToleranceBand { min_delta: -12.0, max_delta: 12.0 };
        let pool = vec![entry("first", 1, 4.0), entry("second", 2, 4.0), entry("third", 3, 4.0)];

        let order: Vec<String> = rerank(&pool, &band)
            .into_iter()
            .map(|r| r.candidate.content)
            .collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }
}
