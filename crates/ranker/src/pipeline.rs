//! Rank pipeline
//!
//! Resolver -> window/filter -> retrieval (once) -> rerank/relax -> assembly.
//! Every collaborator is injected at construction; the embedding cache is
//! the only state shared across requests.

use crate::assembler::{RankedResultSet, ResolvedQuery, ResultAssembler};
use crate::references::ReferenceTable;
use crate::relaxation::{self, RankOutcome};
use crate::rerank::{PoolEntry, ToleranceBand};
use crate::retrieval::{Candidate, VectorSearch, VectorStore};
use crate::temporal::{months_between, window_size, Clock, TemporalResolver, YearMonth};
use crate::window::SearchWindow;
use macrolens_common::auth::CallerContext;
use macrolens_common::config::VectorStoreConfig;
use macrolens_common::errors::{AppError, Result};
use macrolens_common::metrics;
use macrolens_common::upstream::services;
use macrolens_common::{Embedder, RelevanceScorer, TextGenerator};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Store-side names and limits
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub date_field: String,
    pub group_field: String,
    pub limit: usize,
    pub group_size: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            date_field: "date".to_string(),
            group_field: "reference".to_string(),
            limit: crate::retrieval::SEARCH_LIMIT,
            group_size: crate::retrieval::GROUP_SIZE,
        }
    }
}

impl From<&VectorStoreConfig> for RetrievalSettings {
    fn from(config: &VectorStoreConfig) -> Self {
        Self {
            date_field: config.date_field.clone(),
            group_field: config.group_field.clone(),
            limit: config.limit,
            group_size: config.group_size,
        }
    }
}

/// The temporal resolution and adaptive reranking pipeline
pub struct RankPipeline {
    resolver: TemporalResolver,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    scorer: Arc<dyn RelevanceScorer>,
    assembler: ResultAssembler,
    clock: Arc<dyn Clock>,
    settings: RetrievalSettings,
}

impl RankPipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        scorer: Arc<dyn RelevanceScorer>,
        clock: Arc<dyn Clock>,
        settings: RetrievalSettings,
    ) -> Result<Self> {
        Ok(Self {
            resolver: TemporalResolver::new(generator),
            embedder,
            store,
            scorer,
            assembler: ResultAssembler::new(ReferenceTable::standard()?),
            clock,
            settings,
        })
    }

    /// Vector store readiness
    pub async fn check_store(&self) -> Result<()> {
        self.store.health_check().await
    }

    /// Rank excerpts for `question`.
    ///
    /// An exhausted relaxation loop is `Ok` with the sentinel entry; an empty
    /// retrieval is [`AppError::NoCandidates`].
    #[instrument(
        skip(self, question, caller),
        fields(request_id = %caller.request_id, client_ip = %caller.client_ip_or_unknown())
    )]
    pub async fn rank(&self, question: &str, caller: &CallerContext) -> Result<RankedResultSet> {
        let start = Instant::now();
        info!(question, "Rank request received");

        match self.run(question, start).await {
            Ok(set) => {
                let elapsed = start.elapsed().as_secs_f64();
                let outcome = if set.is_exhausted() { "exhausted" } else { "ranked" };
                let count = if set.is_exhausted() { 0 } else { set.retrieved_results.len() };
                metrics::record_rank(elapsed, outcome, set.attempts, count);
                info!(
                    outcome,
                    attempts = set.attempts,
                    results = count,
                    total_secs = elapsed,
                    "Rank request completed"
                );
                Ok(set)
            }
            Err(e) => {
                let elapsed = start.elapsed().as_secs_f64();
                metrics::record_rank(elapsed, "failed", 0, 0);
                warn!(error = %e, total_secs = elapsed, "Rank request failed");
                Err(e)
            }
        }
    }

    async fn run(&self, question: &str, start: Instant) -> Result<RankedResultSet> {
        let today = self.clock.today();
        let query = self.resolve(question, today).await;

        let candidates = self.retrieve(&query).await?;
        let pool = self.score(&query, candidates, today).await?;

        let deltas: Vec<i64> = pool.iter().map(|entry| entry.delta).collect();
        let band = ToleranceBand::from_deltas(&deltas, query.window_size);
        let outcome = relaxation::run(&pool, band);

        if let RankOutcome::Ranked { results, .. } = &outcome {
            for (i, result) in results.iter().enumerate() {
                info!(
                    rank = i + 1,
                    source = %result.candidate.source,
                    reference = %result.candidate.reference,
                    date = %result.candidate.date,
                    distance = result.candidate.distance,
                    cross_score = result.final_score,
                    "Accepted result"
                );
            }
        }

        Ok(self
            .assembler
            .assemble(query, outcome, start.elapsed().as_secs_f64()))
    }

    async fn resolve(&self, question: &str, today: YearMonth) -> ResolvedQuery {
        let llm_query = self.resolver.clarify_query(question, today).await;
        let center = self.resolver.resolve_center_date(&llm_query, today).await;
        let earliest = self.resolver.resolve_earliest_date(&llm_query, today).await;

        let duration = months_between(&earliest.to_string(), &center.to_string(), today).abs();
        let window_size = window_size(duration);
        let window = SearchWindow::around(center, window_size, today);

        info!(
            llm_query = %llm_query,
            query_date = %center,
            earliest_date = %earliest,
            duration,
            window_size,
            "Resolved query dates"
        );

        ResolvedQuery {
            question: question.to_string(),
            llm_query,
            center,
            earliest,
            window_size,
            window,
        }
    }

    async fn retrieve(&self, query: &ResolvedQuery) -> Result<Vec<Candidate>> {
        let embed_start = Instant::now();
        let vector = self.embedder.embed(&query.llm_query).await?;
        debug!(embed_secs = embed_start.elapsed().as_secs_f64(), "Query embedded");

        let filter = query.window.filter_expression(&self.settings.date_field);
        let search = VectorSearch {
            vector: &vector,
            filter: &filter,
            limit: self.settings.limit,
            group_by_field: &self.settings.group_field,
            group_size: self.settings.group_size,
        };

        let search_start = Instant::now();
        let candidates = self.store.search(&search).await?;
        info!(
            store = self.store.name(),
            search_secs = search_start.elapsed().as_secs_f64(),
            candidates = candidates.len(),
            filter = %filter,
            "Vector search finished"
        );
        metrics::record_pool_size(candidates.len());

        if candidates.is_empty() {
            warn!("No results found for query");
            return Err(AppError::NoCandidates { filter });
        }

        for candidate in &candidates {
            debug!(
                source = %candidate.source,
                reference = %candidate.reference,
                date = %candidate.date,
                distance = candidate.distance,
                "Retrieved candidate"
            );
        }

        Ok(candidates)
    }

    async fn score(&self, query: &ResolvedQuery, candidates: Vec<Candidate>, today: YearMonth) -> Result<Vec<PoolEntry>> {
        let texts: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let scores = self.scorer.score(&query.llm_query, &texts).await?;

        if scores.len() != candidates.len() {
            return Err(AppError::upstream(
                services::SCORING,
                format!("Expected {} scores, got {}", candidates.len(), scores.len()),
            ));
        }

        let center = query.center.to_string();
        Ok(candidates
            .into_iter()
            .zip(scores)
            .map(|(candidate, relevance)| PoolEntry {
                delta: months_between(&candidate.date, &center, today),
                candidate,
                relevance,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{RetrievedResult, NO_RESULT_MESSAGE};
    use crate::retrieval::cap_per_reference;
    use crate::retrieval::test_support::candidate;
    use crate::temporal::FixedClock;
    use async_trait::async_trait;
    use macrolens_common::cache::EmbeddingCache;
    use macrolens_common::embeddings::{CachedEmbedder, MockEmbedder};
    use macrolens_common::llm::MockGenerator;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Returns a fixed pool and remembers the filter it was given
    struct StubStore {
        pool: Vec<Candidate>,
        calls: Mutex<Vec<String>>,
    }

    impl StubStore {
        fn new(pool: Vec<Candidate>) -> Arc<Self> {
            Arc::new(Self {
                pool,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl VectorStore for StubStore {
        async fn search(&self, request: &VectorSearch<'_>) -> Result<Vec<Candidate>> {
            self.calls.lock().unwrap().push(request.filter.to_string());
            Ok(cap_per_reference(self.pool.clone(), request.group_size))
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct FailingStore;

    #[async_trait]
    impl VectorStore for FailingStore {
        async fn search(&self, _request: &VectorSearch<'_>) -> Result<Vec<Candidate>> {
            Err(AppError::UpstreamTimeout {
                service: services::VECTOR_STORE.to_string(),
                timeout_ms: 15_000,
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// Scores by exact content lookup
    struct TableScorer(HashMap<String, f64>);

    #[async_trait]
    impl RelevanceScorer for TableScorer {
        async fn score(&self, _query: &str, texts: &[String]) -> Result<Vec<f64>> {
            Ok(texts.iter().map(|t| *self.0.get(t).unwrap_or(&0.0)).collect())
        }

        fn model_name(&self) -> &str {
            "table"
        }
    }

    fn scorer(entries: &[(&str, f64)]) -> Arc<TableScorer> {
        Arc::new(TableScorer(
            entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        ))
    }

    fn generator(latest: &str, earliest: &str) -> Arc<MockGenerator> {
        Arc::new(
            MockGenerator::new()
                .with_rule("LATEST", latest)
                .with_rule("EARLIEST", earliest),
        )
    }

    fn pipeline(
        generator: Arc<MockGenerator>,
        store: Arc<dyn VectorStore>,
        scorer: Arc<TableScorer>,
    ) -> RankPipeline {
        let embedder = Arc::new(CachedEmbedder::new(
            Arc::new(MockEmbedder::new(8)),
            Arc::new(EmbeddingCache::new()),
            Duration::from_secs(1),
        ));
        RankPipeline::new(
            generator,
            embedder,
            store,
            scorer,
            Arc::new(FixedClock(YearMonth::new(2025, 6).unwrap())),
            RetrievalSettings::default(),
        )
        .unwrap()
    }

    fn caller() -> CallerContext {
        CallerContext::internal("test-request")
    }

    #[tokio::test]
    async fn test_scenario_center_month_beats_distant_month() {
        let store = StubStore::new(vec![
            candidate("CPI Press Release July 2024", "July 2024", "july excerpt"),
            candidate("CPI Press Release December 2024", "December 2024", "december excerpt"),
        ]);
        // Both months fall inside [-12, 12]; ordering follows relevance
        let pipeline = pipeline(
            generator("December 2024", "December 2024"),
            store.clone(),
            scorer(&[("july excerpt", 5.0), ("december excerpt", 6.0)]),
        );

        let set = pipeline
            .rank("CPI report for December 2024", &caller())
            .await
            .unwrap();

        assert_eq!(set.query_date.to_string(), "December 2024");
        assert_eq!(set.attempts, 1);

        let results: Vec<_> = set
            .retrieved_results
            .iter()
            .map(|r| match r {
                RetrievedResult::Ranked(r) => r,
                RetrievedResult::NotFound(_) => panic!("unexpected sentinel"),
            })
            .collect();
        assert_eq!(results[0].date, "December 2024");
        assert_eq!(results[0].boost, 0.0);
        assert_eq!(results[0].date_delta, 0);
        assert_eq!(
            results[0].url,
            "https://www.mospi.gov.in/archive/press-release?field_press_release_category_tid=120"
        );

        let filters = store.calls.lock().unwrap();
        assert_eq!(filters.len(), 1);
        assert!(filters[0].contains("date == \"December 2024\""));
        assert!(filters[0].contains("date == \"February 2023\""));
        assert!(filters[0].contains("date == \"February 2025\""));
    }

    #[tokio::test]
    async fn test_scenario_distant_candidate_is_penalised() {
        // Mixed deltas (0 and -2) anchor the band at zero: [-12, 12]
        let store = StubStore::new(vec![
            candidate("CPI Press Release December 2024", "December 2024", "on target"),
            candidate("CPI Press Release February 2025", "February 2025", "slightly newer"),
            candidate("CPI Press Release October 2023", "October 2023", "fourteen months older"),
        ]);
        let pipeline = pipeline(
            generator("December 2024", "December 2024"),
            store,
            scorer(&[
                ("on target", 4.0),
                ("slightly newer", 3.5),
                ("fourteen months older", 20.0),
            ]),
        );

        let set = pipeline.rank("CPI report for December 2024", &caller()).await.unwrap();

        let accepted: Vec<(String, f64)> = set
            .retrieved_results
            .iter()
            .filter_map(|r| match r {
                RetrievedResult::Ranked(r) => Some((r.content.clone(), r.boost)),
                RetrievedResult::NotFound(_) => None,
            })
            .collect();

        assert_eq!(
            accepted,
            vec![("on target".to_string(), 0.0), ("slightly newer".to_string(), 0.0)]
        );
        assert_eq!(set.tolerance, ToleranceBand { min_delta: -12.0, max_delta: 12.0 });
    }

    #[tokio::test]
    async fn test_scenario_nothing_qualifies_returns_sentinel() {
        let store = StubStore::new(vec![
            candidate("RBI Bulletin March 2025", "March 2025", "weak a"),
            candidate("RBI Bulletin April 2025", "April 2025", "weak b"),
        ]);
        let pipeline = pipeline(
            generator("today", "today"),
            store.clone(),
            scorer(&[("weak a", 2.9), ("weak b", 3.0)]),
        );

        let set = pipeline.rank("latest bulletin commentary", &caller()).await.unwrap();

        assert!(set.is_exhausted());
        assert_eq!(set.attempts, 2);
        match &set.retrieved_results[0] {
            RetrievedResult::NotFound(entry) => {
                assert_eq!(entry.content, NO_RESULT_MESSAGE);
                assert_eq!(entry.url, "N/A");
                assert_eq!(entry.reference, "N/A");
            }
            RetrievedResult::Ranked(_) => panic!("expected sentinel"),
        }
        // Relaxation re-scores; it never re-queries
        assert_eq!(store.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_retrieval_is_not_found() {
        let pipeline = pipeline(generator("today", "today"), StubStore::new(Vec::new()), scorer(&[]));

        let result = pipeline.rank("IIP data", &caller()).await;
        assert!(matches!(result, Err(AppError::NoCandidates { .. })));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_request_error() {
        let pipeline = pipeline(generator("today", "today"), Arc::new(FailingStore), scorer(&[]));

        let result = pipeline.rank("IIP data", &caller()).await;
        assert!(matches!(result, Err(AppError::UpstreamTimeout { .. })));
    }

    #[tokio::test]
    async fn test_pool_respects_grouping_cap() {
        let pool: Vec<Candidate> = (0..7)
            .map(|i| candidate("IIP Press Release May 2025", "May 2025", &format!("iip {}", i)))
            .collect();
        let scores: Vec<(String, f64)> = (0..7).map(|i| (format!("iip {}", i), 10.0 - i as f64)).collect();
        let scorer = Arc::new(TableScorer(scores.into_iter().collect()));

        let pipeline = pipeline(generator("May 2025", "May 2025"), StubStore::new(pool), scorer);
        let set = pipeline.rank("IIP May 2025", &caller()).await.unwrap();

        assert_eq!(set.retrieved_results.len(), 4);
    }

    #[tokio::test]
    async fn test_unparseable_candidate_date_is_out_of_band() {
        let store = StubStore::new(vec![
            candidate("Monthly Economic Report May 2025", "N/A", "undated"),
            candidate("Monthly Economic Report May 2025", "May 2025", "dated"),
        ]);
        let pipeline = pipeline(
            generator("May 2025", "May 2025"),
            store,
            scorer(&[("undated", 9.0), ("dated", 5.0)]),
        );

        let set = pipeline.rank("economic report May 2025", &caller()).await.unwrap();
        assert_eq!(set.retrieved_results.len(), 1);
        match &set.retrieved_results[0] {
            RetrievedResult::Ranked(r) => assert_eq!(r.content, "dated"),
            RetrievedResult::NotFound(_) => panic!("expected a ranked result"),
        }
    }
}
