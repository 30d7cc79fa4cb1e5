//! Relevance scoring (cross-encoder) clients
//!
//! Scores are raw cross-encoder logits; the acceptance threshold used by the
//! ranker lives on that scale.

use crate::config::ScoringConfig;
use crate::errors::{AppError, Result};
use crate::upstream::{services, with_timeout};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Trait for query/passage relevance scoring
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score every text against `query`; the output is aligned with `texts`
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f64>>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Cross-encoder served behind an HTTP rerank endpoint (TEI style)
pub struct HttpCrossEncoder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    batch_size: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    raw_scores: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

impl HttpCrossEncoder {
    pub fn new(config: &ScoringConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            timeout: config.timeout(),
        })
    }

    async fn score_batch(&self, query: &str, texts: &[String]) -> Result<Vec<f64>> {
        let request = RerankRequest {
            query,
            texts,
            raw_scores: true,
            model: Some(&self.model),
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::upstream(services::SCORING, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                services::SCORING,
                format!("API error {}: {}", status, body),
            ));
        }

        let json: Value = response.json().await.map_err(|e| {
            AppError::upstream(services::SCORING, format!("Failed to parse response: {}", e))
        })?;

        parse_rerank_response(&json, texts.len())
    }
}

/// Align a rerank response to input order.
///
/// Accepts a bare array or an object wrapping it under `results` / `data`;
/// each item carries `index` plus `score` or `relevance_score`.
fn parse_rerank_response(json: &Value, expected: usize) -> Result<Vec<f64>> {
    let items = json
        .as_array()
        .or_else(|| json.get("results").and_then(Value::as_array))
        .or_else(|| json.get("data").and_then(Value::as_array))
        .ok_or_else(|| AppError::upstream(services::SCORING, "Response is missing a results array"))?;

    let mut scores: Vec<Option<f64>> = vec![None; expected];

    for item in items {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .ok_or_else(|| AppError::upstream(services::SCORING, "Result is missing an index"))?
            as usize;
        let score = item
            .get("score")
            .or_else(|| item.get("relevance_score"))
            .and_then(Value::as_f64)
            .ok_or_else(|| AppError::upstream(services::SCORING, "Result is missing a score"))?;

        match scores.get_mut(index) {
            Some(slot) => *slot = Some(score),
            None => {
                return Err(AppError::upstream(
                    services::SCORING,
                    format!("Result index {} out of range for {} texts", index, expected),
                ))
            }
        }
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            s.ok_or_else(|| AppError::upstream(services::SCORING, format!("No score returned for text {}", i)))
        })
        .collect()
}

#[async_trait]
impl RelevanceScorer for HttpCrossEncoder {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f64>> {
        let mut scores = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let batch_scores =
                with_timeout(services::SCORING, self.timeout, self.score_batch(query, batch)).await?;
            scores.extend(batch_scores);
        }

        Ok(scores)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock scorer: token overlap between query and text, scaled to logit range
pub struct MockScorer;

#[async_trait]
impl RelevanceScorer for MockScorer {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f64>> {
        let query_terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();

        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let hits = query_terms.iter().filter(|t| lower.contains(t.as_str())).count();
                if query_terms.is_empty() {
                    -10.0
                } else {
                    (hits as f64 / query_terms.len() as f64) * 20.0 - 10.0
                }
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "mock-scorer"
    }
}

/// Create a relevance scorer based on configuration
pub fn create_scorer(config: &ScoringConfig) -> Result<Arc<dyn RelevanceScorer>> {
    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpCrossEncoder::new(config)?)),
        "mock" => Ok(Arc::new(MockScorer)),
        other => Err(AppError::Configuration {
            message: format!("Unknown scoring provider '{}'", other),
        }),
    }
}
