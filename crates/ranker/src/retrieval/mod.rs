//! Candidate retrieval
//!
//! The vector store is an external collaborator behind the [`VectorStore`]
//! trait. The pool it returns is fetched once per request and never
//! re-queried during relaxation.

mod milvus;

pub use milvus::MilvusStore;

use macrolens_common::errors::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Most entries allowed per distinct reference
pub const GROUP_SIZE: usize = 4;

/// Most candidates requested from the store
pub const SEARCH_LIMIT: usize = 50;

/// Fields read back for every hit
pub const OUTPUT_FIELDS: [&str; 5] = ["content", "source", "page", "reference", "date"];

/// One retrieved excerpt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub content: String,
    pub source: String,
    #[serde(deserialize_with = "string_or_number")]
    pub page: String,
    pub reference: String,
    /// "Month Year" bucket
    pub date: String,
    /// Cosine similarity reported by the store
    pub distance: f64,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Page {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Page::deserialize(deserializer)? {
        Page::Text(text) => text,
        Page::Number(number) => number.to_string(),
    })
}

/// Search parameters
#[derive(Debug, Clone)]
pub struct VectorSearch<'a> {
    pub vector: &'a [f32],
    pub filter: &'a str,
    pub limit: usize,
    pub group_by_field: &'a str,
    pub group_size: usize,
}

/// Common trait for vector stores
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Nearest candidates, grouped by `group_by_field`; empty when nothing matches
    async fn search(&self, request: &VectorSearch<'_>) -> Result<Vec<Candidate>>;

    /// Readiness probe
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Keep at most `cap` candidates per reference, preserving order
pub fn cap_per_reference(candidates: Vec<Candidate>, cap: usize) -> Vec<Candidate> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    candidates
        .into_iter()
        .filter(|candidate| {
            let count = seen.entry(candidate.reference.clone()).or_insert(0);
            *count += 1;
            *count <= cap
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Candidate;

    pub fn candidate(reference: &str, date: &str, content: &str) -> Candidate {
        Candidate {
            content: content.to_string(),
            source: format!("{}.pdf", reference.to_lowercase().replace(' ', "_")),
            page: "1".to_string(),
            reference: reference.to_string(),
            date: date.to_string(),
            distance: 0.8,
        }
    }
}
