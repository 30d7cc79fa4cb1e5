//! macrolens Common Library
//!
//! Shared code for the macrolens services including:
//! - Configuration management
//! - Error types and handling
//! - Metrics and observability
//! - Process-wide embedding cache
//! - Collaborator clients (embeddings, text generation, relevance scoring)

pub mod auth;
pub mod cache;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod scoring;
pub mod upstream;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::TextGenerator;
pub use scoring::RelevanceScorer;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
