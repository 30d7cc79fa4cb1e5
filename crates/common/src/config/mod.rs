//! Configuration management for macrolens services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Inbound authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Text-generation service (query clarification, date extraction)
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector store configuration
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Cross-encoder relevance scoring
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Redis configuration (optional shared embedding cache tier)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Shared API key expected from callers; auth is disabled when unset
    pub api_key: Option<String>,

    /// Header carrying the API key
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Provider: gemini, openai, mock
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    /// API key for the provider
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Ground query clarification with web search (gemini only)
    #[serde(default = "default_enabled")]
    pub web_search: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    /// Milvus REST endpoint
    #[serde(default = "default_vector_endpoint")]
    pub endpoint: String,

    /// Bearer token (user:password or API key)
    pub token: Option<String>,

    /// Database holding the collection
    #[serde(default = "default_vector_database")]
    pub database: String,

    /// Collection of economic-report chunks
    #[serde(default = "default_vector_collection")]
    pub collection: String,

    /// Field holding the "Month Year" date label
    #[serde(default = "default_date_field")]
    pub date_field: String,

    /// Field results are grouped by
    #[serde(default = "default_group_field")]
    pub group_field: String,

    /// Maximum candidates returned per search
    #[serde(default = "default_vector_limit")]
    pub limit: usize,

    /// Maximum candidates per group
    #[serde(default = "default_group_size")]
    pub group_size: usize,

    /// Request timeout in seconds
    #[serde(default = "default_vector_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    /// Provider: http, mock
    #[serde(default = "default_scoring_provider")]
    pub provider: String,

    /// Cross-encoder rerank endpoint
    #[serde(default = "default_scoring_endpoint")]
    pub endpoint: String,

    /// API key for the scoring service
    pub api_key: Option<String>,

    /// Cross-encoder model name
    #[serde(default = "default_scoring_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_scoring_timeout")]
    pub timeout_secs: u64,

    /// Pairs scored per request
    #[serde(default = "default_scoring_batch")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis URL; the shared cache tier is disabled when unset
    pub url: Option<String>,

    /// Key prefix for namespacing
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Expose Prometheus metrics on /metrics
    #[serde(default = "default_enabled")]
    pub metrics_enabled: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_api_key_header() -> String { "access_token".to_string() }
fn default_generation_provider() -> String { "gemini".to_string() }
fn default_generation_model() -> String { "gemini-2.0-flash".to_string() }
fn default_generation_timeout() -> u64 { 20 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_vector_endpoint() -> String { "http://localhost:19530".to_string() }
fn default_vector_database() -> String { "default".to_string() }
fn default_vector_collection() -> String { "economic_reports".to_string() }
fn default_date_field() -> String { "date".to_string() }
fn default_group_field() -> String { "reference".to_string() }
fn default_vector_limit() -> usize { 50 }
fn default_group_size() -> usize { 4 }
fn default_vector_timeout() -> u64 { 15 }
fn default_scoring_provider() -> String { "http".to_string() }
fn default_scoring_endpoint() -> String { "http://localhost:8081/rerank".to_string() }
fn default_scoring_model() -> String { "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string() }
fn default_scoring_timeout() -> u64 { 30 }
fn default_scoring_batch() -> usize { 32 }
fn default_key_prefix() -> String { "macrolens".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "macrolens".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__VECTOR_STORE__COLLECTION=cpi_v5
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl VectorStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ScoringConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_header: default_api_key_header(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            api_key: None,
            api_base: None,
            model: default_generation_model(),
            timeout_secs: default_generation_timeout(),
            web_search: default_enabled(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_vector_endpoint(),
            token: None,
            database: default_vector_database(),
            collection: default_vector_collection(),
            date_field: default_date_field(),
            group_field: default_group_field(),
            limit: default_vector_limit(),
            group_size: default_group_size(),
            timeout_secs: default_vector_timeout(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            provider: default_scoring_provider(),
            endpoint: default_scoring_endpoint(),
            api_key: None,
            model: default_scoring_model(),
            timeout_secs: default_scoring_timeout(),
            batch_size: default_scoring_batch(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_enabled(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.api_key_header, "access_token");
        assert_eq!(config.vector_store.limit, 50);
        assert_eq!(config.vector_store.group_size, 4);
        assert_eq!(config.vector_store.group_field, "reference");
        assert!(config.redis.url.is_none());
    }

    #[test]
    fn test_empty_source_uses_defaults() {
        let config: AppConfig = Config::builder()
            .set_override("vector_store.collection", "cpi_v5")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.vector_store.collection, "cpi_v5");
        assert_eq!(config.vector_store.date_field, "date");
        assert_eq!(config.generation.model, "gemini-2.0-flash");
        assert_eq!(config.scoring.timeout(), Duration::from_secs(30));
    }
}
