//! Embedding cache
//!
//! Provides:
//! - A process-wide, read-through embedding cache keyed by exact input text
//! - An optional shared Redis tier so replicas reuse each other's vectors
//!
//! Entries are never invalidated and never evicted: embeddings are
//! deterministic for identical input, so concurrent writers to one key
//! store equivalent values.

use crate::errors::{AppError, Result};
use crate::metrics;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Redis cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "macrolens".to_string(),
        }
    }
}

/// Redis cache client
pub struct Cache {
    connection: RwLock<MultiplexedConnection>,
    config: CacheConfig,
}

impl Cache {
    /// Create a new cache client
    pub async fn new(config: CacheConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| AppError::CacheError {
            message: format!("Failed to create Redis client: {}", e),
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection: RwLock::new(connection),
            config,
        })
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }

    /// Get a value from cache
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let full_key = self.key(key);
        let mut conn = self.connection.write().await;

        let value: Option<String> = conn.get(&full_key).await.map_err(|e| AppError::CacheError {
            message: format!("Failed to get key '{}': {}", full_key, e),
        })?;

        match value {
            Some(json) => {
                let parsed = serde_json::from_str(&json).map_err(|e| AppError::CacheError {
                    message: format!("Failed to parse cached value: {}", e),
                })?;
                debug!(key = %full_key, "Cache hit");
                Ok(Some(parsed))
            }
            None => {
                debug!(key = %full_key, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Set a value in cache without expiry
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let full_key = self.key(key);
        let json = serde_json::to_string(value).map_err(|e| AppError::CacheError {
            message: format!("Failed to serialize value: {}", e),
        })?;

        let mut conn = self.connection.write().await;
        let _: () = conn.set(&full_key, &json).await.map_err(|e| AppError::CacheError {
            message: format!("Failed to set key '{}': {}", full_key, e),
        })?;

        debug!(key = %full_key, "Cache set");
        Ok(())
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.write().await;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }
}

/// Process-wide embedding cache with an optional shared Redis tier
pub struct EmbeddingCache {
    local: RwLock<HashMap<String, Arc<Vec<f32>>>>,
    shared: Option<Arc<Cache>>,
}

impl EmbeddingCache {
    /// In-process cache only
    pub fn new() -> Self {
        Self {
            local: RwLock::new(HashMap::new()),
            shared: None,
        }
    }

    /// In-process cache backed by Redis
    pub fn with_shared(shared: Arc<Cache>) -> Self {
        Self {
            local: RwLock::new(HashMap::new()),
            shared: Some(shared),
        }
    }

    /// The shared tier, if configured
    pub fn shared(&self) -> Option<&Arc<Cache>> {
        self.shared.as_ref()
    }

    /// Number of vectors held in process
    pub async fn len(&self) -> usize {
        self.local.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.local.read().await.is_empty()
    }

    /// Look up `text`, falling back to `loader` on a miss in both tiers.
    ///
    /// Redis failures degrade to a miss; only the loader's error is surfaced.
    pub async fn get_or_load<F, Fut>(&self, model: &str, text: &str, loader: F) -> Result<Arc<Vec<f32>>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<f32>>>,
    {
        if let Some(hit) = self.local.read().await.get(text).cloned() {
            metrics::record_cache(true, "embedding", "memory");
            return Ok(hit);
        }
        metrics::record_cache(false, "embedding", "memory");

        let shared_key = keys::embedding(&text_hash(text), model);

        if let Some(shared) = &self.shared {
            match shared.get::<Vec<f32>>(&shared_key).await {
                Ok(Some(vector)) => {
                    metrics::record_cache(true, "embedding", "redis");
                    let vector = Arc::new(vector);
                    self.local.write().await.insert(text.to_string(), vector.clone());
                    return Ok(vector);
                }
                Ok(None) => metrics::record_cache(false, "embedding", "redis"),
                Err(e) => warn!(error = %e, "Shared embedding cache read failed, continuing without it"),
            }
        }

        let vector = Arc::new(loader().await?);

        if let Some(shared) = &self.shared {
            if let Err(e) = shared.set(&shared_key, vector.as_ref()).await {
                warn!(error = %e, "Failed to cache embedding, continuing without cache");
            }
        }

        self.local.write().await.insert(text.to_string(), vector.clone());
        Ok(vector)
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 of the exact input text, hex encoded
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cache key builder helpers
pub mod keys {
    /// Build an embedding cache key
    pub fn embedding(text_hash: &str, model: &str) -> String {
        format!("embedding:{}:{}", model, text_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_key_builders() {
        let key = keys::embedding(&text_hash("CPI March 2024"), "mpnet");
        assert!(key.starts_with("embedding:mpnet:"));
        assert_eq!(key.len(), "embedding:mpnet:".len() + 64);
    }

    #[test]
    fn test_text_hash_is_exact() {
        assert_eq!(text_hash("inflation"), text_hash("inflation"));
        assert_ne!(text_hash("inflation"), text_hash("Inflation"));
        assert_ne!(text_hash("inflation"), text_hash("inflation "));
    }

    #[tokio::test]
    async fn test_read_through_loads_once() {
        let cache = EmbeddingCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let vector = cache
                .get_or_load("mock", "repo rate May 2025", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![0.5, 0.25])
                })
                .await
                .unwrap();
            assert_eq!(vector.as_slice(), &[0.5, 0.25]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_loader_error_is_not_cached() {
        let cache = EmbeddingCache::new();

        let failed = cache
            .get_or_load("mock", "gdp", || async {
                Err(AppError::EmbeddingError {
                    message: "down".into(),
                })
            })
            .await;
        assert!(failed.is_err());
        assert!(cache.is_empty().await);

        let vector = cache
            .get_or_load("mock", "gdp", || async { Ok(vec![1.0]) })
            .await
            .unwrap();
        assert_eq!(vector.len(), 1);
    }
}
