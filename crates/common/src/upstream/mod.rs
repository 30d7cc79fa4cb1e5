//! Bounded calls to external collaborators
//!
//! Every outbound call (text generation, embeddings, vector store, scoring)
//! goes through [`with_timeout`] so a hung collaborator surfaces as
//! [`AppError::UpstreamTimeout`] instead of stalling the request.

use crate::errors::{AppError, Result};
use crate::metrics;
use std::future::Future;
use std::time::{Duration, Instant};

/// Service names used in logs, metrics and errors
pub mod services {
    pub const GENERATION: &str = "generation";
    pub const EMBEDDING: &str = "embedding";
    pub const VECTOR_STORE: &str = "vector_store";
    pub const SCORING: &str = "scoring";
    /// The whole rank request, bounded by the server request timeout
    pub const RANK_PIPELINE: &str = "rank_pipeline";
}

/// Run `fut` with a deadline, recording latency and outcome for `service`
pub async fn with_timeout<T, F>(service: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let outcome = match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::UpstreamTimeout {
            service: service.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    };

    let elapsed = start.elapsed().as_secs_f64();
    metrics::record_upstream(service, elapsed, outcome.is_ok());

    if let Err(e) = &outcome {
        tracing::warn!(
            service,
            latency_ms = (elapsed * 1000.0) as u64,
            error = %e,
            "Upstream call failed"
        );
    }

    outcome
}
