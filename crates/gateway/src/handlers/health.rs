//! Health check handlers

use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use macrolens_common::errors::Result;
use serde::Serialize;
use std::future::Future;
use std::time::Instant;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub vector_store: CheckResult,
    /// Absent when no shared cache tier is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CheckResult>,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

async fn probe<F>(check: F) -> CheckResult
where
    F: Future<Output = Result<()>>,
{
    let start = Instant::now();
    match check.await {
        Ok(()) => CheckResult {
            status: "up".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => CheckResult {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(e.to_string()),
        },
    }
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: macrolens_common::VERSION,
    })
}

/// Readiness probe - checks the vector store and the shared cache
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let vector_store = probe(state.pipeline.check_store()).await;

    let cache = match state.embedding_cache.shared() {
        Some(shared) => Some(probe(shared.ping()).await),
        None => None,
    };

    let all_healthy = vector_store.is_up() && cache.as_ref().map_or(true, CheckResult::is_up);
    let status = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
            checks: HealthChecks { vector_store, cache },
        }),
    )
}
