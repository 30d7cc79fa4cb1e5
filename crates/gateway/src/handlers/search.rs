//! Search handler
//!
//! `POST /search-topN` resolves the question's time frame, retrieves
//! candidate excerpts inside the date window and returns the reranked set.

use crate::AppState;
use axum::{extract::State, Json};
use macrolens_common::auth::CallerContext;
use macrolens_common::errors::{AppError, Result};
use macrolens_common::upstream::services;
use macrolens_ranker::RankedResultSet;
use serde::Deserialize;
use tracing::{info, instrument};
use validator::Validate;

/// Search request
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    /// Natural-language question
    #[validate(length(min = 1, max = 2000))]
    pub question: String,
}

/// Rank excerpts for a question
#[instrument(skip(state, request), fields(request_id = %caller.request_id))]
pub async fn search_top_n(
    State(state): State<AppState>,
    caller: CallerContext,
    Json(request): Json<SearchRequest>,
) -> Result<Json<RankedResultSet>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("question".to_string()),
    })?;

    let question = request.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation {
            message: "question must not be blank".to_string(),
            field: Some("question".to_string()),
        });
    }

    info!(client_ip = %caller.client_ip_or_unknown(), "Search request received");

    let timeout = state.config.request_timeout();
    let result = tokio::time::timeout(timeout, state.pipeline.rank(question, &caller))
        .await
        .map_err(|_| AppError::UpstreamTimeout {
            service: services::RANK_PIPELINE.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })??;

    Ok(Json(result))
}
