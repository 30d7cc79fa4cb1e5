//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use macrolens_common::config::RateLimitConfig;
use macrolens_common::errors::{AppError, Result};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Process-wide token bucket
pub struct GlobalRateLimiter {
    limiter: DefaultDirectRateLimiter,
    requests_per_second: u32,
}

impl GlobalRateLimiter {
    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }
}

fn non_zero(value: u32, name: &str) -> Result<NonZeroU32> {
    NonZeroU32::new(value).ok_or_else(|| AppError::Configuration {
        message: format!("rate_limit.{} must be greater than zero", name),
    })
}

/// Create a new rate limiter
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Result<Arc<GlobalRateLimiter>> {
    let quota = Quota::per_second(non_zero(requests_per_second, "requests_per_second")?)
        .allow_burst(non_zero(burst, "burst")?);

    Ok(Arc::new(GlobalRateLimiter {
        limiter: RateLimiter::direct(quota),
        requests_per_second,
    }))
}

/// Limiter for the configuration, `None` when limiting is disabled
pub fn from_config(config: &RateLimitConfig) -> Result<Option<Arc<GlobalRateLimiter>>> {
    if !config.enabled {
        return Ok(None);
    }
    create_rate_limiter(config.requests_per_second, config.burst).map(Some)
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<GlobalRateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    match limiter.limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            Err(AppError::RateLimited {
                limit: limiter.requests_per_second,
            })
        }
    }
}
