//! Authentication utilities
//!
//! Provides:
//! - API key hashing and validation
//! - A header-based API key guard usable as axum middleware
//! - Caller context extraction (client address, request id)

use crate::config::AuthConfig;
use crate::errors::{AppError, Result};
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, HeaderName},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;

/// Who is calling, for logs
#[derive(Debug, Clone)]
pub struct CallerContext {
    /// Client address (first `x-forwarded-for` hop, else the socket peer)
    pub client_ip: Option<String>,

    /// Request ID for tracing
    pub request_id: String,
}

impl CallerContext {
    /// Context for calls that do not originate from HTTP
    pub fn internal(request_id: impl Into<String>) -> Self {
        Self {
            client_ip: None,
            request_id: request_id.into(),
        }
    }

    pub fn client_ip_or_unknown(&self) -> &str {
        self.client_ip.as_deref().unwrap_or("unknown")
    }
}

/// Hash an API key for comparison
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Validate an API key against a stored hash
pub fn validate_api_key(api_key: &str, stored_hash: &str) -> bool {
    hash_api_key(api_key) == stored_hash
}

/// Checks the configured API key header on incoming requests.
///
/// With no key configured every request passes.
#[derive(Debug, Clone)]
pub struct ApiKeyGuard {
    header: HeaderName,
    expected_hash: Option<String>,
}

impl ApiKeyGuard {
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let header = HeaderName::from_bytes(config.api_key_header.to_ascii_lowercase().as_bytes())
            .map_err(|e| AppError::Configuration {
                message: format!("Invalid auth.api_key_header '{}': {}", config.api_key_header, e),
            })?;

        Ok(Self {
            header,
            expected_hash: config.api_key.as_deref().map(hash_api_key),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.expected_hash.is_some()
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Verify the key carried in `headers`
    pub fn check(&self, headers: &HeaderMap) -> Result<()> {
        let Some(expected) = &self.expected_hash else {
            return Ok(());
        };

        let presented = headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized {
                message: format!("Missing {} header", self.header),
            })?;

        if validate_api_key(presented, expected) {
            Ok(())
        } else {
            Err(AppError::InvalidApiKey)
        }
    }
}

/// Middleware rejecting requests without a valid API key
pub async fn api_key_middleware(
    State(guard): State<Arc<ApiKeyGuard>>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    guard.check(request.headers())?;
    Ok(next.run(request).await)
}

/// Axum extractor for CallerContext
impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| "unknown".to_string());

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let client_ip = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(CallerContext {
            client_ip,
            request_id,
        })
    }
}
