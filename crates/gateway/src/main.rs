//! macrolens API Gateway
//!
//! The entry point for ranking requests.
//! Handles:
//! - API key authentication
//! - Rate limiting
//! - Request routing to the rank pipeline
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use macrolens_common::{
    auth::{api_key_middleware, ApiKeyGuard},
    cache::{Cache, CacheConfig, EmbeddingCache},
    config::{AppConfig, ObservabilityConfig, RedisConfig},
    embeddings::{create_embedder, CachedEmbedder},
    llm::create_generator,
    metrics::{self, METRICS_PREFIX, RANK_LATENCY_BUCKETS, UPSTREAM_BUCKETS},
    scoring::create_scorer,
    Embedder,
};
use macrolens_ranker::{MilvusStore, RankPipeline, RetrievalSettings, SystemClock};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use middleware::rate_limit::{self, GlobalRateLimiter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<RankPipeline>,
    pub embedding_cache: Arc<EmbeddingCache>,
    /// Prometheus handle, `None` when metrics are disabled
    pub metrics: Option<PrometheusHandle>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load().context("Failed to load configuration")?);

    init_tracing(&config.observability);
    info!(
        service = %config.observability.service_name,
        "Starting macrolens API Gateway v{}",
        macrolens_common::VERSION
    );

    // Initialize metrics
    let metrics = if config.observability.metrics_enabled {
        let handle = install_metrics_recorder()?;
        metrics::register_metrics();
        Some(handle)
    } else {
        None
    };

    let embedding_cache = Arc::new(create_embedding_cache(&config.redis).await);

    // Collaborators
    let generator = create_generator(&config.generation)?;
    let embedder: Arc<dyn Embedder> = Arc::new(CachedEmbedder::new(
        create_embedder(&config.embedding)?,
        embedding_cache.clone(),
        config.embedding.timeout(),
    ));
    let store = Arc::new(MilvusStore::new(&config.vector_store)?);
    let scorer = create_scorer(&config.scoring)?;

    info!(
        generator = %generator.model_name(),
        embedder = %embedder.model_name(),
        scorer = %scorer.model_name(),
        collection = %config.vector_store.collection,
        "Collaborators configured"
    );

    let pipeline = RankPipeline::new(
        generator,
        embedder,
        store,
        scorer,
        Arc::new(SystemClock),
        RetrievalSettings::from(&config.vector_store),
    )?;

    if let Err(e) = pipeline.check_store().await {
        warn!(error = %e, "Vector store not reachable at startup");
    }

    let guard = Arc::new(ApiKeyGuard::from_config(&config.auth)?);
    if !guard.is_enabled() {
        warn!("No API key configured, /search-topN is unauthenticated");
    }
    let limiter = rate_limit::from_config(&config.rate_limit)?;

    let state = AppState {
        config: config.clone(),
        pipeline: Arc::new(pipeline),
        embedding_cache,
        metrics,
    };

    // Build the router
    let app = create_router(state, guard, limiter);

    // Start the server
    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.server.host, config.server.port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(config.shutdown_timeout()))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_rank_duration_seconds", METRICS_PREFIX)),
            RANK_LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_upstream_duration_seconds", METRICS_PREFIX)),
            UPSTREAM_BUCKETS,
        )?
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    Ok(handle)
}

/// Process-local cache, backed by Redis when one is configured and reachable
async fn create_embedding_cache(config: &RedisConfig) -> EmbeddingCache {
    let Some(url) = &config.url else {
        return EmbeddingCache::new();
    };

    let cache_config = CacheConfig {
        url: url.clone(),
        key_prefix: config.key_prefix.clone(),
    };

    match Cache::new(cache_config).await {
        Ok(cache) => {
            info!("Shared embedding cache enabled");
            EmbeddingCache::with_shared(Arc::new(cache))
        }
        Err(e) => {
            warn!(error = %e, "Redis unavailable, using process-local embedding cache only");
            EmbeddingCache::new()
        }
    }
}

/// Create the main application router
fn create_router(
    state: AppState,
    guard: Arc<ApiKeyGuard>,
    limiter: Option<Arc<GlobalRateLimiter>>,
) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Search requires the API key
    let search_routes = Router::new()
        .route("/search-topN", post(handlers::search::search_top_n))
        .route_layer(from_fn_with_state(guard, api_key_middleware));

    let mut app = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::metrics::metrics))
        .merge(search_routes);

    if let Some(limiter) = limiter {
        app = app.layer(from_fn_with_state(limiter, rate_limit::rate_limit_middleware));
    }

    // Last layer added runs first: the request id exists before tracing and handlers see it
    app.layer(from_fn(middleware::metrics::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }

    // In-flight requests get `grace` to drain
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(grace_secs = grace.as_secs(), "Shutdown grace period elapsed, exiting");
        std::process::exit(1);
    });
}
