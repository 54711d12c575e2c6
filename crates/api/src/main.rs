mod cache;
mod config;
mod error;
mod handler;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use classify::{Classifier, GeminiClient, LabelProvider};
use ocr::{ExtractionPoller, PollPolicy, TabscannerClient};
use receipt::ReceiptParser;
use tokio::sync::Semaphore;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::cache::{Cache, CachedProvider};
use crate::config::AppConfig;
use crate::metrics::Metrics;

pub struct AppState {
    poller: ExtractionPoller,
    parser: ReceiptParser,
    metrics: Arc<Metrics>,
    cache: Option<Arc<Cache>>,
    /// Bounds OCR jobs in flight across all requests.
    ocr_permits: Semaphore,
}

impl AppState {
    pub fn new(
        poller: ExtractionPoller,
        parser: ReceiptParser,
        metrics: Arc<Metrics>,
        cache: Option<Arc<Cache>>,
        max_concurrent_ocr_jobs: usize,
    ) -> Self {
        Self {
            poller,
            parser,
            metrics,
            cache,
            ocr_permits: Semaphore::new(max_concurrent_ocr_jobs.max(1)),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.concurrency.request_timeout_secs);

        let ocr_client = TabscannerClient::new(
            config.ocr.base_url.clone(),
            config.ocr.api_key.clone(),
            timeout,
        )?;
        let policy = PollPolicy::new(
            config.ocr.poll_interval_ms,
            config.ocr.max_poll_interval_ms,
            config.ocr.poll_deadline_secs,
        );
        tracing::info!(
            initial_interval_ms = policy.initial_interval().as_millis() as u64,
            deadline_secs = policy.deadline().as_secs(),
            "OCR poll policy configured"
        );
        let poller = ExtractionPoller::new(Arc::new(ocr_client), policy);

        let gemini = GeminiClient::new(
            config.classifier.base_url.clone(),
            config.classifier.api_key.clone(),
            config.classifier.model.clone(),
            timeout,
            config.concurrency.max_concurrent_llm_calls,
        )?;
        tracing::info!(model = gemini.model(), "Classification provider configured");

        let (provider, cache): (Arc<dyn LabelProvider>, Option<Arc<Cache>>) = if config.cache.enabled {
            let cache = Arc::new(Cache::new(config.cache.max_entries));
            (
                Arc::new(CachedProvider::new(Arc::new(gemini), cache.clone())),
                Some(cache),
            )
        } else {
            (Arc::new(gemini), None)
        };

        let parser = ReceiptParser::new(Classifier::new(
            provider,
            config.concurrency.max_concurrent_classifications,
        ));

        Ok(Self::new(
            poller,
            parser,
            Metrics::new(),
            cache,
            config.concurrency.max_concurrent_ocr_jobs,
        ))
    }
}

pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/scan-receipt", post(handler::scan_receipt))
        .route("/scan-receipt/", post(handler::scan_receipt))
        .route("/health", get(handler::health))
        .route("/metrics", get(handler::metrics))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the variables may come from the environment.
    let _ = dotenvy::dotenv();

    // Initialize tracing
    init_tracing();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    tracing::info!(config = ?config.redacted(), "Configuration loaded");

    let max_upload_bytes = config.server.max_upload_bytes;
    let state = Arc::new(AppState::from_config(&config)?);

    // Build router
    let app = build_router(state, max_upload_bytes);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    tracing::info!("Server listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app).await.context("Server stopped")?;

    Ok(())
}
