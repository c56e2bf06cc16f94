// HTTP surface - a thin axum layer over the strategy chain and the engine

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::{OnceCell, Semaphore};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::acquisition::runner::CommandRunner;
use crate::acquisition::tools::{self, ToolReport};
use crate::acquisition::StrategyChain;
use crate::transcription::TranscriptionEngine;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<StrategyChain>,
    pub engine: Arc<dyn TranscriptionEngine>,
    /// Bounds concurrent transcriptions; the engine is the heavy resource
    pub transcriptions: Arc<Semaphore>,
    pub runner: CommandRunner,
    tool_report: Arc<OnceCell<ToolReport>>,
    /// Origins allowed by CORS; empty or `*` allows any
    cors_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(
        chain: StrategyChain,
        engine: Arc<dyn TranscriptionEngine>,
        max_concurrent_transcriptions: usize,
        runner: CommandRunner,
    ) -> Self {
        Self {
            chain: Arc::new(chain),
            engine,
            transcriptions: Arc::new(Semaphore::new(max_concurrent_transcriptions.max(1))),
            runner,
            tool_report: Arc::new(OnceCell::new()),
            cors_origins: Arc::new(Vec::new()),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Arc::new(origins);
        self
    }

    /// Use a precomputed tool inventory instead of probing on first `/health`
    pub fn with_tool_report(mut self, report: ToolReport) -> Self {
        self.tool_report = Arc::new(OnceCell::new_with(Some(report)));
        self
    }

    /// Tool inventory, probed once
    pub async fn tool_report(&self) -> &ToolReport {
        self.tool_report
            .get_or_init(|| tools::report(&self.runner))
            .await
    }
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/transcribe", post(handlers::transcribe))
        .route("/downloads", get(handlers::downloads))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
        .layer(cors)
}

/// Browser clients call the API from other origins
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(allowed)
    };

    CorsLayer::new()
        .allow_origin(allow)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([axum::http::header::CONTENT_DISPOSITION])
}
