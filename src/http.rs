//! HTTP transport module for technique-rag
//!
//! Axum-based server exposing the analyze endpoint plus plain-JSON health
//! and metrics routes.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;
use std::{cmp::Ordering, sync::Arc};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::{Result, TechniqueRagError};
use crate::pipeline::PipelineClient;
use crate::schemas::{AnalyzeRequest, build_response};

/// Shared state for HTTP server
#[derive(Clone)]
pub struct HttpState {
    pub config: Arc<Config>,
    pub pipeline: Arc<PipelineClient>,
    pub metrics: Arc<Mutex<HttpMetrics>>,
}

impl HttpState {
    pub fn new(config: Arc<Config>) -> Self {
        let pipeline = Arc::new(PipelineClient::new(&config.pipeline));
        Self {
            config,
            pipeline,
            metrics: Arc::new(Mutex::new(HttpMetrics::new())),
        }
    }
}

/// Metrics for HTTP server
#[derive(Debug, Clone)]
pub struct HttpMetrics {
    pub total_requests: u64,
    pub last_request_unix: u64,
    pub errors_total: u64,
    pub latencies: Vec<f64>, // ring buffer for p95
}

impl HttpMetrics {
    fn new() -> Self {
        Self {
            total_requests: 0,
            last_request_unix: std::time::SystemTime::UNIX_EPOCH
                .elapsed()
                .unwrap_or_default()
                .as_secs(),
            errors_total: 0,
            latencies: Vec::with_capacity(256),
        }
    }
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    "ok"
}

/// Metrics endpoint
pub async fn metrics_handler(State(state): State<HttpState>) -> impl IntoResponse {
    let metrics = state.metrics.lock().await.clone();

    // Compute latency stats
    let (avg_latency_ms, p95_latency_ms) = if metrics.latencies.is_empty() {
        (None, None)
    } else {
        let sum: f64 = metrics.latencies.iter().sum();
        let avg = sum / metrics.latencies.len() as f64;
        let mut sorted = metrics.latencies.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let p95_idx = (sorted.len() as f64 * 0.95) as usize;
        let p95 = sorted.get(p95_idx).copied();
        (Some(avg), p95)
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        json!({
            "metrics_version": "1",
            "total_requests": metrics.total_requests,
            "last_request_unix": metrics.last_request_unix,
            "errors_total": metrics.errors_total,
            "avg_latency_ms": avg_latency_ms,
            "p95_latency_ms": p95_latency_ms,
            "pipeline": {
                "interpreter": state.config.pipeline.interpreter,
                "script": state.config.pipeline.script.display().to_string(),
                "timeout_ms": state.config.pipeline.timeout_ms
            }
        })
        .to_string(),
    )
}

/// Analyze endpoint: validate, run the pipeline, enrich, respond.
///
/// Validation happens before any spawn; an empty or missing text never
/// reaches the collaborator.
pub async fn analyze_handler(
    State(state): State<HttpState>,
    axum::Json(request): axum::Json<AnalyzeRequest>,
) -> Result<impl IntoResponse> {
    let text = request.text.unwrap_or_default();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TechniqueRagError::Validation {
            message: "text is missing or empty after trimming".into(),
        });
    }

    let output = state.pipeline.analyze(trimmed).await?;
    let body = build_response(output, &text, Utc::now());

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    ))
}

/// Build the application router with metrics and CORS layers.
pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/analyze", post(analyze_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            |State(metrics): State<Arc<Mutex<HttpMetrics>>>,
             req: axum::http::Request<Body>,
             next: axum::middleware::Next| async move {
                let is_api = req.uri().path().starts_with("/api/");
                let start = if is_api {
                    Some(std::time::Instant::now())
                } else {
                    None
                };
                let resp = next.run(req).await;
                if let Some(start_time) = start {
                    let latency_ms = start_time.elapsed().as_millis() as f64;
                    let mut m = metrics.lock().await;
                    if latency_ms > 0.0 {
                        m.latencies.push(latency_ms);
                        if m.latencies.len() > 256 {
                            m.latencies.remove(0);
                        }
                    }
                    if !resp.status().is_success() {
                        m.errors_total = m.errors_total.saturating_add(1);
                    }
                    m.total_requests = m.total_requests.saturating_add(1);
                    m.last_request_unix = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_secs();
                }
                resp
            },
        ))
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_http_server(config: Arc<Config>) -> Result<()> {
    let state = HttpState::new(config.clone());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.http.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP listener: {}", e))?;

    tracing::info!(
        "Starting HTTP server on {} (analyze at /api/analyze)",
        config.http.bind
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}
