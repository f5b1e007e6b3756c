//! HTTP API over the RAG pipeline
//!
//! - `GET /healthz`: liveness
//! - `GET /api/status`: collection, embedding model and available providers
//! - `POST /api/query`: `{query, provider?, k?}` to answer, citations and metrics

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{RagError, Result};
use crate::pipeline::RagPipeline;
use crate::retrieval::Citation;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<RagPipeline>,
    default_k: usize,
    max_k: usize,
}

impl AppState {
    pub fn new(pipeline: Arc<RagPipeline>, default_k: usize, max_k: usize) -> Self {
        let default_k = default_k.max(1);
        Self {
            pipeline,
            default_k,
            max_k: max_k.max(default_k),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: Option<String>,
    pub provider: Option<String>,
    /// Integer or integer string
    pub k: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub metrics: QueryMetrics,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryMetrics {
    /// Provider that answered, upper-cased
    pub provider: String,
    /// Number of chunks actually retrieved
    pub k: usize,
    /// Approximate word-count proxy
    pub tokens_used: usize,
    pub latency_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub collection: String,
    pub points: usize,
    pub embedding_model: String,
    pub default_provider: String,
    pub providers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Build the router with request tracing
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/status", get(status_handler))
        .route("/api/query", post(query_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| RagError::io(e, format!("Failed to bind {}", addr)))?;

    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .map_err(|e| RagError::io(e, "Server error"))?;

    info!("Server stopped");
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn status_handler(State(state): State<AppState>) -> std::result::Result<Json<StatusResponse>, ApiError> {
    let retriever = state.pipeline.retriever();
    let points = retriever
        .store()
        .count(retriever.collection())
        .map_err(internal_error)?;
    let backends = state.pipeline.backends();

    Ok(Json(StatusResponse {
        collection: retriever.collection().to_string(),
        points,
        embedding_model: retriever.provider().model_name().to_string(),
        default_provider: backends.default_kind().to_string(),
        providers: backends.available().iter().map(|k| k.to_string()).collect(),
    }))
}

async fn query_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> std::result::Result<Json<QueryResponse>, ApiError> {
    let Json(request) = body.map_err(|e| bad_request(format!("Invalid JSON body: {}", e.body_text())))?;

    let query = request
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| bad_request("Missing 'query' field"))?;
    let k = parse_k(request.k.as_ref(), state.default_k, state.max_k)?;

    let backend = state
        .pipeline
        .backends()
        .get(request.provider.as_deref())
        .map_err(error_response)?;

    let start = Instant::now();
    let pipeline = Arc::clone(&state.pipeline);
    let worker_backend = Arc::clone(&backend);
    let result = tokio::task::spawn_blocking(move || {
        pipeline.answer_with(worker_backend.as_ref(), &query, k)
    })
    .await
    .map_err(|e| internal_error(RagError::Other(anyhow::anyhow!("pipeline task failed: {}", e))))?
    .map_err(error_response)?;

    let latency_ms = (start.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0;

    Ok(Json(QueryResponse {
        metrics: QueryMetrics {
            provider: backend.name().to_uppercase(),
            k: result.retrieved_texts.len(),
            tokens_used: result.tokens_used,
            latency_ms,
        },
        answer: result.answer,
        citations: result.citations,
    }))
}

/// Accept `k` as a JSON integer or an integer string within `1..=max_k`
fn parse_k(value: Option<&Value>, default_k: usize, max_k: usize) -> std::result::Result<usize, ApiError> {
    let k = match value {
        None | Some(Value::Null) => return Ok(default_k),
        Some(Value::Number(n)) => n.as_u64().map(|n| n as usize),
        Some(Value::String(s)) => s.trim().parse::<usize>().ok(),
        Some(_) => None,
    }
    .ok_or_else(|| bad_request("'k' must be an integer"))?;

    if k == 0 || k > max_k {
        return Err(bad_request(format!("'k' must be between 1 and {}", max_k)));
    }
    Ok(k)
}

fn error_response(err: RagError) -> ApiError {
    match err {
        RagError::UnsupportedProvider { .. } | RagError::ProviderUnavailable(_) => {
            bad_request(err.to_string())
        }
        other => internal_error(other),
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn internal_error(err: RagError) -> ApiError {
    warn!("Query failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}
