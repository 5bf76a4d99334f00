//! HTTP surface for the hybrid RAG service.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /health` – Liveness probe.
//! - `POST /ingest` – Ingest a directory. Runs in the background and returns the run id, or
//!   blocks and returns the run summary when `wait` is set. A second concurrent run gets `409`.
//! - `GET /ingest/status` – Progress of the current or last run.
//! - `POST /query` – Hybrid retrieval, context packing and optional answer generation.
//! - `GET /metrics` – Ingestion and query counters.

use crate::app::PipelineApi;
use crate::ingest::{IngestError, IngestRequest, IngestSummary, ProgressSnapshot};
use crate::metrics::MetricsSnapshot;
use crate::retrieval::{QueryError, QueryOutcome};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router exposing ingestion and query endpoints.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest::<S>))
        .route("/ingest/status", get(ingest_status::<S>))
        .route("/query", post(query::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Request body for `POST /ingest`.
#[derive(Deserialize)]
struct IngestBody {
    #[serde(flatten)]
    request: IngestRequest,
    /// Block until the run finishes.
    #[serde(default)]
    wait: bool,
}

/// Response body for `POST /ingest`.
#[derive(Serialize)]
#[serde(untagged)]
enum IngestResponse {
    Started { run_id: String },
    Finished(IngestSummary),
}

async fn ingest<S>(
    State(service): State<Arc<S>>,
    Json(body): Json<IngestBody>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError>
where
    S: PipelineApi,
{
    let IngestBody { request, wait } = body;
    tracing::info!(input_dir = %request.input_dir.display(), wait, "Ingest request received");
    if wait {
        let summary = service.run_ingest(request).await?;
        return Ok((StatusCode::OK, Json(IngestResponse::Finished(summary))));
    }
    let run_id = service.start_ingest(request)?;
    Ok((StatusCode::ACCEPTED, Json(IngestResponse::Started { run_id })))
}

async fn ingest_status<S>(State(service): State<Arc<S>>) -> Json<ProgressSnapshot>
where
    S: PipelineApi,
{
    Json(service.ingest_status())
}

/// Request body for `POST /query`.
#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

async fn query<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryOutcome>, AppError>
where
    S: PipelineApi,
{
    let outcome = service.query(&request.question).await?;
    tracing::info!(
        contexts = outcome.contexts.len(),
        token_est = outcome.token_est,
        "Query request completed"
    );
    Ok(Json(outcome))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: PipelineApi,
{
    Json(service.metrics_snapshot())
}

enum AppError {
    Ingest(IngestError),
    Query(QueryError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Ingest(error @ IngestError::AlreadyRunning) => (StatusCode::CONFLICT, error.to_string()),
            Self::Ingest(error @ IngestError::InputMissing(_)) => (StatusCode::NOT_FOUND, error.to_string()),
            Self::Ingest(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
            Self::Query(error @ QueryError::EmptyQuestion) => (StatusCode::BAD_REQUEST, error.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(inner: IngestError) -> Self {
        Self::Ingest(inner)
    }
}

impl From<QueryError> for AppError {
    fn from(inner: QueryError) -> Self {
        Self::Query(inner)
    }
}
