//! Endpoint handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ApiError;
use super::AppState;
use crate::domain::{ExtractionRequest, Requirement};

/// Body of `POST /api/requirements/extract`
#[derive(Debug, Deserialize)]
pub struct ExtractBody {
    #[serde(default, rename = "documentIds", alias = "document_ids")]
    pub document_ids: Vec<String>,
    #[serde(default, rename = "projectId", alias = "project_id")]
    pub project_id: String,
}

#[derive(Debug, Serialize)]
pub struct RequirementsResponse {
    pub project_id: String,
    pub count: usize,
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `POST /api/requirements/extract`: validate, then stream the run as SSE.
///
/// Validation errors come back as a single JSON error, never as a stream.
pub async fn extract(
    State(state): State<AppState>,
    payload: Result<Json<ExtractBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let request = ExtractionRequest::new(body.project_id, body.document_ids)?;
    let documents = state.documents.resolve(&request).await?;

    info!(
        project = %request.project_id(),
        documents = documents.len(),
        "Streaming requirement extraction"
    );

    let (receiver, _run) = state.orchestrator.spawn(request, documents);
    let stream = receiver
        .into_stream()
        .map(|event| Event::default().json_data(event));

    Ok(([("x-accel-buffering", "no")], Sse::new(stream)).into_response())
}

/// `GET /api/projects/:project_id/requirements`
pub async fn list_requirements(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<RequirementsResponse>, ApiError> {
    let requirements = state.requirements.list(&project_id).await?;

    Ok(Json(RequirementsResponse {
        project_id,
        count: requirements.len(),
        requirements,
    }))
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
