use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use eventlens_ingest::Upload;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
    /// Display name for the data source; defaults to the file name stem.
    pub name: Option<String>,
}

/// `POST /api/uploads?filename=&name=`: the raw body is the export file.
///
/// Starts a background run and answers `202` with its first snapshot, or
/// `409` while another run is active.
#[tracing::instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn create_upload(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let file_name = query
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::BadRequest("filename is required".to_string()))?
        .to_string();
    if body.is_empty() {
        return Err(AppError::BadRequest("upload body is empty".to_string()));
    }

    let snapshot = state
        .start_upload(Upload {
            file_name,
            bytes: body.to_vec(),
            source_name: query.name,
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// `GET /api/uploads/current`: snapshot of the latest run.
#[tracing::instrument(skip(state))]
pub async fn current_upload(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state
        .current_run()
        .await
        .ok_or_else(|| AppError::NotFound("no upload has been started".to_string()))?;
    Ok(Json(snapshot))
}

/// `POST /api/uploads/current/cancel`: cancellation takes effect at the next
/// stage boundary, so the answer is `202`.
#[tracing::instrument(skip(state))]
pub async fn cancel_upload(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state
        .cancel_current_run()
        .await
        .ok_or_else(|| AppError::NotFound("no upload has been started".to_string()))?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}
