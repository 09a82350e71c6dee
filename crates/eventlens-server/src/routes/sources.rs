use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use eventlens_core::store::{SortField, SortSpec};

use crate::{error::AppError, state::AppState};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct SourcesQuery {
    pub limit: Option<usize>,
    /// `created_date`, `-created_date` (default) or `name`.
    pub sort: Option<String>,
}

/// `GET /api/sources?limit=&sort=`
#[tracing::instrument(skip(state))]
pub async fn list_sources(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourcesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let sort = match query.sort.as_deref() {
        Some(raw) => raw
            .parse::<SortSpec>()
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
        None => SortSpec::NEWEST_SOURCES,
    };
    if !matches!(sort.field, SortField::CreatedDate | SortField::Name) {
        return Err(AppError::BadRequest(
            "sources can be sorted by created_date or name".to_string(),
        ));
    }
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let sources = state.db.list_data_sources(sort, limit).await?;
    Ok(Json(sources))
}
