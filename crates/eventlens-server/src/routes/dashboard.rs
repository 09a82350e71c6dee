use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;

use eventlens_core::aggregate::{self, AggregationOptions, DashboardStats};
use eventlens_core::event::DataSourceRecord;
use eventlens_core::store::SortSpec;

use crate::{error::AppError, state::AppState};

const RECENT_SOURCES: usize = 20;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    #[serde(flatten)]
    pub stats: DashboardStats,
    pub recent_sources: Vec<DataSourceRecord>,
}

/// `GET /api/dashboard`: statistics over the most recent events plus the
/// latest data sources.
#[tracing::instrument(skip(state))]
pub async fn dashboard(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let events = state
        .db
        .list_events(SortSpec::NEWEST_EVENTS, state.config.dashboard_event_limit)
        .await?;
    let recent_sources = state
        .db
        .list_data_sources(SortSpec::NEWEST_SOURCES, RECENT_SOURCES)
        .await?;

    let options = AggregationOptions::for_today(Utc::now().date_naive());
    Ok(Json(DashboardResponse {
        stats: aggregate::compute(&events, &options),
        recent_sources,
    }))
}
