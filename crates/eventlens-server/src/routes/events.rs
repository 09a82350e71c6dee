use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};

use eventlens_core::explorer::{self, EventFilter};
use eventlens_core::store::SortSpec;

use crate::{error::AppError, state::AppState};

/// `GET /api/events?search=&event_type=&country=&enrichment=`
///
/// Filters the most recent events; facets cover the unfiltered set.
/// `all` in a select-box parameter means "no constraint".
#[tracing::instrument(skip(state))]
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(mut filter): Query<EventFilter>,
) -> Result<impl IntoResponse, AppError> {
    filter.event_type = select_box(filter.event_type);
    filter.country = select_box(filter.country);
    let events = state
        .db
        .list_events(SortSpec::NEWEST_EVENTS, state.config.explorer_event_limit)
        .await?;
    Ok(Json(explorer::explore(events, &filter)))
}

fn select_box(value: Option<String>) -> Option<String> {
    value.filter(|v| v.trim() != "all")
}
