use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Largest export accepted by `POST /api/uploads`.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware is applied in outer-to-inner order:
///
/// 1. `CorsLayer`: origins from `EVENTLENS_CORS_ORIGINS`, any origin when unset.
/// 2. `CompressionLayer`: gzip for the JSON read endpoints.
/// 3. `TraceLayer`: structured request/response logging via `tracing`.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/api/uploads",
            post(routes::uploads::create_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/uploads/current", get(routes::uploads::current_upload))
        .route(
            "/api/uploads/current/cancel",
            post(routes::uploads::cancel_upload),
        )
        .route("/api/dashboard", get(routes::dashboard::dashboard))
        .route("/api/events", get(routes::events::list_events))
        .route("/api/sources", get(routes::sources::list_sources))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}
