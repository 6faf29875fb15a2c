use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware, outermost first:
///
/// 1. `TraceLayer` — request/response spans via `tracing`.
/// 2. `CorsLayer` — permissive; the beacon is sent from third-party origins.
///
/// `/api/track` carries its own body limit so oversized beacons are refused
/// before they are buffered.
pub fn build_app(state: Arc<AppState>) -> Router {
    let max_body = state.config.max_body_bytes;

    let track = Router::new()
        .route("/api/track", post(routes::track::track))
        .layer(DefaultBodyLimit::max(max_body));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(track)
        .route(
            "/api/analytics/active",
            get(routes::active::active_users),
        )
        .route(
            "/api/websites/{id}/overview",
            get(routes::overview::get_overview),
        )
        .route(
            "/api/websites/{id}/timeseries",
            get(routes::timeseries::get_timeseries),
        )
        .route(
            "/api/websites/{id}/breakdown",
            get(routes::breakdown::get_breakdown),
        )
        .route(
            "/api/websites/{id}/filter-options",
            get(routes::filter_options::get_filter_options),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
