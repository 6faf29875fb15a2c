use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use tally_core::analytics::parse_active_minutes;

use crate::{error::AppError, routes::query::DashboardQuery, state::AppState};

/// `GET /api/websites/{id}/overview` — visitors, page views, sessions and
/// active users for the selected range.
#[tracing::instrument(skip(state, query))]
pub async fn get_overview(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.require_website(&website_id).await?;

    let now = Utc::now();
    let minutes = match query.minutes.as_deref() {
        Some(raw) => parse_active_minutes(Some(raw)),
        None => state.config.active_minutes,
    };
    let result = state
        .analytics
        .get_overview(&website_id, &query.filter(now), minutes, now)
        .await?;

    Ok(Json(json!({ "data": result })))
}
