use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::{error::AppError, routes::query::DashboardQuery, state::AppState};

/// `GET /api/websites/{id}/filter-options` — device, browser and country
/// values available under the other active filters.
#[tracing::instrument(skip(state, query))]
pub async fn get_filter_options(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.require_website(&website_id).await?;

    let result = state
        .analytics
        .get_filter_options(&website_id, &query.filter(Utc::now()))
        .await?;

    Ok(Json(json!({ "data": result })))
}
