use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use tally_core::analytics::Granularity;

use crate::{error::AppError, routes::query::DashboardQuery, state::AppState};

/// `GET /api/websites/{id}/timeseries` — zero-filled daily, weekly or monthly series.
///
/// Unknown `granularity` values fall back to daily.
#[tracing::instrument(skip(state, query))]
pub async fn get_timeseries(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.require_website(&website_id).await?;

    let granularity = Granularity::parse_lenient(query.granularity.as_deref());
    let result = state
        .analytics
        .get_timeseries(&website_id, &query.filter(Utc::now()), granularity)
        .await?;

    Ok(Json(json!({ "data": result })))
}
