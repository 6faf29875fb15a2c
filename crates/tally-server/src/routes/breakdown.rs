use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use tally_core::analytics::{parse_breakdown_limit, Dimension};

use crate::{error::AppError, routes::query::DashboardQuery, state::AppState};

/// `GET /api/websites/{id}/breakdown?type=` — top labels for one dimension.
///
/// `type` is one of `device`, `browser`, `country`, `os`, `page`, `referrer`.
/// `limit` defaults to 12 and is clamped to 1..=100.
#[tracing::instrument(skip(state, query))]
pub async fn get_breakdown(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let dimension = query
        .dimension
        .as_deref()
        .and_then(Dimension::parse)
        .ok_or_else(|| {
            AppError::BadRequest(
                "type must be one of: device, browser, country, os, page, referrer".to_string(),
            )
        })?;
    state.require_website(&website_id).await?;

    let limit = parse_breakdown_limit(query.limit.as_deref());
    let result = state
        .analytics
        .get_breakdown(&website_id, dimension, &query.filter(Utc::now()), limit)
        .await?;

    Ok(Json(json!({ "data": result })))
}
