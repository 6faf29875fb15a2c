use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use tally_core::analytics::{parse_active_minutes, DimensionFilters};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ActiveQuery {
    #[serde(rename = "websiteId")]
    pub website_id: Option<String>,
    pub minutes: Option<String>,
    pub device: Option<String>,
    pub browser: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUsersResponse {
    pub active_users: i64,
    pub updated_at: String,
}

/// `GET /api/analytics/active` — visitors seen in the last few minutes.
///
/// `minutes` defaults to 5 and is clamped to 1..=30. Responses are never cached.
#[tracing::instrument(skip(state, query))]
pub async fn active_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActiveQuery>,
) -> Result<impl IntoResponse, AppError> {
    let website_id = query
        .website_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("websiteId is required".to_string()))?;
    state.require_website(website_id).await?;

    let minutes = match query.minutes.as_deref() {
        Some(raw) => parse_active_minutes(Some(raw)),
        None => state.config.active_minutes,
    };
    let filters = DimensionFilters::from_raw(
        query.device.as_deref(),
        query.browser.as_deref(),
        query.country.as_deref(),
    );

    let now = Utc::now();
    let active_users = state
        .analytics
        .get_active_users(website_id, &filters, minutes, now)
        .await?;

    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(ActiveUsersResponse {
            active_users,
            updated_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }),
    ))
}
