use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use tally_core::error::{IngestError, MalformedReason};
use tally_core::validate::{country_from_headers, RequestContext};

use crate::{error::AppError, state::AppState};

/// `POST /api/track` — ingest one beacon or a batch of beacons.
///
/// ## Rules
/// - Body at most `TALLY_MAX_BODY_BYTES` (413 otherwise).
/// - One object or an array of 1..=`TALLY_MAX_BATCH_EVENTS` objects.
/// - Every item carries the same `tracking_id`; one bad item rejects all.
/// - Fixed-window rate limit per tracking id (or hashed client IP).
///
/// ## Enrichment
/// - `country` from edge headers (`x-vercel-ip-country`, `cf-ipcountry`, ...).
/// - `occurred_at` from the client `timestamp` when plausible.
///
/// ## Response
/// `200 OK` with `{ "success": true }` once events and sessions are written.
#[tracing::instrument(skip(state, headers, body))]
pub async fn track(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, AppError> {
    let max = state.pipeline.limits().max_body_bytes;
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > max) {
        debug!(declared, max, "beacon rejected: content-length over limit");
        return Err(AppError::PayloadTooLarge);
    }

    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            debug!(error = %rejection.body_text(), "beacon rejected: unreadable body");
            AppError::Malformed(MalformedReason::InvalidPayload)
        }
    })?;

    let ctx = RequestContext {
        received_at: Utc::now(),
        country: country_from_headers(|name| headers.get(name).and_then(|v| v.to_str().ok())),
        client_ip: extract_client_ip(&headers),
    };

    match state.pipeline.ingest(&body, &ctx).await {
        Ok(summary) => {
            info!(
                website_id = %summary.website_id,
                events = summary.events,
                sessions = summary.sessions,
                "beacon batch accepted"
            );
            Ok(Json(json!({ "success": true })))
        }
        Err(err) => {
            match &err {
                IngestError::Malformed(reason) => debug!(code = reason.code(), "beacon rejected"),
                IngestError::PayloadTooLarge { max } => debug!(max, "beacon rejected: too large"),
                IngestError::UnknownTenant => debug!("beacon rejected: unknown tracking id"),
                IngestError::RateLimited => warn!("beacon rejected: rate limited"),
                IngestError::WriteFailure(e) => warn!(error = %e, "beacon write failed"),
            }
            Err(err.into())
        }
    }
}

/// First entry of `X-Forwarded-For`, else `X-Real-IP`.
fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("10.0.0.9"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.7"));

        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}
